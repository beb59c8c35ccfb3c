use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use url::Url;
use view_plugin::message::{DocumentDetailLink, Envelope, FilterOperation, FrameId, SurfaceKind};
use view_plugin::{BridgeCommand, Inbound};

use crate::bridge::channel::MessageChannel;
use crate::bridge::context::{ContextInjector, Placement};
use crate::bridge::filter::{FilterCoordinator, FilterRequest};
use crate::bridge::links::LinkStore;
use crate::bridge::surface::{FrameLoader, Surface, SurfaceManager};
use crate::error::BridgeError;
use crate::logger;
use crate::server::{
    Document, DocumentSetApi, FilterApi, HttpDocumentSetApi, HttpFilterApi, ServerError, ViewRecord,
};
use crate::view::ViewConfig;
use crate::view::ui::UiState;

/// The two servers a view talks to.
#[derive(Debug, Clone)]
pub struct Services {
    pub documents: Arc<dyn DocumentSetApi>,
    pub filter: Arc<dyn FilterApi>,
}

impl Services {
    pub fn new(documents: Arc<dyn DocumentSetApi>, filter: Arc<dyn FilterApi>) -> Self {
        Self { documents, filter }
    }

    /// HTTP clients for `config.server`, sharing one connection pool.
    pub fn http(config: &ViewConfig) -> Self {
        let client = reqwest::Client::new();
        Self {
            documents: Arc::new(HttpDocumentSetApi::with_client(
                client.clone(),
                config.server.clone(),
                config.api_token.clone(),
            )),
            filter: Arc::new(HttpFilterApi::with_client(client)),
        }
    }
}

/// Result of a server call, reported back to the view loop.
#[derive(Debug)]
pub struct Completion {
    epoch: u64,
    outcome: Outcome,
}

#[derive(Debug)]
enum Outcome {
    Filtered { seq: u64, result: Result<Vec<Document>, ServerError> },
    Documents(Result<Vec<Document>, ServerError>),
    Views { title: Option<u64>, result: Result<Vec<ViewRecord>, ServerError> },
    View { title: Option<u64>, result: Result<ViewRecord, ServerError> },
    TitleSaved { title: u64, result: Result<ViewRecord, ServerError> },
    Links { document_id: i64, result: Result<Vec<DocumentDetailLink>, ServerError> },
    LinkSaved(Result<DocumentDetailLink, ServerError>),
}

/// Owns every piece of per-view state and decides what each plugin message,
/// user action and server response does to it.
///
/// Not thread-safe on purpose: exactly one task (the view loop) drives it.
pub struct BridgeRouter {
    config: ViewConfig,
    injector: ContextInjector,
    channel: MessageChannel,
    loader: Arc<dyn FrameLoader>,
    surfaces: SurfaceManager,
    filter: FilterCoordinator,
    store: LinkStore,
    documents: Vec<Document>,
    error: Option<String>,
    services: Services,
    completions: UnboundedSender<Completion>,
    in_flight: usize,
    /// Bumped on reload so reads for the previous page are dropped. Writes
    /// outlive a reload.
    epoch: u64,
    /// Bumped by every local title change. Survives reload.
    title_gen: u64,
    title_saves: usize,
}

impl BridgeRouter {
    /// Open the main frame and start fetching the view's data. Must run
    /// inside a tokio runtime.
    ///
    /// Returns the router, the inbox to feed into [`Self::accept`] and the
    /// completion queue to feed into [`Self::complete`].
    pub fn start(
        config: ViewConfig,
        services: Services,
        loader: Arc<dyn FrameLoader>,
    ) -> (Self, UnboundedReceiver<Envelope>, UnboundedReceiver<Completion>) {
        let injector = ContextInjector::new(config.context());
        let (mut channel, inbox) = MessageChannel::new();
        let (completions, completion_rx) = mpsc::unbounded_channel();

        let main_url = injector.load_url(&config.plugin_url, None);
        let main = open_frame(&mut channel, loader.as_ref(), SurfaceKind::Main, main_url);
        let filter = FilterCoordinator::new(config.context(), config.plugin_url.clone());
        let store = LinkStore::new(config.view_id);

        let mut router = Self {
            config,
            injector,
            channel,
            loader,
            surfaces: SurfaceManager::new(main),
            filter,
            store,
            documents: Vec::new(),
            error: None,
            services,
            completions,
            in_flight: 0,
            epoch: 0,
            title_gen: 0,
            title_saves: 0,
        };
        info!(view = router.config.view_id, url = %router.surfaces.main().url, "view opened");
        router.fetch_view();
        (router, inbox, completion_rx)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn surfaces(&self) -> &SurfaceManager {
        &self.surfaces
    }

    /// Validate an envelope and act on it.
    pub fn accept(&mut self, envelope: Envelope) {
        if let Some(msg) = self.channel.accept(envelope) {
            self.handle(&msg.frame, msg.payload);
        }
    }

    /// Dispatch one payload from `source`. Nothing a plugin sends can fail
    /// this call; problems are logged.
    pub fn handle(&mut self, source: &FrameId, payload: Value) {
        let Some(kind) = self.surfaces.find(source).map(|s| s.kind) else {
            debug!(frame = %source, "message from a frame with no surface");
            return;
        };
        if kind == SurfaceKind::DocumentDetailPopup {
            debug!(frame = %source, "ignoring message from document detail popup");
            return;
        }

        match Inbound::classify(payload) {
            Inbound::Command(command) => {
                let name = command.name();
                debug!(frame = %source, %kind, command = %name, "bridge call");
                if let Err(err) = self.dispatch(command) {
                    warn!(frame = %source, command = %name, "{err}");
                }
            }
            Inbound::Opaque(payload) => self.forward(kind, &payload),
            Inbound::Unknown { command, reason } => {
                let err = BridgeError::UnknownCommand { command, reason };
                warn!(frame = %source, "{err}");
            }
        }
    }

    fn dispatch(&mut self, command: BridgeCommand) -> Result<(), BridgeError> {
        match command {
            BridgeCommand::SetRightPane(Some(source)) => {
                self.open_pane(SurfaceKind::RightPane, source.url(), Placement::RightPane)?
            }
            BridgeCommand::SetRightPane(None) => self.close_surface(SurfaceKind::RightPane),
            BridgeCommand::SetModalDialog(Some(source)) => {
                self.open_pane(SurfaceKind::Modal, source.url(), Placement::ModalDialog)?
            }
            BridgeCommand::SetModalDialog(None) => self.close_surface(SurfaceKind::Modal),
            BridgeCommand::SetViewFilter(descriptor) => self.filter.declare(descriptor)?,
            BridgeCommand::SetViewFilterChoices(choices) => self.filter.set_choices(choices),
            BridgeCommand::SetViewFilterSelection(selection) => {
                let request = self.filter.select(selection.ids(), selection.operation());
                self.run_filter(request);
            }
            BridgeCommand::SetDocumentDetailLink(args) => self.save_link(&args.url, &args.text)?,
            BridgeCommand::SetViewTitle(args) => self.save_title(args.title()),
        }
        Ok(())
    }

    fn forward(&self, from: SurfaceKind, payload: &Value) {
        let targets = self.surfaces.paired(from);
        if targets.is_empty() {
            debug!(%from, "no paired frame for message");
        }
        for target in &targets {
            self.channel.send(target, payload);
        }
    }

    fn open_pane(&mut self, kind: SurfaceKind, target: &str, placement: Placement) -> Result<(), BridgeError> {
        let target = self.config.plugin_url.join(target)?;
        let url = self.injector.load_url(&target, Some(placement));
        self.replace_surface(kind, url);
        Ok(())
    }

    /// Destroy the current surface of `kind` (if any) before loading `url`.
    fn replace_surface(&mut self, kind: SurfaceKind, url: Url) {
        self.close_surface(kind);
        let surface = open_frame(&mut self.channel, self.loader.as_ref(), kind, url);
        self.surfaces.open(surface);
    }

    fn close_surface(&mut self, kind: SurfaceKind) {
        if let Some(old) = self.surfaces.close(kind) {
            self.destroy(&old);
        }
    }

    fn destroy(&mut self, surface: &Surface) {
        self.channel.close_frame(&surface.frame);
        self.loader.unload(surface);
    }

    fn save_link(&mut self, url: &str, text: &str) -> Result<(), BridgeError> {
        let url = self.config.plugin_url.join(url)?;
        let Some(link) = self.store.stage_link(url.as_str(), text) else {
            debug!(%url, "no open document; ignoring link");
            return Ok(());
        };
        let api = self.services.documents.clone();
        let (set, view) = (self.config.document_set_id, self.config.view_id);
        self.request(
            "upsert_document_link",
            async move { api.upsert_document_link(set, view, &link).await },
            Outcome::LinkSaved,
        );
        Ok(())
    }

    fn save_title(&mut self, title: &str) {
        self.store.set_title(title);
        self.title_gen += 1;
        self.title_saves += 1;
        let api = self.services.documents.clone();
        let (set, view) = (self.config.document_set_id, self.config.view_id);
        let (generation, title) = (self.title_gen, title.to_string());
        self.request(
            "update_view_title",
            async move { api.update_view_title(set, view, &title).await },
            move |result| Outcome::TitleSaved { title: generation, result },
        );
    }

    /// Stamp for a title-carrying read. `None` when a save is still in
    /// flight, since the read may see the server before that save lands.
    fn title_stamp(&self) -> Option<u64> {
        (self.title_saves == 0).then_some(self.title_gen)
    }

    fn title_is_fresh(&self, stamp: Option<u64>) -> bool {
        stamp == Some(self.title_gen)
    }

    fn run_filter(&mut self, request: FilterRequest) {
        let api = self.services.filter.clone();
        let FilterRequest { seq, query } = request;
        self.request(
            "filter",
            async move { api.filter(&query).await },
            move |result| Outcome::Filtered { seq, result },
        );
    }

    fn fetch_view(&mut self) {
        let (set, view) = (self.config.document_set_id, self.config.view_id);

        let api = self.services.documents.clone();
        self.request("list_documents", async move { api.list_documents(set).await }, Outcome::Documents);

        let title = self.title_stamp();
        let api = self.services.documents.clone();
        self.request(
            "list_views",
            async move { api.list_views(set).await },
            move |result| Outcome::Views { title, result },
        );

        let api = self.services.documents.clone();
        self.request(
            "fetch_view",
            async move { api.fetch_view(set, view).await },
            move |result| Outcome::View { title, result },
        );
    }

    fn fetch_links(&mut self, document_id: i64) {
        let api = self.services.documents.clone();
        let (set, view) = (self.config.document_set_id, self.config.view_id);
        self.request(
            "fetch_document_links",
            async move { api.fetch_document_links(set, view, document_id).await },
            move |result| Outcome::Links { document_id, result },
        );
    }

    /// Spawn a server call; its result comes back through [`Self::complete`].
    fn request<T, Fut, W>(&mut self, name: &'static str, call: Fut, wrap: W)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ServerError>> + Send + 'static,
        W: FnOnce(Result<T, ServerError>) -> Outcome + Send + 'static,
    {
        self.in_flight += 1;
        let epoch = self.epoch;
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = logger::instrument_request(name, || call).await;
            if tx.send(Completion { epoch, outcome: wrap(result) }).is_err() {
                debug!(request = name, "view closed before the response arrived");
            }
        });
    }

    /// Apply a server response.
    pub fn complete(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let current = completion.epoch == self.epoch;

        match completion.outcome {
            Outcome::TitleSaved { title, result } => self.title_saved(title, result),
            Outcome::LinkSaved(Ok(link)) => {
                self.store.apply_persisted_link(link);
                self.error = None;
            }
            Outcome::LinkSaved(Err(source)) => self.server_failed("document detail link", source),
            _ if !current => debug!("dropping response issued before reload"),
            Outcome::Filtered { seq, result } => {
                if !self.filter.is_current(seq) {
                    debug!(seq, "dropping stale filter response");
                    return;
                }
                match result {
                    Ok(documents) => {
                        self.documents = documents;
                        self.error = None;
                    }
                    Err(source) => self.server_failed("view filter", source),
                }
            }
            Outcome::Documents(Ok(documents)) => self.documents = documents,
            Outcome::Views { title, result: Ok(views) } => {
                if self.title_is_fresh(title) {
                    self.store.set_views(&views);
                } else {
                    self.store.set_tabs(&views);
                }
            }
            Outcome::View { title, result: Ok(view) } => {
                if self.title_is_fresh(title) {
                    self.store.apply_view(&view);
                } else {
                    debug!("view title changed since this read; keeping local title");
                }
            }
            Outcome::Links { document_id, result: Ok(links) } => {
                self.store.replace_links(document_id, links);
            }
            Outcome::Documents(Err(err))
            | Outcome::Views { result: Err(err), .. }
            | Outcome::View { result: Err(err), .. }
            | Outcome::Links { result: Err(err), .. } => warn!("could not load view data: {err}"),
        }
    }

    /// Only the newest title change may set the title from the server.
    fn title_saved(&mut self, generation: u64, result: Result<ViewRecord, ServerError>) {
        self.title_saves = self.title_saves.saturating_sub(1);
        match result {
            Ok(view) if generation == self.title_gen => {
                self.store.apply_view(&view);
                self.error = None;
            }
            Ok(_) => debug!(generation, "a newer title is pending; ignoring saved title"),
            Err(source) => self.server_failed("view title", source),
        }
    }

    /// Local state stays as it is; the user sees the failure.
    fn server_failed(&mut self, operation: &'static str, source: ServerError) {
        let err = BridgeError::Server { operation, source };
        error!("{err}");
        self.error = Some(err.to_string());
    }

    pub fn close_right_pane(&mut self) {
        self.close_surface(SurfaceKind::RightPane);
    }

    pub fn select_filter(&mut self, ids: &[String], operation: FilterOperation) {
        let request = self.filter.select(ids, operation);
        self.run_filter(request);
    }

    pub fn toggle_filter_choice(&mut self, id: &str) {
        let request = self.filter.toggle(id);
        self.run_filter(request);
    }

    /// Show one document and load its detail links. Any open popup belongs
    /// to the previous document and goes away.
    pub fn open_document(&mut self, document_id: i64) {
        self.close_surface(SurfaceKind::DocumentDetailPopup);
        self.store.open(document_id);
        self.fetch_links(document_id);
    }

    pub fn close_document(&mut self) {
        self.close_surface(SurfaceKind::DocumentDetailPopup);
        self.store.close();
    }

    /// Open the popup for one of the open document's links.
    pub fn open_link(&mut self, url: &str) -> Result<(), BridgeError> {
        let link = self
            .store
            .links()
            .iter()
            .find(|l| l.url == url)
            .cloned()
            .ok_or_else(|| BridgeError::InvalidArgs(format!("no link `{url}` on the open document")))?;
        let popup = self.injector.popup_url(&link)?;
        self.replace_surface(SurfaceKind::DocumentDetailPopup, popup);
        Ok(())
    }

    pub fn close_popup(&mut self) {
        self.close_surface(SurfaceKind::DocumentDetailPopup);
    }

    /// Page refresh: every frame is rebuilt and all state comes back from
    /// the server.
    pub fn reload(&mut self) {
        info!(view = self.config.view_id, "reloading view");
        self.teardown();
        self.epoch += 1;
        self.documents.clear();
        self.error = None;
        let title = self.store.title().to_string();
        self.store.reset();
        if self.title_saves > 0 {
            // the server may not have the pending title yet
            self.store.set_title(&title);
        }
        self.filter = FilterCoordinator::new(self.config.context(), self.config.plugin_url.clone());

        let main_url = self.injector.load_url(&self.config.plugin_url, None);
        let main = open_frame(&mut self.channel, self.loader.as_ref(), SurfaceKind::Main, main_url);
        self.surfaces = SurfaceManager::new(main);
        self.fetch_view();
    }

    /// Unload every frame, main included.
    pub fn teardown(&mut self) {
        for surface in self.surfaces.close_all() {
            self.destroy(&surface);
        }
        let main = self.surfaces.main().clone();
        if self.channel.contains(&main.frame) {
            self.destroy(&main);
        }
    }

    pub fn ui(&self) -> UiState {
        let filter = self.filter.state().clone();
        UiState {
            layout: self.surfaces.layout(),
            surfaces: self.surfaces.all().into_iter().cloned().collect(),
            filter_label: filter.label(),
            filter,
            documents: self.documents.clone(),
            open_document: self.store.open_document(),
            links: self.store.links().to_vec(),
            title: self.store.title().to_string(),
            views: self.store.views().to_vec(),
            error: self.error.clone(),
        }
    }
}

fn open_frame(channel: &mut MessageChannel, loader: &dyn FrameLoader, kind: SurfaceKind, url: Url) -> Surface {
    let port = channel.open_frame(kind, url.clone());
    let surface = Surface { kind, frame: port.id().clone(), url: url.to_string(), visible: true };
    loader.load(&surface, port);
    surface
}
