//! One running view: an actor task that owns a [`BridgeRouter`] and the
//! handle the host UI uses to talk to it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;
use view_plugin::message::{Envelope, FilterOperation, PluginContext};
use view_plugin::FramePort;

use crate::bridge::router::{BridgeRouter, Completion, Services};
use crate::bridge::surface::{FrameLoader, Surface};
use crate::error::BridgeError;

pub mod ui;

pub use ui::UiState;

/// What a view needs to know to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Document-set server; its origin is what plugins receive as `server`.
    pub server: Url,
    pub api_token: String,
    pub document_set_id: i64,
    pub view_id: i64,
    /// The plugin's main page. Relative pane and link URLs resolve against it.
    pub plugin_url: Url,
}

impl ViewConfig {
    pub fn context(&self) -> PluginContext {
        PluginContext::new(&self.server, self.document_set_id, self.api_token.clone())
    }
}

/// Requests from the host UI to the view task.
#[derive(Debug)]
pub enum HostCommand {
    CloseRightPane,
    SelectFilter { ids: Vec<String>, operation: FilterOperation },
    ToggleFilterChoice(String),
    OpenDocument(i64),
    CloseDocument,
    OpenLink { url: String, reply: oneshot::Sender<Result<(), BridgeError>> },
    ClosePopup,
    Reload,
    Snapshot(oneshot::Sender<UiState>),
    /// Reply once no server request is in flight.
    Settled(oneshot::Sender<UiState>),
    Shutdown(oneshot::Sender<()>),
}

const COMMAND_BUFFER: usize = 64;

/// The view task. Processes one event at a time: plugin messages first, then
/// server responses, then host commands.
pub struct ViewHost {
    router: BridgeRouter,
    inbox: UnboundedReceiver<Envelope>,
    completions: UnboundedReceiver<Completion>,
    commands: Receiver<HostCommand>,
    settled: Vec<oneshot::Sender<UiState>>,
}

impl ViewHost {
    /// Start a view on the current tokio runtime.
    pub fn spawn(config: ViewConfig, services: Services, loader: Arc<dyn FrameLoader>) -> ViewHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(async move {
            let (router, inbox, completions) = BridgeRouter::start(config, services, loader);
            let host = ViewHost { router, inbox, completions, commands: rx, settled: Vec::new() };
            host.run().await;
        });
        ViewHandle { commands: tx }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(envelope) = self.inbox.recv() => self.router.accept(envelope),
                Some(completion) = self.completions.recv() => self.router.complete(completion),
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.apply(command) {
                            break;
                        }
                    }
                    None => {
                        debug!("all view handles dropped");
                        self.stop();
                        break;
                    }
                },
            }
            self.notify_settled();
        }
    }

    /// `false` once the view should stop.
    fn apply(&mut self, command: HostCommand) -> bool {
        match command {
            HostCommand::CloseRightPane => self.router.close_right_pane(),
            HostCommand::SelectFilter { ids, operation } => self.router.select_filter(&ids, operation),
            HostCommand::ToggleFilterChoice(id) => self.router.toggle_filter_choice(&id),
            HostCommand::OpenDocument(id) => self.router.open_document(id),
            HostCommand::CloseDocument => self.router.close_document(),
            HostCommand::OpenLink { url, reply } => {
                let result = self.router.open_link(&url);
                if let Err(err) = &result {
                    warn!("{err}");
                }
                let _ = reply.send(result);
            }
            HostCommand::ClosePopup => self.router.close_popup(),
            HostCommand::Reload => self.router.reload(),
            HostCommand::Snapshot(reply) => {
                let _ = reply.send(self.router.ui());
            }
            HostCommand::Settled(reply) => self.settled.push(reply),
            HostCommand::Shutdown(reply) => {
                self.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn notify_settled(&mut self) {
        if self.settled.is_empty() || self.router.in_flight() > 0 {
            return;
        }
        let ui = self.router.ui();
        for waiter in self.settled.drain(..) {
            let _ = waiter.send(ui.clone());
        }
    }

    fn stop(&mut self) {
        self.router.teardown();
        info!("view closed");
    }
}

/// Cheap to clone; every method fails with [`BridgeError::Closed`] once the
/// view has shut down.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    commands: Sender<HostCommand>,
}

impl ViewHandle {
    async fn send(&self, command: HostCommand) -> Result<(), BridgeError> {
        self.commands.send(command).await.map_err(|_| BridgeError::Closed)
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> HostCommand) -> Result<T, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| BridgeError::Closed)
    }

    /// The user closed the right pane.
    pub async fn close_right_pane(&self) -> Result<(), BridgeError> {
        self.send(HostCommand::CloseRightPane).await
    }

    pub async fn select_filter(&self, ids: Vec<String>, operation: FilterOperation) -> Result<(), BridgeError> {
        self.send(HostCommand::SelectFilter { ids, operation }).await
    }

    /// A click on one choice in the filter entry.
    pub async fn toggle_filter_choice(&self, id: impl Into<String>) -> Result<(), BridgeError> {
        self.send(HostCommand::ToggleFilterChoice(id.into())).await
    }

    pub async fn open_document(&self, document_id: i64) -> Result<(), BridgeError> {
        self.send(HostCommand::OpenDocument(document_id)).await
    }

    pub async fn close_document(&self) -> Result<(), BridgeError> {
        self.send(HostCommand::CloseDocument).await
    }

    /// Open the detail popup for a link of the open document.
    pub async fn open_link(&self, url: impl Into<String>) -> Result<(), BridgeError> {
        let url = url.into();
        self.ask(|reply| HostCommand::OpenLink { url, reply }).await?
    }

    pub async fn close_popup(&self) -> Result<(), BridgeError> {
        self.send(HostCommand::ClosePopup).await
    }

    /// Same as refreshing the page.
    pub async fn reload(&self) -> Result<(), BridgeError> {
        self.send(HostCommand::Reload).await
    }

    pub async fn snapshot(&self) -> Result<UiState, BridgeError> {
        self.ask(HostCommand::Snapshot).await
    }

    /// Wait until every queued event is handled and no server request is
    /// in flight, then return the UI state.
    pub async fn settled(&self) -> Result<UiState, BridgeError> {
        self.ask(HostCommand::Settled).await
    }

    /// Unload every frame and stop the view task.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        self.ask(HostCommand::Shutdown).await
    }
}

/// What a [`ChannelLoader`] reports.
#[derive(Debug)]
pub enum LoaderEvent {
    Loaded(Surface, FramePort),
    Unloaded(Surface),
}

/// A [`FrameLoader`] that hands frames to whoever holds the receiver: the
/// stdio bridge, or a test playing the plugin.
#[derive(Debug)]
pub struct ChannelLoader {
    events: UnboundedSender<LoaderEvent>,
}

impl ChannelLoader {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<LoaderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events: tx }), rx)
    }
}

impl FrameLoader for ChannelLoader {
    fn load(&self, surface: &Surface, port: FramePort) {
        if self.events.send(LoaderEvent::Loaded(surface.clone(), port)).is_err() {
            debug!(frame = %surface.frame, "nobody is listening for loaded frames");
        }
    }

    fn unload(&self, surface: &Surface) {
        if self.events.send(LoaderEvent::Unloaded(surface.clone())).is_err() {
            debug!(frame = %surface.frame, "nobody is listening for unloaded frames");
        }
    }
}
