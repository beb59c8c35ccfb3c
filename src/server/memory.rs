use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use url::Url;
use view_plugin::message::{DocumentDetailLink, FilterOperation};

use super::{Document, DocumentSetApi, FilterApi, FilterQuery, ServerError, ViewRecord};

/// A document-set server living in process memory. State survives as long as
/// the `Arc` does, so a view torn down and reopened against the same store
/// behaves like a page refresh.
#[derive(Debug)]
pub struct InMemoryDocumentSet {
    document_set_id: i64,
    documents: Vec<Document>,
    views: DashMap<i64, ViewRecord>,
    links: DashMap<(i64, i64), Vec<DocumentDetailLink>>,
    next_view_id: AtomicI64,
    fail_writes: AtomicBool,
    read_delay_ms: AtomicU64,
    write_delay_ms: AtomicU64,
}

impl InMemoryDocumentSet {
    pub fn new(document_set_id: i64, documents: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            document_set_id,
            documents,
            views: DashMap::new(),
            links: DashMap::new(),
            next_view_id: AtomicI64::new(1),
            fail_writes: AtomicBool::new(false),
            read_delay_ms: AtomicU64::new(0),
            write_delay_ms: AtomicU64::new(0),
        })
    }

    /// Make every write fail with a 503 until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// View reads take their snapshot at once and answer after `delay`.
    pub fn delay_reads(&self, delay: Duration) {
        self.read_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// View writes wait `delay` before they land.
    pub fn delay_writes(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn pause(delay_ms: &AtomicU64) {
        let ms = delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn check_set(&self, document_set_id: i64) -> Result<(), ServerError> {
        if document_set_id == self.document_set_id {
            Ok(())
        } else {
            Err(ServerError::NotFound(format!("document set {document_set_id}")))
        }
    }

    fn check_write(&self) -> Result<(), ServerError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(ServerError::Status { status: 503, body: "writes disabled".into() })
        } else {
            Ok(())
        }
    }

    fn check_view(&self, view_id: i64) -> Result<(), ServerError> {
        if self.views.contains_key(&view_id) {
            Ok(())
        } else {
            Err(ServerError::NotFound(format!("view {view_id}")))
        }
    }
}

#[async_trait]
impl DocumentSetApi for InMemoryDocumentSet {
    async fn list_documents(&self, document_set_id: i64) -> Result<Vec<Document>, ServerError> {
        self.check_set(document_set_id)?;
        Ok(self.documents.clone())
    }

    async fn list_views(&self, document_set_id: i64) -> Result<Vec<ViewRecord>, ServerError> {
        self.check_set(document_set_id)?;
        let mut views: Vec<ViewRecord> = self.views.iter().map(|v| v.value().clone()).collect();
        views.sort_by_key(|v| v.id);
        Self::pause(&self.read_delay_ms).await;
        Ok(views)
    }

    async fn fetch_view(&self, document_set_id: i64, view_id: i64) -> Result<ViewRecord, ServerError> {
        self.check_set(document_set_id)?;
        let view = self
            .views
            .get(&view_id)
            .map(|v| v.value().clone())
            .ok_or_else(|| ServerError::NotFound(format!("view {view_id}")));
        Self::pause(&self.read_delay_ms).await;
        view
    }

    async fn create_view(&self, document_set_id: i64, title: &str, url: &str) -> Result<ViewRecord, ServerError> {
        self.check_set(document_set_id)?;
        self.check_write()?;
        let id = self.next_view_id.fetch_add(1, Ordering::SeqCst);
        let record = ViewRecord { id, title: title.to_string(), url: url.to_string() };
        self.views.insert(id, record.clone());
        Ok(record)
    }

    async fn update_view_title(
        &self,
        document_set_id: i64,
        view_id: i64,
        title: &str,
    ) -> Result<ViewRecord, ServerError> {
        self.check_set(document_set_id)?;
        Self::pause(&self.write_delay_ms).await;
        self.check_write()?;
        let mut view = self
            .views
            .get_mut(&view_id)
            .ok_or_else(|| ServerError::NotFound(format!("view {view_id}")))?;
        view.title = title.to_string();
        Ok(view.clone())
    }

    async fn delete_view(&self, document_set_id: i64, view_id: i64) -> Result<(), ServerError> {
        self.check_set(document_set_id)?;
        self.check_write()?;
        self.views.remove(&view_id);
        self.links.retain(|(view, _), _| *view != view_id);
        Ok(())
    }

    async fn fetch_document_links(
        &self,
        document_set_id: i64,
        view_id: i64,
        document_id: i64,
    ) -> Result<Vec<DocumentDetailLink>, ServerError> {
        self.check_set(document_set_id)?;
        self.check_view(view_id)?;
        Ok(self
            .links
            .get(&(view_id, document_id))
            .map(|l| l.value().clone())
            .unwrap_or_default())
    }

    async fn upsert_document_link(
        &self,
        document_set_id: i64,
        view_id: i64,
        link: &DocumentDetailLink,
    ) -> Result<DocumentDetailLink, ServerError> {
        self.check_set(document_set_id)?;
        self.check_view(view_id)?;
        Self::pause(&self.write_delay_ms).await;
        self.check_write()?;
        let mut links = self.links.entry((view_id, link.document_id)).or_default();
        match links.iter_mut().find(|l| l.url == link.url) {
            Some(existing) => existing.text = link.text.clone(),
            None => links.push(link.clone()),
        }
        Ok(link.clone())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Filter endpoint over a fixed tagged document list. Records every request
/// URL and can delay chosen selections to reorder responses.
#[derive(Debug)]
pub struct InMemoryFilter {
    documents: Vec<Document>,
    requests: Mutex<Vec<Url>>,
    delays: HashMap<String, Duration>,
    fail: AtomicBool,
}

impl InMemoryFilter {
    pub fn new(documents: Vec<Document>) -> Arc<Self> {
        Arc::new(Self::build(documents, HashMap::new()))
    }

    /// `delays` is keyed by the comma-joined `ids` parameter.
    pub fn with_delays(documents: Vec<Document>, delays: HashMap<String, Duration>) -> Arc<Self> {
        Arc::new(Self::build(documents, delays))
    }

    fn build(documents: Vec<Document>, delays: HashMap<String, Duration>) -> Self {
        Self { documents, requests: Mutex::new(Vec::new()), delays, fail: AtomicBool::new(false) }
    }

    /// Answer every request with a 500 until switched back.
    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<Url> {
        self.requests().pop()
    }
}

#[async_trait]
impl FilterApi for InMemoryFilter {
    async fn filter(&self, query: &FilterQuery) -> Result<Vec<Document>, ServerError> {
        let url = query.url()?;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url);
        }

        if let Some(delay) = self.delays.get(&query.ids.join(",")) {
            debug!(?delay, "delaying filter response");
            tokio::time::sleep(*delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServerError::Status { status: 500, body: "filter failed".into() });
        }

        if query.ids.is_empty() {
            return Ok(self.documents.clone());
        }
        let matches = |doc: &Document| match query.operation {
            FilterOperation::Any => query.ids.iter().any(|id| doc.tags.contains(id)),
            FilterOperation::All => query.ids.iter().all(|id| doc.tags.contains(id)),
        };
        Ok(self.documents.iter().filter(|d| matches(*d)).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
