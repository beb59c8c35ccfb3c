use schemars::JsonSchema;
use serde::Serialize;
use tracing::debug;
use view_plugin::message::DocumentDetailLink;

use crate::server::ViewRecord;

/// A view's title as shown in the tab strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewTab {
    pub id: i64,
    pub title: String,
}

impl From<&ViewRecord> for ViewTab {
    fn from(record: &ViewRecord) -> Self {
        Self { id: record.id, title: record.title.clone() }
    }
}

/// Local copy of what the document-set server persists for a view: its
/// title and the detail links of the currently open document.
#[derive(Debug, Clone)]
pub struct LinkStore {
    view_id: i64,
    title: String,
    views: Vec<ViewTab>,
    open_document: Option<i64>,
    links: Vec<DocumentDetailLink>,
}

impl LinkStore {
    pub fn new(view_id: i64) -> Self {
        Self { view_id, title: String::new(), views: Vec::new(), open_document: None, links: Vec::new() }
    }

    pub fn view_id(&self) -> i64 {
        self.view_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn views(&self) -> &[ViewTab] {
        &self.views
    }

    pub fn open_document(&self) -> Option<i64> {
        self.open_document
    }

    pub fn links(&self) -> &[DocumentDetailLink] {
        &self.links
    }

    /// Local title change, visible before the server confirms it. The tab of
    /// this view follows.
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        if let Some(tab) = self.views.iter_mut().find(|t| t.id == self.view_id) {
            tab.title = title.to_string();
        }
    }

    /// Server view of our own record.
    pub fn apply_view(&mut self, record: &ViewRecord) {
        if record.id == self.view_id {
            self.set_title(&record.title);
        }
    }

    pub fn set_views(&mut self, records: &[ViewRecord]) {
        self.views = records.iter().map(ViewTab::from).collect();
        if let Some(own) = records.iter().find(|r| r.id == self.view_id) {
            self.title = own.title.clone();
        }
    }

    /// Refresh the tab strip from a listing that may predate the local
    /// title. Our own tab keeps the local title.
    pub fn set_tabs(&mut self, records: &[ViewRecord]) {
        self.views = records.iter().map(ViewTab::from).collect();
        let title = self.title.clone();
        if let Some(tab) = self.views.iter_mut().find(|t| t.id == self.view_id) {
            tab.title = title;
        }
    }

    /// Opening a document starts with no links until the server answers.
    pub fn open(&mut self, document_id: i64) {
        self.open_document = Some(document_id);
        self.links.clear();
    }

    pub fn close(&mut self) -> Option<i64> {
        self.links.clear();
        self.open_document.take()
    }

    /// Bind a plugin's `setDocumentDetailLink` to the open document. `None`
    /// when no document is open; the call is then ignored.
    pub fn stage_link(&self, url: &str, text: &str) -> Option<DocumentDetailLink> {
        let document_id = self.open_document?;
        Some(DocumentDetailLink { url: url.to_string(), text: text.to_string(), document_id })
    }

    /// Links fetched from the server for `document_id`. Dropped if the user
    /// has moved on to another document meanwhile.
    pub fn replace_links(&mut self, document_id: i64, links: Vec<DocumentDetailLink>) -> bool {
        if self.open_document != Some(document_id) {
            debug!(document_id, "ignoring links for a document that is no longer open");
            return false;
        }
        self.links.clear();
        for link in links {
            self.upsert(link);
        }
        true
    }

    /// A link the server has accepted. Same `(document, url)` replaces the
    /// text in place; a new url is appended.
    pub fn apply_persisted_link(&mut self, link: DocumentDetailLink) -> bool {
        if self.open_document != Some(link.document_id) {
            return false;
        }
        self.upsert(link);
        true
    }

    fn upsert(&mut self, link: DocumentDetailLink) {
        match self.links.iter_mut().find(|l| l.url == link.url) {
            Some(existing) => existing.text = link.text,
            None => self.links.push(link),
        }
    }

    /// Forget everything; the server is the source of truth after a reload.
    pub fn reset(&mut self) {
        *self = Self::new(self.view_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, text: &str, document_id: i64) -> DocumentDetailLink {
        DocumentDetailLink { url: url.into(), text: text.into(), document_id }
    }

    #[test]
    fn links_need_an_open_document() {
        let mut store = LinkStore::new(1);
        assert!(store.stage_link("http://plugin.test/foo", "Text foo").is_none());

        store.open(42);
        let staged = store.stage_link("http://plugin.test/foo", "Text foo").unwrap();
        assert_eq!(staged.document_id, 42);
        assert!(store.links().is_empty());
    }

    #[test]
    fn same_url_updates_text() {
        let mut store = LinkStore::new(1);
        store.open(42);
        assert!(store.apply_persisted_link(link("http://plugin.test/foo", "Text foo", 42)));
        assert!(store.apply_persisted_link(link("http://plugin.test/foo", "foo with different text", 42)));
        assert!(store.apply_persisted_link(link("http://plugin.test/bar", "Text bar", 42)));

        let texts: Vec<&str> = store.links().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["foo with different text", "Text bar"]);
    }

    #[test]
    fn late_results_for_other_documents_are_dropped() {
        let mut store = LinkStore::new(1);
        store.open(1);
        store.open(2);
        assert!(!store.replace_links(1, vec![link("http://plugin.test/a", "a", 1)]));
        assert!(!store.apply_persisted_link(link("http://plugin.test/a", "a", 1)));
        assert!(store.links().is_empty());

        assert!(store.replace_links(2, vec![link("http://plugin.test/b", "b", 2)]));
        assert_eq!(store.links().len(), 1);
        assert_eq!(store.close(), Some(2));
        assert!(store.links().is_empty());
    }

    #[test]
    fn title_follows_into_tab() {
        let mut store = LinkStore::new(7);
        store.set_views(&[
            ViewRecord { id: 3, title: "other".into(), url: "http://a/".into() },
            ViewRecord { id: 7, title: "mine".into(), url: "http://b/".into() },
        ]);
        assert_eq!(store.title(), "mine");

        store.set_title("renamed");
        assert_eq!(store.views()[1].title, "renamed");
        assert_eq!(store.views()[0].title, "other");

        store.reset();
        assert_eq!(store.title(), "");
        assert!(store.views().is_empty());
    }

    #[test]
    fn tabs_from_an_older_listing_keep_the_local_title() {
        let mut store = LinkStore::new(7);
        store.set_title("renamed");
        store.set_tabs(&[
            ViewRecord { id: 3, title: "other".into(), url: "http://a/".into() },
            ViewRecord { id: 7, title: "mine".into(), url: "http://b/".into() },
        ]);

        assert_eq!(store.title(), "renamed");
        let titles: Vec<&str> = store.views().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["other", "renamed"]);
    }
}
