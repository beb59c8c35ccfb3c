//! Boundary to the two servers a view talks to: the document-set server that
//! owns documents and view metadata, and the plugin's own filter endpoint.
//!
//! Both are traits so the bridge can run against HTTP ([`http`]) or an
//! in-process store ([`memory`]).

use std::fmt;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use view_plugin::message::{DocumentDetailLink, FilterOperation};

pub mod http;
pub mod memory;

pub use http::{HttpDocumentSetApi, HttpFilterApi};
pub use memory::{InMemoryDocumentSet, InMemoryFilter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for ServerError {
    fn from(err: reqwest::Error) -> ServerError {
        if err.is_decode() {
            ServerError::Decode(err.to_string())
        } else {
            ServerError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for ServerError {
    fn from(err: url::ParseError) -> ServerError {
        ServerError::Transport(format!("bad url: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Document {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Document {
    pub fn new(id: i64, title: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            id,
            title: title.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// A view as the document-set server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ViewRecord {
    pub id: i64,
    pub title: String,
    pub url: String,
}

/// Document-set server operations the bridge relies on.
#[async_trait]
pub trait DocumentSetApi: Send + Sync {
    async fn list_documents(&self, document_set_id: i64) -> Result<Vec<Document>, ServerError>;

    async fn list_views(&self, document_set_id: i64) -> Result<Vec<ViewRecord>, ServerError>;
    async fn fetch_view(&self, document_set_id: i64, view_id: i64) -> Result<ViewRecord, ServerError>;
    async fn create_view(&self, document_set_id: i64, title: &str, url: &str) -> Result<ViewRecord, ServerError>;
    async fn update_view_title(
        &self,
        document_set_id: i64,
        view_id: i64,
        title: &str,
    ) -> Result<ViewRecord, ServerError>;
    async fn delete_view(&self, document_set_id: i64, view_id: i64) -> Result<(), ServerError>;

    async fn fetch_document_links(
        &self,
        document_set_id: i64,
        view_id: i64,
        document_id: i64,
    ) -> Result<Vec<DocumentDetailLink>, ServerError>;

    /// Create or update the link with this `(document_id, url)`.
    async fn upsert_document_link(
        &self,
        document_set_id: i64,
        view_id: i64,
        link: &DocumentDetailLink,
    ) -> Result<DocumentDetailLink, ServerError>;

    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn DocumentSetApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSetApi").field("impl", &self.name()).finish()
    }
}

/// `GET {endpoint}/filter/{documentSetId}?apiToken=..&ids=..&operation=..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterQuery {
    /// Directory URL the `filter/` path is resolved against.
    pub endpoint: Url,
    pub document_set_id: i64,
    pub api_token: String,
    pub ids: Vec<String>,
    pub operation: FilterOperation,
}

impl FilterQuery {
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let mut url = self.endpoint.join(&format!("filter/{}", self.document_set_id))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("apiToken", &self.api_token)
            .append_pair("ids", &self.ids.join(","))
            .append_pair("operation", self.operation.as_str());
        Ok(url)
    }
}

/// The plugin-side filter endpoint: turns a selection into a document list.
#[async_trait]
pub trait FilterApi: Send + Sync {
    async fn filter(&self, query: &FilterQuery) -> Result<Vec<Document>, ServerError>;

    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn FilterApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterApi").field("impl", &self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_url_shape() {
        let query = FilterQuery {
            endpoint: Url::parse("http://plugin.test:3333/").unwrap(),
            document_set_id: 1010101,
            api_token: "abc123".into(),
            ids: vec!["foo".into()],
            operation: FilterOperation::Any,
        };
        let url = query.url().unwrap();
        assert_eq!(url.path(), "/filter/1010101");
        assert_eq!(url.query(), Some("apiToken=abc123&ids=foo&operation=any"));
    }

    #[test]
    fn filter_url_joins_ids_with_commas() {
        let query = FilterQuery {
            endpoint: Url::parse("http://plugin.test/api/").unwrap(),
            document_set_id: 7,
            api_token: "t".into(),
            ids: vec!["foo".into(), "bar".into()],
            operation: FilterOperation::All,
        };
        let url = query.url().unwrap();
        assert_eq!(url.path(), "/api/filter/7");
        let ids = url.query_pairs().find(|(k, _)| k == "ids").map(|(_, v)| v.into_owned());
        assert_eq!(ids.as_deref(), Some("foo,bar"));
    }
}
