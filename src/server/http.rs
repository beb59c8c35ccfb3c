use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error};
use url::Url;
use view_plugin::message::DocumentDetailLink;

use super::{Document, DocumentSetApi, FilterApi, FilterQuery, ServerError, ViewRecord};

/// Document-set server reached over its JSON API. Every request carries the
/// view's API token as a bearer token. API paths resolve under `base`, so a
/// server mounted below a path prefix works too.
#[derive(Debug, Clone)]
pub struct HttpDocumentSetApi {
    client: Client,
    base: Url,
    api_token: String,
}

impl HttpDocumentSetApi {
    pub fn new(base: Url, api_token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base, api_token)
    }

    pub fn with_client(client: Client, mut base: Url, api_token: impl Into<String>) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { client, base, api_token: api_token.into() }
    }

    fn views_path(document_set_id: i64) -> String {
        format!("api/v1/document-sets/{document_set_id}/views")
    }

    fn links_path(document_set_id: i64, view_id: i64, document_id: i64) -> String {
        format!(
            "{}/{view_id}/documents/{document_id}/links",
            Self::views_path(document_set_id)
        )
    }

    async fn call<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ServerError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let url = self.base.join(path)?;
        debug!(%method, %url, "document-set request");
        let mut req = self.client.request(method, url).bearer_auth(&self.api_token);
        if let Some(body) = body {
            req = req.json(body);
        }
        decode(req.send().await?, path).await
    }
}

async fn check(resp: Response, what: &str) -> Result<Response, ServerError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ServerError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_else(|_| "<no body>".into());
        error!("server error on {}: {} {}", what, status, body);
        return Err(ServerError::Status { status: status.as_u16(), body });
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, ServerError> {
    let resp = check(resp, what).await?;
    resp.json::<T>().await.map_err(|e| ServerError::Decode(e.to_string()))
}

#[async_trait]
impl DocumentSetApi for HttpDocumentSetApi {
    async fn list_documents(&self, document_set_id: i64) -> Result<Vec<Document>, ServerError> {
        let path = format!("api/v1/document-sets/{document_set_id}/documents");
        self.call(Method::GET, &path, None::<&()>).await
    }

    async fn list_views(&self, document_set_id: i64) -> Result<Vec<ViewRecord>, ServerError> {
        self.call(Method::GET, &Self::views_path(document_set_id), None::<&()>).await
    }

    async fn fetch_view(&self, document_set_id: i64, view_id: i64) -> Result<ViewRecord, ServerError> {
        let path = format!("{}/{view_id}", Self::views_path(document_set_id));
        self.call(Method::GET, &path, None::<&()>).await
    }

    async fn create_view(&self, document_set_id: i64, title: &str, url: &str) -> Result<ViewRecord, ServerError> {
        let body = json!({ "title": title, "url": url });
        self.call(Method::POST, &Self::views_path(document_set_id), Some(&body)).await
    }

    async fn update_view_title(
        &self,
        document_set_id: i64,
        view_id: i64,
        title: &str,
    ) -> Result<ViewRecord, ServerError> {
        let path = format!("{}/{view_id}", Self::views_path(document_set_id));
        self.call(Method::PUT, &path, Some(&json!({ "title": title }))).await
    }

    async fn delete_view(&self, document_set_id: i64, view_id: i64) -> Result<(), ServerError> {
        let path = format!("{}/{view_id}", Self::views_path(document_set_id));
        let url = self.base.join(&path)?;
        let resp = self.client.delete(url).bearer_auth(&self.api_token).send().await?;
        check(resp, &path).await.map(|_| ())
    }

    async fn fetch_document_links(
        &self,
        document_set_id: i64,
        view_id: i64,
        document_id: i64,
    ) -> Result<Vec<DocumentDetailLink>, ServerError> {
        let path = Self::links_path(document_set_id, view_id, document_id);
        self.call(Method::GET, &path, None::<&()>).await
    }

    async fn upsert_document_link(
        &self,
        document_set_id: i64,
        view_id: i64,
        link: &DocumentDetailLink,
    ) -> Result<DocumentDetailLink, ServerError> {
        let path = Self::links_path(document_set_id, view_id, link.document_id);
        self.call(Method::PUT, &path, Some(link)).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Calls the filter endpoint a plugin serves next to its pages.
#[derive(Debug, Clone, Default)]
pub struct HttpFilterApi {
    client: Client,
}

impl HttpFilterApi {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FilterApi for HttpFilterApi {
    async fn filter(&self, query: &FilterQuery) -> Result<Vec<Document>, ServerError> {
        let url = query.url()?;
        debug!(%url, "filter request");
        let resp = self.client.get(url.clone()).send().await?;
        decode(resp, url.path()).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use view_plugin::message::FilterOperation;

    #[tokio::test]
    async fn filter_sends_selection_in_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/filter/1010101")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("apiToken".into(), "abc123".into()),
                Matcher::UrlEncoded("ids".into(), "foo".into()),
                Matcher::UrlEncoded("operation".into(), "any".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 2, "title": "Second"}]"#)
            .create_async()
            .await;

        let query = FilterQuery {
            endpoint: Url::parse(&format!("{}/", server.url())).unwrap(),
            document_set_id: 1010101,
            api_token: "abc123".into(),
            ids: vec!["foo".into()],
            operation: FilterOperation::Any,
        };
        let docs = HttpFilterApi::new().filter(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(docs, vec![Document::new(2, "Second", &[])]);
    }

    #[tokio::test]
    async fn update_title_uses_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/v1/document-sets/1/views/5")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(json!({"title": "new-title"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 5, "title": "new-title", "url": "http://plugin.test/"}"#)
            .create_async()
            .await;

        let api = HttpDocumentSetApi::new(Url::parse(&server.url()).unwrap(), "tok");
        let view = api.update_view_title(1, 5, "new-title").await.unwrap();

        mock.assert_async().await;
        assert_eq!(view.title, "new-title");
    }

    #[tokio::test]
    async fn base_path_prefix_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/overview/api/v1/document-sets/1/views")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 5, "title": "view", "url": "http://plugin.test/"}]"#)
            .create_async()
            .await;

        let base = Url::parse(&format!("{}/overview", server.url())).unwrap();
        let views = HttpDocumentSetApi::new(base, "tok").list_views(1).await.unwrap();

        mock.assert_async().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, 5);
    }

    #[tokio::test]
    async fn server_errors_are_typed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/document-sets/1/views/9")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("PUT", "/api/v1/document-sets/1/views/5/documents/3/links")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let api = HttpDocumentSetApi::new(Url::parse(&server.url()).unwrap(), "tok");
        assert!(matches!(api.fetch_view(1, 9).await, Err(ServerError::NotFound(_))));

        let link = DocumentDetailLink { url: "http://p/foo".into(), text: "Text foo".into(), document_id: 3 };
        match api.upsert_document_link(1, 5, &link).await {
            Err(ServerError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
