use url::Url;
use view_plugin::message::{
    API_TOKEN_PARAM, DOCUMENT_SET_ID_PARAM, DocumentDetailLink, PluginContext, SERVER_PARAM,
};

pub const PLACEMENT_PARAM: &str = "placement";
pub const DOCUMENT_ID_PARAM: &str = "documentId";

/// Where a secondary plugin page is shown; told to the page in its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    RightPane,
    ModalDialog,
}

impl Placement {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Placement::RightPane => "right-pane",
            Placement::ModalDialog => "modal-dialog",
        }
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(
        key,
        SERVER_PARAM | DOCUMENT_SET_ID_PARAM | API_TOKEN_PARAM | PLACEMENT_PARAM | DOCUMENT_ID_PARAM
    )
}

/// Pushes the view's [`PluginContext`] into plugin load URLs.
#[derive(Debug, Clone)]
pub struct ContextInjector {
    context: PluginContext,
}

impl ContextInjector {
    pub fn new(context: PluginContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    /// `target` with `placement` (if any) first, the page's own parameters
    /// next and the context last. Any context keys already present on `target`
    /// are replaced so each appears exactly once.
    pub fn load_url(&self, target: &Url, placement: Option<Placement>) -> Url {
        let own: Vec<(String, String)> = target
            .query_pairs()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = target.clone();
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            if let Some(placement) = placement {
                query.append_pair(PLACEMENT_PARAM, placement.as_str());
            }
            for (k, v) in &own {
                query.append_pair(k, v);
            }
            query
                .append_pair(SERVER_PARAM, &self.context.server)
                .append_pair(DOCUMENT_SET_ID_PARAM, &self.context.document_set_id.to_string())
                .append_pair(API_TOKEN_PARAM, &self.context.api_token);
        }
        url
    }

    /// URL of the document-detail popup for `link`: the link's address with
    /// `documentId` first and the link's own query parameters after it. The
    /// link may point anywhere, so the API token is not added.
    pub fn popup_url(&self, link: &DocumentDetailLink) -> Result<Url, url::ParseError> {
        let target = Url::parse(&link.url)?;
        let own: Vec<(String, String)> = target
            .query_pairs()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = target;
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(DOCUMENT_ID_PARAM, &link.document_id.to_string());
            for (k, v) in &own {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injector() -> ContextInjector {
        let server = Url::parse("http://localhost:9000/").unwrap();
        ContextInjector::new(PluginContext::new(&server, 1010101, "tok123"))
    }

    #[test]
    fn main_url_is_exactly_the_context() {
        let url = injector().load_url(&Url::parse("http://plugin.test:3333/show").unwrap(), None);
        assert_eq!(
            url.query(),
            Some("server=http%3A%2F%2Flocalhost%3A9000&documentSetId=1010101&apiToken=tok123")
        );
    }

    #[test]
    fn context_is_never_duplicated() {
        let inj = injector();
        let once = inj.load_url(&Url::parse("http://plugin.test/show?lang=en").unwrap(), None);
        let twice = inj.load_url(&once, None);
        assert_eq!(once, twice);
        assert_eq!(twice.query_pairs().filter(|(k, _)| k == "apiToken").count(), 1);
        assert!(twice.query().unwrap().starts_with("lang=en&server="));
    }

    #[test]
    fn right_pane_placement_comes_first() {
        let url = injector().load_url(
            &Url::parse("http://plugin.test/right-pane").unwrap(),
            Some(Placement::RightPane),
        );
        assert!(url.as_str().contains("?placement=right-pane&server="));
    }

    #[test]
    fn popup_url_puts_document_id_before_link_params() {
        let link = DocumentDetailLink {
            url: "http://plugin.test:3333/foo?foo=foo".into(),
            text: "Text foo".into(),
            document_id: 42,
        };
        let url = injector().popup_url(&link).unwrap();
        assert_eq!(url.as_str(), "http://plugin.test:3333/foo?documentId=42&foo=foo");
        assert!(url.query_pairs().all(|(k, _)| k != "apiToken"));
    }

    #[test]
    fn popup_url_rejects_relative_links() {
        let link = DocumentDetailLink { url: "foo".into(), text: "t".into(), document_id: 1 };
        assert!(injector().popup_url(&link).is_err());
    }
}
