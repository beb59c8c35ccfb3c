use schemars::JsonSchema;
use serde::Serialize;
use tracing::debug;
use url::Url;
use view_plugin::message::{FilterChoice, FilterOperation, PluginContext, ViewFilterDescriptor};

use crate::error::BridgeError;
use crate::server::FilterQuery;

/// Filter state as the host UI shows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// `false` until the plugin calls `setViewFilter`; the UI entry is hidden.
    pub declared: bool,
    pub placeholder: String,
    pub choices: Vec<FilterChoice>,
    /// Selected choice ids, deduplicated, in selection order.
    pub selection: Vec<String>,
    pub operation: FilterOperation,
}

impl FilterState {
    /// Text of the filter entry: selected labels, or the placeholder.
    pub fn label(&self) -> String {
        let labels: Vec<&str> = self
            .selection
            .iter()
            .map(|id| {
                self.choices
                    .iter()
                    .find(|c| &c.id == id)
                    .map(|c| c.label.as_str())
                    .unwrap_or(id.as_str())
            })
            .collect();
        if labels.is_empty() { self.placeholder.clone() } else { labels.join(", ") }
    }
}

/// A filter request the router must run; `seq` identifies it when the
/// response comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRequest {
    pub seq: u64,
    pub query: FilterQuery,
}

/// Tracks what the plugin declared and which selection is current, and turns
/// every selection change into a [`FilterRequest`].
#[derive(Debug, Clone)]
pub struct FilterCoordinator {
    state: FilterState,
    context: PluginContext,
    plugin_url: Url,
    endpoint: Url,
    last_seq: u64,
}

impl FilterCoordinator {
    pub fn new(context: PluginContext, plugin_url: Url) -> Self {
        let endpoint = origin_root(&plugin_url);
        Self { state: FilterState::default(), context, plugin_url, endpoint, last_seq: 0 }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `setViewFilter`: show the filter entry in the host UI.
    pub fn declare(&mut self, descriptor: ViewFilterDescriptor) -> Result<(), BridgeError> {
        if let Some(url) = &descriptor.url {
            let mut endpoint = self.plugin_url.join(url)?;
            if !endpoint.path().ends_with('/') {
                let path = format!("{}/", endpoint.path());
                endpoint.set_path(&path);
            }
            self.endpoint = endpoint;
        }
        self.state.declared = true;
        self.state.placeholder = descriptor.placeholder;
        if !descriptor.choices.is_empty() {
            self.state.choices = descriptor.choices;
        }
        debug!(endpoint = %self.endpoint, "view filter declared");
        Ok(())
    }

    /// `setViewFilterChoices`: local only, no server call.
    pub fn set_choices(&mut self, choices: Vec<FilterChoice>) {
        self.state.choices = choices;
    }

    /// `setViewFilterSelection` and clicks in the filter UI both end here.
    /// Always yields a request, even if the selection did not change.
    pub fn select(&mut self, ids: &[String], operation: FilterOperation) -> FilterRequest {
        let mut selection: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !selection.contains(id) {
                selection.push(id.clone());
            }
        }
        self.state.selection = selection;
        self.state.operation = operation;
        self.request()
    }

    /// A click on one choice in the filter UI.
    pub fn toggle(&mut self, id: &str) -> FilterRequest {
        let mut ids = self.state.selection.clone();
        match ids.iter().position(|s| s == id) {
            Some(i) => {
                ids.remove(i);
            }
            None => ids.push(id.to_string()),
        }
        let operation = self.state.operation;
        self.select(&ids, operation)
    }

    fn request(&mut self) -> FilterRequest {
        self.last_seq += 1;
        FilterRequest {
            seq: self.last_seq,
            query: FilterQuery {
                endpoint: self.endpoint.clone(),
                document_set_id: self.context.document_set_id,
                api_token: self.context.api_token.clone(),
                ids: self.state.selection.clone(),
                operation: self.state.operation,
            },
        }
    }

    /// Responses are applied only for the newest request; anything older lost
    /// the race and is dropped.
    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.last_seq
    }
}

fn origin_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> FilterCoordinator {
        let server = Url::parse("http://localhost:9000").unwrap();
        FilterCoordinator::new(
            PluginContext::new(&server, 1010101, "tok"),
            Url::parse("http://plugin.test:3333/show?x=1").unwrap(),
        )
    }

    fn descriptor() -> ViewFilterDescriptor {
        ViewFilterDescriptor {
            placeholder: "view-filter placeholder".into(),
            url: None,
            choices: vec![FilterChoice::new("foo", "VF-Foo"), FilterChoice::new("bar", "VF-Bar")],
        }
    }

    #[test]
    fn declare_shows_placeholder() {
        let mut coord = coordinator();
        assert!(!coord.state().declared);
        coord.declare(descriptor()).unwrap();
        assert!(coord.state().declared);
        assert_eq!(coord.state().label(), "view-filter placeholder");
        assert_eq!(coord.endpoint().as_str(), "http://plugin.test:3333/");
    }

    #[test]
    fn declare_with_relative_endpoint() {
        let mut coord = coordinator();
        let mut d = descriptor();
        d.url = Some("/api".into());
        coord.declare(d).unwrap();
        assert_eq!(coord.endpoint().as_str(), "http://plugin.test:3333/api/");
    }

    #[test]
    fn choices_replace_without_request() {
        let mut coord = coordinator();
        coord.declare(descriptor()).unwrap();
        coord.set_choices(vec![FilterChoice::new("foo2", "VF-Foo2")]);
        assert_eq!(coord.state().choices.len(), 1);
        assert!(coord.is_current(0));
    }

    #[test]
    fn every_selection_is_a_new_request() {
        let mut coord = coordinator();
        coord.declare(descriptor()).unwrap();

        let ids = vec!["foo".to_string(), "foo".to_string()];
        let first = coord.select(&ids, FilterOperation::Any);
        let second = coord.select(&ids, FilterOperation::Any);

        assert_eq!(first.query.ids, vec!["foo".to_string()]);
        assert_eq!(first.query, second.query);
        assert_ne!(first.seq, second.seq);
        assert!(!coord.is_current(first.seq));
        assert!(coord.is_current(second.seq));
        assert_eq!(coord.state().label(), "VF-Foo");

        let url = second.query.url().unwrap();
        assert_eq!(url.path(), "/filter/1010101");
        assert_eq!(url.query(), Some("apiToken=tok&ids=foo&operation=any"));
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut coord = coordinator();
        coord.declare(descriptor()).unwrap();

        assert_eq!(coord.toggle("foo").query.ids, vec!["foo".to_string()]);
        assert_eq!(coord.toggle("bar").query.ids, vec!["foo".to_string(), "bar".to_string()]);
        assert_eq!(coord.toggle("foo").query.ids, vec!["bar".to_string()]);
        assert_eq!(coord.state().label(), "VF-Bar");
    }
}
