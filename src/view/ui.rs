use schemars::JsonSchema;
use serde::Serialize;
use view_plugin::message::{DocumentDetailLink, SurfaceKind};

use crate::bridge::filter::FilterState;
use crate::bridge::links::ViewTab;
use crate::bridge::surface::{Layout, Surface};
use crate::server::Document;

/// Everything the host UI renders for one view, at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub layout: Layout,
    /// Main first, then whichever of right pane, modal and popup exist.
    pub surfaces: Vec<Surface>,
    pub filter: FilterState,
    /// What the filter entry displays.
    pub filter_label: String,
    pub documents: Vec<Document>,
    pub open_document: Option<i64>,
    pub links: Vec<DocumentDetailLink>,
    pub title: String,
    pub views: Vec<ViewTab>,
    /// Last failed filter, link or title call, until one of them succeeds.
    pub error: Option<String>,
}

impl UiState {
    pub fn surface(&self, kind: SurfaceKind) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.kind == kind)
    }

    pub fn has(&self, kind: SurfaceKind) -> bool {
        self.surface(kind).is_some()
    }

    pub fn document_ids(&self) -> Vec<i64> {
        self.documents.iter().map(|d| d.id).collect()
    }

    pub fn link_texts(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.text.as_str()).collect()
    }
}
