use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Identity of one plugin frame inside a view. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FrameId(pub String);

impl FrameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The rendering regions a view can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceKind {
    Main,
    RightPane,
    Modal,
    DocumentDetailPopup,
}

impl SurfaceKind {
    /// Name of the frame element the host renders for this surface.
    pub const fn frame_name(&self) -> &'static str {
        match self {
            SurfaceKind::Main => "view-app-iframe",
            SurfaceKind::RightPane => "view-app-right-pane-iframe",
            SurfaceKind::Modal => "view-app-modal-dialog-iframe",
            SurfaceKind::DocumentDetailPopup => "view-document-detail",
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.frame_name())
    }
}

pub const SERVER_PARAM: &str = "server";
pub const DOCUMENT_SET_ID_PARAM: &str = "documentSetId";
pub const API_TOKEN_PARAM: &str = "apiToken";

/// Read-only context every plugin frame of a view receives at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    /// Origin of the document-set server, e.g. `http://localhost:9000`.
    pub server: String,
    pub document_set_id: i64,
    pub api_token: String,
}

impl PluginContext {
    pub fn new(server: &Url, document_set_id: i64, api_token: impl Into<String>) -> Self {
        Self {
            server: server.origin().ascii_serialization(),
            document_set_id,
            api_token: api_token.into(),
        }
    }

    /// Recover the context from a frame's load URL. This is what a plugin does
    /// on startup; there is no message to ask the host for it.
    pub fn from_url(url: &Url) -> Option<Self> {
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        Some(Self {
            server: pairs.get(SERVER_PARAM)?.clone(),
            document_set_id: pairs.get(DOCUMENT_SET_ID_PARAM)?.parse().ok()?,
            api_token: pairs.get(API_TOKEN_PARAM)?.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FilterChoice {
    pub id: String,
    pub label: String,
}

impl FilterChoice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperation {
    #[default]
    Any,
    All,
}

impl FilterOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FilterOperation::Any => "any",
            FilterOperation::All => "all",
        }
    }
}

/// What a plugin declares with `setViewFilter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilterDescriptor {
    /// Label of the filter entry in the host UI until something is selected.
    pub placeholder: String,
    /// Base URL of the filter endpoint. Defaults to the plugin's origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub choices: Vec<FilterChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetailLink {
    pub url: String,
    pub text: String,
    pub document_id: i64,
}

/// One message as it travels from a frame to the host. `data` is the
/// serialized JSON payload; `origin` is the origin the frame had when it posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub frame: FrameId,
    pub origin: String,
    pub data: String,
    pub sent_at: DateTime<Utc>,
}
