use thiserror::Error;
use view_plugin::FrameId;

use crate::server::ServerError;

/// Everything that can go wrong inside a view's bridge. None of these ever
/// reach a plugin: the router logs them, and server failures are also
/// shown in the host UI.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A message could not reach a frame that no longer exists.
    #[error("frame `{0}` no longer exists")]
    Transport(FrameId),

    #[error("unknown command `{command}`: {reason}")]
    UnknownCommand { command: String, reason: String },

    /// A server call behind a bridge command failed.
    #[error("{operation} request failed: {source}")]
    Server {
        operation: &'static str,
        #[source]
        source: ServerError,
    },

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The view host task has stopped.
    #[error("view host is shut down")]
    Closed,
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> BridgeError {
        BridgeError::InvalidArgs(err.to_string())
    }
}
