pub mod bridge;
pub mod config;
pub mod error;
pub mod logger;
pub mod schema;
pub mod server;
pub mod view;

pub use error::BridgeError;
pub use view::{ViewConfig, ViewHandle, ViewHost};
