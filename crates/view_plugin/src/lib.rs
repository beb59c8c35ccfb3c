pub mod command;
pub mod message;
pub mod port;

pub use command::{BridgeCommand, CommandName, Inbound};
pub use message::{FrameId, PluginContext, SurfaceKind};
pub use port::{FramePort, PortError};
