//! The host side of the plugin bridge: transport, context injection,
//! dispatch, and the state each bridge call acts on.

pub mod channel;
pub mod context;
pub mod filter;
pub mod links;
pub mod router;
pub mod surface;

pub use channel::MessageChannel;
pub use context::{ContextInjector, Placement};
pub use filter::{FilterCoordinator, FilterState};
pub use links::LinkStore;
pub use router::{BridgeRouter, Completion, Services};
pub use surface::{FrameLoader, Layout, Surface, SurfaceManager};
