//! Peer registry and signaling message routing

pub mod dispatcher;
pub mod messages;
pub mod registry;

pub use dispatcher::{DispatchOutcome, SignalingDispatcher};
pub use messages::{ClientFrame, ServerFrame};
pub use registry::{PeerId, PeerRegistry};
