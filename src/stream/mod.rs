//! Video chunk distribution

pub mod broadcast;

pub use broadcast::{ChunkBroadcaster, ViewerGuard, ViewerId};
