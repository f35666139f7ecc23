//! Camera subprocess supervision
//!
//! The camera itself is owned by an external capture process
//! (libcamera-vid, or raspivid on older stacks). This module resolves
//! quality names into encoder settings, builds the capture command
//! lines, and supervises the single live subprocess.

pub mod quality;
pub mod session;

pub use quality::{CaptureCommand, QualityProfile, StreamQuality};
pub use session::StreamSession;
