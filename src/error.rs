//! Error types for the mesh engine.
//!
//! Only faults a caller can act on are surfaced here. Malformed frames,
//! duplicates, exhausted TTLs and link-level failures are recovered inside
//! the engine and reported through logging and [`MeshStats`], never as
//! errors.
//!
//! [`MeshStats`]: crate::device::MeshStats

use crate::frame::MAX_PAYLOAD_LEN;
use thiserror::Error;

/// Mesh engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// A previous send is still awaiting link-level completion
    #[error("link busy with a previous send")]
    LinkBusy,

    /// The outbound message queue is at capacity
    #[error("outbound queue full")]
    QueueFull,

    /// Payload does not fit a single frame
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte frame limit")]
    PayloadTooLarge(usize),

    /// Operation requires `begin()` first
    #[error("engine not running")]
    NotRunning,

    /// Fault reported by the underlying radio driver
    #[error("driver error: {0}")]
    Driver(String),
}

/// Result type alias for mesh operations
pub type MeshResult<T> = Result<T, MeshError>;
