//! # nowmesh
//!
//! A tick-driven mesh message engine for half-duplex broadcast radios
//! with asynchronous send completion (ESP-NOW-class hardware, though the
//! driver contract is transport-agnostic). It provides reliable,
//! loop-free delivery of short datagrams across a single-channel mesh:
//! end-to-end acknowledgements with timeouts, duplicate suppression,
//! hop-count-bounded forwarding, and opportunistic shortest-hop routing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Application                           │
//! │        send_message / send_confirmed_message / callbacks     │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 MeshDevice      ◄──►      Forwarder          │
//! │   framing · outbound queue · dedup      (NullForwarder or    │
//! │   acks & timeouts · dispatch             TableForwarder)     │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        LinkAdapter                           │
//! │   single-in-flight sends · retries · de-ISR ingress queue    │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    LinkDriver (trait)                        │
//! │      init · add_peer · try_send · ISR cells (LinkShared)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Control flow is cooperative: each node exposes a single
//! `tick(elapsed)` driven from the host's main loop, and everything,
//! application callbacks included, runs to completion on that thread.
//! The only concurrent party is the radio's interrupt context, confined
//! to the two cells in [`link::driver::LinkShared`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use nowmesh::prelude::*;
//! use std::time::Duration;
//!
//! let mut node = MeshDevice::new(driver, MeshConfig::default(), LinkConfig::default());
//! node.begin()?;
//! node.set_on_message(|_type, src, payload| {
//!     println!("from {src}: {payload:?}");
//! });
//! node.send_confirmed_message(b"hello", peer)?;
//!
//! loop {
//!     node.tick(Duration::from_millis(10));
//!     // sleep or run other cooperative work
//! }
//! ```

pub mod address;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod link;
pub mod router;
pub mod routing;
pub mod seen;
pub mod simulation;

// Re-export main types
pub use address::Address;
pub use config::{LinkConfig, MeshConfig, RouterConfig};
pub use device::{ForeignDrop, Forwarder, MeshDevice, MeshStats, NullForwarder, SendStatus};
pub use error::{MeshError, MeshResult};
pub use frame::{Frame, FrameType, MessageKind, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
pub use link::driver::{LinkDriver, LinkShared};
pub use link::{LinkAdapter, LinkOutcome, LinkStats};
pub use router::{MeshRouter, TableForwarder};
pub use routing::{RouteEntry, RoutingTable};
pub use seen::SeenSet;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::address::Address;
    pub use crate::config::{LinkConfig, MeshConfig, RouterConfig};
    pub use crate::device::{MeshDevice, SendStatus};
    pub use crate::error::{MeshError, MeshResult};
    pub use crate::frame::{Frame, FrameType};
    pub use crate::link::driver::{LinkDriver, LinkShared};
    pub use crate::router::MeshRouter;
}
