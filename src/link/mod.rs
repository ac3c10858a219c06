//! Link adapter: single-in-flight sends over a half-duplex driver.
//!
//! The adapter marshals one outbound frame at a time to the radio and
//! owns both sides of the interrupt boundary: it drains the ISR capture
//! cell into a bounded cooperative queue and reconciles asynchronous
//! send-status reports into a small state machine.
//!
//! ## Send state machine
//!
//! ```text
//!         send()            tick(), rate-limited      ISR status
//! Idle ──────────► Armed ──────────────────► InFlight ─────────► StatusPending
//!  ▲                 ▲                                                │
//!  │                 │ failed attempt, tries left                     │
//!  │                 └────────────────────────────────────────────────┤
//!  │                     terminal: Success | Broadcast | Fail         │
//!  └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A driver "success" on a broadcast frame only means the frame entered
//! the air, not that any peer acknowledged it, so the terminal outcome is
//! remapped to [`LinkOutcome::Broadcast`] and never reads as delivery.

pub mod driver;

use crate::address::Address;
use crate::config::LinkConfig;
use crate::error::{MeshError, MeshResult};
use crate::frame::HEADER_LEN;
use driver::{LinkDriver, LinkShared};
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Terminal outcome of one link-level send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The peer acknowledged the frame at the link layer
    Success,
    /// The frame entered the air on the broadcast address; nobody acks
    /// broadcast, so this is weaker than `Success`
    Broadcast,
    /// All tries exhausted without a link-level acknowledgement
    Fail,
}

/// One frame delivered by the radio, tagged with the immediate sender
#[derive(Debug, Clone)]
pub struct IngressFrame {
    /// Radio address of the node the frame arrived from (one hop away)
    pub src: Address,
    /// Raw frame bytes
    pub bytes: Vec<u8>,
}

/// What one `tick()` produced for the owning layer
#[derive(Debug, Default)]
pub struct LinkEvents {
    /// At most one buffered ingress frame per tick
    pub received: Option<IngressFrame>,
    /// Terminal outcome of the staged send, when it completed this tick
    pub sent: Option<LinkOutcome>,
}

#[derive(Debug)]
struct Staged {
    dst: Address,
    channel: u8,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
enum SendState {
    #[default]
    Idle,
    Armed {
        staged: Staged,
        tries_left: u8,
    },
    InFlight {
        staged: Staged,
        tries_left: u8,
    },
    StatusPending {
        staged: Staged,
        tries_left: u8,
        ok: bool,
    },
}

/// Link adapter counters
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    /// Frames dropped in interrupt context (slot busy or oversize)
    pub isr_dropped: u32,
    /// Frames dropped because the cooperative ingress queue was full
    pub ingress_overflow: u64,
    /// Frames dropped because they were shorter than a frame header
    pub runt_frames: u64,
    /// Driver send attempts issued
    pub sends_attempted: u64,
    /// Sends that ended in [`LinkOutcome::Fail`]
    pub sends_failed: u64,
}

/// Serializes sends over a half-duplex driver with asynchronous
/// completion, bounded retries, and de-ISR ingress queueing.
#[derive(Debug)]
pub struct LinkAdapter<D: LinkDriver> {
    driver: D,
    cfg: LinkConfig,
    send_interval: Duration,
    shared: Arc<LinkShared>,
    local: Address,
    running: bool,
    ingress: VecDeque<IngressFrame>,
    state: SendState,
    /// Time since the last driver send call; primed so the first send
    /// after a quiet period goes out immediately
    since_emit: Duration,
    ingress_overflow: u64,
    runt_frames: u64,
    sends_attempted: u64,
    sends_failed: u64,
}

impl<D: LinkDriver> LinkAdapter<D> {
    /// Create a new adapter over a driver
    pub fn new(driver: D, cfg: LinkConfig) -> Self {
        let send_interval = Duration::from_millis(cfg.send_interval_ms);
        Self {
            driver,
            cfg,
            send_interval,
            shared: Arc::new(LinkShared::default()),
            local: Address::BROADCAST,
            running: false,
            ingress: VecDeque::new(),
            state: SendState::Idle,
            since_emit: send_interval,
            ingress_overflow: 0,
            runt_frames: 0,
            sends_attempted: 0,
            sends_failed: 0,
        }
    }

    /// Initialize the driver, register the interrupt sinks and cache the
    /// local address.
    pub fn begin(&mut self) -> MeshResult<()> {
        self.driver.init()?;
        self.driver.attach(Arc::clone(&self.shared));
        self.local = self.driver.local_address();
        self.running = true;
        debug!(local = %self.local, "link adapter up");
        Ok(())
    }

    /// Unregister the interrupt sinks and tear the driver down. The
    /// staged send, if any, loses its completion path.
    pub fn stop(&mut self) {
        self.driver.detach();
        self.driver.deinit();
        self.running = false;
        self.state = SendState::Idle;
        self.ingress.clear();
        debug!(local = %self.local, "link adapter down");
    }

    /// The radio's own address, cached at `begin()`
    pub fn local_address(&self) -> Address {
        self.local
    }

    /// Adapter configuration
    pub fn config(&self) -> &LinkConfig {
        &self.cfg
    }

    /// True iff no send is staged or in flight
    pub fn sending_possible(&self) -> bool {
        self.running && matches!(self.state, SendState::Idle)
    }

    /// Stage one frame for transmission. Rejected with
    /// [`MeshError::LinkBusy`] while a previous send awaits completion.
    pub fn send(
        &mut self,
        dst: Address,
        bytes: &[u8],
        max_tries: u8,
        channel: u8,
    ) -> MeshResult<()> {
        if !self.running {
            return Err(MeshError::NotRunning);
        }
        if !matches!(self.state, SendState::Idle) {
            return Err(MeshError::LinkBusy);
        }
        trace!(%dst, len = bytes.len(), max_tries, "send staged");
        self.state = SendState::Armed {
            staged: Staged {
                dst,
                channel,
                bytes: bytes.to_vec(),
            },
            tries_left: max_tries.max(1),
        };
        Ok(())
    }

    /// Drive the adapter: drain the interrupt capture, reconcile the
    /// send status, emit the staged frame when eligible, and surface at
    /// most one ingress frame and one send outcome.
    pub fn tick(&mut self, elapsed: Duration) -> LinkEvents {
        if !self.running {
            return LinkEvents::default();
        }
        self.since_emit = self.since_emit.saturating_add(elapsed);

        self.drain_isr_capture();
        self.reconcile_status();
        let sent = self.advance_send();
        let received = self.ingress.pop_front();

        LinkEvents { received, sent }
    }

    /// Adapter counters
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            isr_dropped: self.shared.isr_dropped(),
            ingress_overflow: self.ingress_overflow,
            runt_frames: self.runt_frames,
            sends_attempted: self.sends_attempted,
            sends_failed: self.sends_failed,
        }
    }

    fn drain_isr_capture(&mut self) {
        let Some(raw) = self.shared.take_frame() else {
            return;
        };
        if raw.bytes().len() < HEADER_LEN {
            self.runt_frames += 1;
            debug!(src = %raw.src, len = raw.bytes().len(), "dropping runt frame");
            return;
        }
        if self.ingress.len() >= self.cfg.ingress_capacity {
            self.ingress_overflow += 1;
            warn!(src = %raw.src, "ingress queue full, dropping frame");
            return;
        }
        self.ingress.push_back(IngressFrame {
            src: raw.src,
            bytes: raw.bytes().to_vec(),
        });
    }

    fn reconcile_status(&mut self) {
        let Some(ok) = self.shared.take_status() else {
            return;
        };
        match mem::take(&mut self.state) {
            SendState::InFlight { staged, tries_left } => {
                trace!(dst = %staged.dst, ok, "send status received");
                self.state = SendState::StatusPending {
                    staged,
                    tries_left,
                    ok,
                };
            }
            other => {
                // late or duplicate status from the driver
                trace!(ok, "discarding stray send status");
                self.state = other;
            }
        }
    }

    fn advance_send(&mut self) -> Option<LinkOutcome> {
        // resolve a completed attempt first
        if let SendState::StatusPending { .. } = self.state {
            let SendState::StatusPending {
                staged,
                tries_left,
                ok,
            } = mem::take(&mut self.state)
            else {
                unreachable!();
            };
            if ok {
                let outcome = if staged.dst.is_broadcast() {
                    LinkOutcome::Broadcast
                } else {
                    LinkOutcome::Success
                };
                return Some(self.finish(staged, outcome));
            }
            if tries_left == 0 {
                return Some(self.finish(staged, LinkOutcome::Fail));
            }
            trace!(dst = %staged.dst, tries_left, "send attempt failed, rearming");
            self.state = SendState::Armed { staged, tries_left };
        }

        // emit the staged frame when the rate limiter allows
        if matches!(self.state, SendState::Armed { .. }) && self.since_emit >= self.send_interval
        {
            return self.emit();
        }
        None
    }

    fn emit(&mut self) -> Option<LinkOutcome> {
        let SendState::Armed { staged, tries_left } = mem::take(&mut self.state) else {
            unreachable!();
        };
        self.since_emit = Duration::ZERO;
        let tries_left = tries_left - 1;
        self.sends_attempted += 1;
        match self.issue(&staged) {
            Ok(()) => {
                trace!(dst = %staged.dst, tries_left, "frame handed to driver");
                self.state = SendState::InFlight { staged, tries_left };
                None
            }
            Err(err) => {
                debug!(dst = %staged.dst, %err, "driver rejected send attempt");
                if tries_left == 0 {
                    Some(self.finish(staged, LinkOutcome::Fail))
                } else {
                    self.state = SendState::Armed { staged, tries_left };
                    None
                }
            }
        }
    }

    fn issue(&mut self, staged: &Staged) -> MeshResult<()> {
        if !staged.dst.is_broadcast() {
            self.driver.add_peer(staged.dst, staged.channel)?;
        }
        self.driver.try_send(staged.dst, &staged.bytes)
    }

    fn finish(&mut self, staged: Staged, outcome: LinkOutcome) -> LinkOutcome {
        if !staged.dst.is_broadcast() {
            if let Err(err) = self.driver.del_peer(staged.dst) {
                trace!(dst = %staged.dst, %err, "del_peer failed");
            }
        }
        if outcome == LinkOutcome::Fail {
            self.sends_failed += 1;
        }
        trace!(dst = %staged.dst, ?outcome, "send complete");
        self.state = SendState::Idle;
        outcome
    }
}
