//! Radio driver contract and interrupt-side shared state.
//!
//! The engine consumes an ESP-NOW-class primitive: send one frame to a
//! peer, learn the outcome from an asynchronous callback, and receive
//! frames in interrupt context. [`LinkDriver`] is that contract; the
//! [`LinkShared`] cells are the only state an interrupt handler touches.
//!
//! Interrupt discipline: the receive path writes through a single-slot
//! cell whose `offer` never blocks: when the cooperative side is mid-copy
//! or the slot is still occupied, the frame is dropped and counted.
//! The send-status path is one atomic word. Nothing else crosses the
//! interrupt boundary.

use crate::address::Address;
use crate::error::MeshResult;
use crate::frame::MAX_FRAME_LEN;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// One frame exactly as the receive interrupt captured it
#[derive(Clone, Copy)]
pub struct RawIngress {
    /// Radio address of the immediate sender
    pub src: Address,
    len: u8,
    data: [u8; MAX_FRAME_LEN],
}

impl RawIngress {
    /// The captured frame bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Debug for RawIngress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawIngress")
            .field("src", &self.src)
            .field("len", &self.len)
            .finish()
    }
}

/// Single-slot hand-off cell from the receive interrupt to `tick()`.
///
/// `try_lock` on the slot doubles as the busy flag: an interrupt that
/// finds the cooperative side copying drops the frame instead of
/// waiting. Drops are counted, not reported.
#[derive(Debug, Default)]
pub struct IngressCell {
    slot: Mutex<Option<RawIngress>>,
    dropped: AtomicU32,
}

impl IngressCell {
    /// Interrupt side: stage a received frame. Never blocks. Returns
    /// false when the frame was dropped (slot busy, slot full, or frame
    /// oversize).
    pub fn offer(&self, src: Address, bytes: &[u8]) -> bool {
        if bytes.len() > MAX_FRAME_LEN {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.slot.try_lock() {
            Ok(mut slot) if slot.is_none() => {
                let mut data = [0u8; MAX_FRAME_LEN];
                data[..bytes.len()].copy_from_slice(bytes);
                *slot = Some(RawIngress {
                    src,
                    len: bytes.len() as u8,
                    data,
                });
                true
            }
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Cooperative side: move the staged frame out, if any.
    pub fn take(&self) -> Option<RawIngress> {
        self.slot.lock().ok()?.take()
    }

    /// Frames dropped at the interrupt boundary since startup
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

const STATUS_NONE: u8 = 0;
const STATUS_OK: u8 = 1;
const STATUS_FAIL: u8 = 2;

/// One-word cell carrying the driver's asynchronous send outcome
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Interrupt side: record the outcome of the last send attempt.
    pub fn report(&self, ok: bool) {
        let status = if ok { STATUS_OK } else { STATUS_FAIL };
        self.0.store(status, Ordering::Release);
    }

    /// Cooperative side: consume the outcome, if one arrived.
    pub fn take(&self) -> Option<bool> {
        match self.0.swap(STATUS_NONE, Ordering::AcqRel) {
            STATUS_OK => Some(true),
            STATUS_FAIL => Some(false),
            _ => None,
        }
    }
}

/// State shared between the driver's interrupt context and the adapter.
///
/// The adapter hands one `Arc<LinkShared>` to the driver at `begin()`;
/// the driver routes its receive and send-status interrupts into it.
/// This is the whole interrupt surface: each adapter owns its cells and
/// exactly one driver writes to them.
#[derive(Debug, Default)]
pub struct LinkShared {
    ingress: IngressCell,
    status: StatusCell,
}

impl LinkShared {
    /// Interrupt side: stage a received frame (`src` is the immediate
    /// sender's radio address). Returns false if dropped.
    pub fn offer_frame(&self, src: Address, bytes: &[u8]) -> bool {
        self.ingress.offer(src, bytes)
    }

    /// Interrupt side: report the last send attempt's outcome.
    pub fn report_send_status(&self, ok: bool) {
        self.status.report(ok);
    }

    pub(crate) fn take_frame(&self) -> Option<RawIngress> {
        self.ingress.take()
    }

    pub(crate) fn take_status(&self) -> Option<bool> {
        self.status.take()
    }

    /// Frames dropped at the interrupt boundary
    pub fn isr_dropped(&self) -> u32 {
        self.ingress.dropped()
    }
}

/// Contract the link adapter consumes from the underlying radio.
///
/// `attach` hands the driver the shared cells its interrupt handlers
/// write into; `detach` must stop those writes before returning. A
/// driver instance serves exactly one adapter.
pub trait LinkDriver {
    /// Bring the radio up. The only initialization fault surfaced to
    /// applications.
    fn init(&mut self) -> MeshResult<()>;

    /// Tear the radio down.
    fn deinit(&mut self);

    /// This radio's own address
    fn local_address(&self) -> Address;

    /// Register the interrupt sinks
    fn attach(&mut self, shared: Arc<LinkShared>);

    /// Unregister the interrupt sinks
    fn detach(&mut self);

    /// Register a unicast peer on the given channel (0 = current).
    /// Re-registering an existing peer is not an error.
    fn add_peer(&mut self, peer: Address, channel: u8) -> MeshResult<()>;

    /// Deregister a unicast peer
    fn del_peer(&mut self, peer: Address) -> MeshResult<()>;

    /// Hand one frame to the radio. Completion arrives later through
    /// [`LinkShared::report_send_status`]; an immediate `Err` counts as
    /// a failed attempt.
    fn try_send(&mut self, peer: Address, bytes: &[u8]) -> MeshResult<()>;
}
