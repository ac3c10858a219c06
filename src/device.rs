//! Per-node mesh device: end-to-end semantics over the link adapter.
//!
//! A [`MeshDevice`] owns one [`LinkAdapter`] and layers message framing,
//! a single outbound queue, duplicate suppression, end-to-end
//! acknowledgements with timeouts, and dispatch to application callbacks
//! on top of it. Everything runs from `tick()`; callbacks execute
//! synchronously on the caller's thread.
//!
//! Forwarding is a hook, not a subclass: the device consults its
//! [`Forwarder`] at exactly two points: what to do with a frame
//! addressed to another node, and which link peer to hand an outbound
//! frame to. [`NullForwarder`] drops foreign traffic and sends
//! everything to broadcast; `MeshRouter` plugs in a table-driven
//! implementation.

use crate::address::Address;
use crate::config::MeshConfig;
use crate::error::{MeshError, MeshResult};
use crate::frame::{Frame, FrameType, MessageKind, MAX_PAYLOAD_LEN};
use crate::link::driver::LinkDriver;
use crate::link::{IngressFrame, LinkAdapter, LinkOutcome, LinkStats};
use crate::seen::SeenSet;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// End-to-end outcome reported through the status callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The destination acknowledged the message (confirmed sends), or
    /// the link accepted it (best-effort outcome of unconfirmed sends)
    Success,
    /// The message went to the broadcast address; there is no single
    /// peer whose acknowledgement could prove delivery
    Broadcast,
    /// Link-level failure or acknowledgement timeout
    Fail,
}

/// Why a foreign frame was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignDrop {
    /// This node does not forward at all
    NotForwarding,
    /// Decrementing the hop count would reach zero
    TtlExhausted,
    /// The frame was already forwarded recently
    Duplicate,
}

/// The two polymorphic points where a router differs from a plain
/// device, plus the bookkeeping hooks a routing table needs.
pub trait Forwarder {
    /// Pick the link peer to reach `dst` through. The default routes
    /// everything through broadcast.
    fn next_hop(&self, dst: Address) -> Address {
        let _ = dst;
        Address::BROADCAST
    }

    /// Handle a frame addressed to another node. Returns the frame to
    /// relay (TTL already decremented) or the reason it was dropped.
    /// The device's seen-set is shared in so relaying and local
    /// delivery of the same frame stay independently deduplicated.
    fn handle_foreign(&mut self, frame: &Frame, seen: &mut SeenSet) -> Result<Frame, ForeignDrop> {
        let _ = (frame, seen);
        Err(ForeignDrop::NotForwarding)
    }

    /// Observe a valid ingress frame. `via` is the immediate sender's
    /// radio address; routers learn routes here.
    fn observe(&mut self, frame: &Frame, via: Address, local: Address, initial_hop_count: u8) {
        let _ = (frame, via, local, initial_hop_count);
    }

    /// Advance time-based state (table aging)
    fn tick(&mut self, elapsed: Duration) {
        let _ = elapsed;
    }

    /// Number of cached routes
    fn route_count(&self) -> usize {
        0
    }
}

/// Forwarder of a plain end device: foreign traffic is dropped and all
/// egress goes to broadcast.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullForwarder;

impl Forwarder for NullForwarder {}

/// Device counters
#[derive(Debug, Clone, Default)]
pub struct MeshStats {
    /// Frames handed to the link
    pub frames_tx: u64,
    /// Valid frames decoded from the link
    pub frames_rx: u64,
    /// Frames delivered to the application callback
    pub frames_delivered: u64,
    /// Frames relayed for other nodes
    pub frames_forwarded: u64,
    /// Frames suppressed by the seen-set
    pub duplicates_dropped: u64,
    /// Foreign frames dropped because their TTL was exhausted
    pub hop_limit_exceeded: u64,
    /// Frames dropped because the outbound queue was full
    pub queue_drops: u64,
    /// Ingress buffers that failed to decode
    pub malformed_frames: u64,
    /// Acknowledgements transmitted
    pub acks_sent: u64,
    /// Acknowledgements received
    pub acks_received: u64,
    /// Confirmed sends that timed out waiting for an acknowledgement
    pub confirm_timeouts: u64,
    /// Sends that failed at the link layer
    pub link_failures: u64,
    /// Cached routes (always 0 for non-routers)
    pub route_count: usize,
}

#[derive(Debug)]
struct Outbound {
    kind: MessageKind,
    channel: u8,
    frame: Frame,
}

#[derive(Debug)]
struct PendingConfirmation {
    id: u8,
    dst: Address,
    remaining: Duration,
}

type MessageCallback = Box<dyn FnMut(FrameType, Address, &[u8])>;
type StatusCallback = Box<dyn FnMut(SendStatus)>;

/// A single mesh node
pub struct MeshDevice<D: LinkDriver, F: Forwarder = NullForwarder> {
    link: LinkAdapter<D>,
    cfg: MeshConfig,
    confirm_timeout: Duration,
    forwarder: F,
    queue: VecDeque<Outbound>,
    /// Set when the queue head has been handed to the link; cleared by
    /// the link's completion event
    send_in_progress: bool,
    pending: Vec<PendingConfirmation>,
    seen: SeenSet,
    id_counter: u8,
    stats: MeshStats,
    on_message: Option<MessageCallback>,
    on_status: Option<StatusCallback>,
    running: bool,
}

impl<D: LinkDriver> MeshDevice<D> {
    /// Create a plain end device (no forwarding)
    pub fn new(driver: D, cfg: MeshConfig, link_cfg: crate::config::LinkConfig) -> Self {
        Self::with_forwarder(driver, cfg, link_cfg, NullForwarder)
    }
}

impl<D: LinkDriver, F: Forwarder> MeshDevice<D, F> {
    /// Create a device with a custom forwarding hook
    pub fn with_forwarder(
        driver: D,
        cfg: MeshConfig,
        link_cfg: crate::config::LinkConfig,
        forwarder: F,
    ) -> Self {
        let seen = SeenSet::new(
            Duration::from_millis(cfg.seen_ttl_ms),
            Duration::from_millis(cfg.seen_cleanup_interval_ms),
            cfg.max_seen,
        );
        Self {
            link: LinkAdapter::new(driver, link_cfg),
            confirm_timeout: Duration::from_millis(cfg.confirm_timeout_ms),
            cfg,
            forwarder,
            queue: VecDeque::new(),
            send_in_progress: false,
            pending: Vec::new(),
            seen,
            id_counter: 0,
            stats: MeshStats::default(),
            on_message: None,
            on_status: None,
            running: false,
        }
    }

    /// Bring the node up. Driver initialization is the only fault
    /// surfaced here.
    pub fn begin(&mut self) -> MeshResult<()> {
        self.link.begin()?;
        self.running = true;
        debug!(local = %self.link.local_address(), "mesh device up");
        Ok(())
    }

    /// Take the node down. Callbacks are unregistered and queued or
    /// in-flight sends lose their completion path.
    pub fn stop(&mut self) {
        self.link.stop();
        self.on_message = None;
        self.on_status = None;
        self.queue.clear();
        self.pending.clear();
        self.send_in_progress = false;
        self.running = false;
    }

    /// This node's address
    pub fn local_address(&self) -> Address {
        self.link.local_address()
    }

    /// Register the delivery callback: `(type, source, payload)` for
    /// every message addressed to this node.
    pub fn set_on_message(&mut self, callback: impl FnMut(FrameType, Address, &[u8]) + 'static) {
        self.on_message = Some(Box::new(callback));
    }

    /// Register the status callback for outbound messages. Confirmed
    /// sends report exactly once: `Success` on acknowledgement,
    /// `Broadcast` for broadcast destinations, `Fail` on link failure
    /// or timeout. Unconfirmed sends report their link outcome on a
    /// best-effort basis (failures stay silent).
    pub fn set_on_status(&mut self, callback: impl FnMut(SendStatus) + 'static) {
        self.on_status = Some(Box::new(callback));
    }

    /// Queue a fire-and-forget message
    pub fn send_message(&mut self, payload: &[u8], dst: Address) -> MeshResult<()> {
        self.enqueue_new(FrameType::Unconfirmed, payload, dst)
    }

    /// Queue an end-to-end acknowledged message
    pub fn send_confirmed_message(&mut self, payload: &[u8], dst: Address) -> MeshResult<()> {
        self.enqueue_new(FrameType::Confirmed, payload, dst)
    }

    /// Drive the node: link adapter first, then completion and ingress
    /// handling, timeout bookkeeping, and finally the outbound queue.
    pub fn tick(&mut self, elapsed: Duration) {
        if !self.running {
            return;
        }
        let events = self.link.tick(elapsed);
        if let Some(outcome) = events.sent {
            self.on_link_sent(outcome);
        }
        if let Some(ingress) = events.received {
            self.on_ingress(ingress);
        }
        self.age_pending(elapsed);
        self.seen.tick(elapsed);
        self.forwarder.tick(elapsed);
        self.pump_queue();
    }

    /// Device counters
    pub fn stats(&self) -> MeshStats {
        let mut stats = self.stats.clone();
        stats.route_count = self.forwarder.route_count();
        stats
    }

    /// Link adapter counters
    pub fn link_stats(&self) -> LinkStats {
        self.link.stats()
    }

    /// The forwarding hook (routers expose their table through this)
    pub fn forwarder(&self) -> &F {
        &self.forwarder
    }

    fn enqueue_new(&mut self, frame_type: FrameType, payload: &[u8], dst: Address) -> MeshResult<()> {
        if !self.running {
            return Err(MeshError::NotRunning);
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(MeshError::PayloadTooLarge(payload.len()));
        }
        if self.queue.len() >= self.cfg.max_queue {
            self.stats.queue_drops += 1;
            return Err(MeshError::QueueFull);
        }
        let frame = Frame {
            network_id: self.cfg.network_id,
            frame_type,
            id: self.next_id(),
            hop_count: self.cfg.initial_hop_count,
            src: self.link.local_address(),
            dst,
            payload: payload.to_vec(),
        };
        trace!(%dst, id = frame.id, ?frame_type, "message queued");
        self.queue.push_back(Outbound {
            kind: frame_type.into(),
            channel: 0,
            frame,
        });
        Ok(())
    }

    /// Queue a frame the engine synthesized itself (acks, forwards).
    /// There is no caller to refuse, so overflow drops and counts.
    fn enqueue_internal(&mut self, kind: MessageKind, frame: Frame) -> bool {
        if self.queue.len() >= self.cfg.max_queue {
            self.stats.queue_drops += 1;
            warn!(?kind, "outbound queue full, dropping frame");
            return false;
        }
        self.queue.push_back(Outbound {
            kind,
            channel: 0,
            frame,
        });
        true
    }

    /// Wrapping 8-bit id. Reuse is harmless: the seen key includes both
    /// addresses and entries expire long before an id can recur at any
    /// realistic send rate.
    fn next_id(&mut self) -> u8 {
        let id = self.id_counter;
        self.id_counter = self.id_counter.wrapping_add(1);
        id
    }

    fn on_link_sent(&mut self, outcome: LinkOutcome) {
        self.send_in_progress = false;
        let Some(done) = self.queue.pop_front() else {
            warn!("link completion with empty queue");
            return;
        };
        match outcome {
            LinkOutcome::Success => match done.kind {
                MessageKind::Unconfirmed => self.emit_status(SendStatus::Success),
                MessageKind::Ack => self.stats.acks_sent += 1,
                // confirmed sends wait for the end-to-end ack
                MessageKind::Confirmed | MessageKind::Forwarded => {}
            },
            LinkOutcome::Broadcast => match done.kind {
                MessageKind::Unconfirmed => self.emit_status(SendStatus::Broadcast),
                MessageKind::Ack => self.stats.acks_sent += 1,
                // a broadcast confirmed send resolves via its pending
                // entry, which reports Broadcast when the timer runs out
                MessageKind::Confirmed | MessageKind::Forwarded => {}
            },
            LinkOutcome::Fail => {
                self.stats.link_failures += 1;
                if done.kind == MessageKind::Confirmed {
                    let id = done.frame.id;
                    let dst = done.frame.dst;
                    if let Some(pos) = self
                        .pending
                        .iter()
                        .position(|p| p.id == id && p.dst == dst)
                    {
                        self.pending.remove(pos);
                    }
                    self.emit_status(SendStatus::Fail);
                } else {
                    debug!(kind = ?done.kind, "link failure on best-effort frame");
                }
            }
        }
    }

    fn on_ingress(&mut self, ingress: IngressFrame) {
        let Some(frame) = Frame::decode(&ingress.bytes) else {
            self.stats.malformed_frames += 1;
            debug!(src = %ingress.src, len = ingress.bytes.len(), "dropping malformed frame");
            return;
        };
        self.stats.frames_rx += 1;
        let local = self.link.local_address();
        self.forwarder
            .observe(&frame, ingress.src, local, self.cfg.initial_hop_count);

        // a broadcast frame is both local traffic and, on routers,
        // foreign traffic to relay; the seen-set kinds keep the two
        // decisions independent
        if frame.dst != local {
            self.forward_foreign(&frame);
        }
        if frame.dst == local || frame.dst.is_broadcast() {
            self.handle_own(frame);
        }
    }

    fn forward_foreign(&mut self, frame: &Frame) {
        match self.forwarder.handle_foreign(frame, &mut self.seen) {
            Ok(forwarded) => {
                if self.enqueue_internal(MessageKind::Forwarded, forwarded) {
                    self.stats.frames_forwarded += 1;
                }
            }
            Err(ForeignDrop::TtlExhausted) => {
                self.stats.hop_limit_exceeded += 1;
                debug!(src = %frame.src, dst = %frame.dst, "hop count exhausted, not forwarding");
            }
            Err(ForeignDrop::Duplicate) => {
                self.stats.duplicates_dropped += 1;
                trace!(src = %frame.src, id = frame.id, "already forwarded");
            }
            Err(ForeignDrop::NotForwarding) => {
                trace!(dst = %frame.dst, "dropping foreign frame");
            }
        }
    }

    fn handle_own(&mut self, frame: Frame) {
        // a confirmed frame is re-acknowledged even when it is a
        // duplicate: the previous ack may have been lost on the air
        if frame.frame_type == FrameType::Confirmed {
            let ack = Frame::ack(
                self.cfg.network_id,
                frame.id,
                self.link.local_address(),
                frame.src,
                self.cfg.initial_hop_count,
            );
            self.enqueue_internal(MessageKind::Ack, ack);
        }

        let kind = MessageKind::from(frame.frame_type);
        if !self
            .seen
            .check_and_record(frame.id, frame.src, frame.dst, kind)
        {
            self.stats.duplicates_dropped += 1;
            debug!(src = %frame.src, id = frame.id, "duplicate frame suppressed");
            return;
        }

        match frame.frame_type {
            FrameType::Unconfirmed | FrameType::Confirmed => {
                self.stats.frames_delivered += 1;
                if let Some(callback) = self.on_message.as_mut() {
                    callback(frame.frame_type, frame.src, &frame.payload);
                }
            }
            FrameType::Ack => {
                self.stats.acks_received += 1;
                // the ack's source is the original destination
                if let Some(pos) = self
                    .pending
                    .iter()
                    .position(|p| p.id == frame.id && p.dst == frame.src)
                {
                    self.pending.remove(pos);
                    self.emit_status(SendStatus::Success);
                } else {
                    trace!(src = %frame.src, id = frame.id, "ack without pending confirmation");
                }
            }
        }
    }

    fn age_pending(&mut self, elapsed: Duration) {
        let mut expired = Vec::new();
        self.pending.retain_mut(|p| {
            p.remaining = p.remaining.saturating_sub(elapsed);
            if p.remaining.is_zero() {
                expired.push(p.dst);
                false
            } else {
                true
            }
        });
        for dst in expired {
            self.stats.confirm_timeouts += 1;
            // nobody acks a broadcast; silence is the expected outcome
            let status = if dst.is_broadcast() {
                SendStatus::Broadcast
            } else {
                SendStatus::Fail
            };
            debug!(%dst, ?status, "confirmation timed out");
            self.emit_status(status);
        }
    }

    fn pump_queue(&mut self) {
        if self.send_in_progress || !self.link.sending_possible() {
            return;
        }
        let Some(head) = self.queue.front() else {
            return;
        };
        let link_dst = if head.frame.dst.is_broadcast() {
            Address::BROADCAST
        } else {
            self.forwarder.next_hop(head.frame.dst)
        };
        let bytes = head.frame.encode();
        let kind = head.kind;
        let channel = head.channel;
        let id = head.frame.id;
        let dst = head.frame.dst;
        let max_tries = self.link.config().max_tries;
        match self.link.send(link_dst, &bytes, max_tries, channel) {
            Ok(()) => {
                self.send_in_progress = true;
                self.stats.frames_tx += 1;
                if kind == MessageKind::Confirmed {
                    self.pending.push(PendingConfirmation {
                        id,
                        dst,
                        remaining: self.confirm_timeout,
                    });
                }
            }
            Err(err) => {
                // never went out, so no completion will pop it
                warn!(%err, "link rejected queued frame");
                self.queue.pop_front();
            }
        }
    }

    fn emit_status(&mut self, status: SendStatus) {
        if let Some(callback) = self.on_status.as_mut() {
            callback(status);
        }
    }
}

impl<D: LinkDriver, F: Forwarder> fmt::Debug for MeshDevice<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshDevice")
            .field("local", &self.link.local_address())
            .field("running", &self.running)
            .field("queued", &self.queue.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::simulation::MemoryRadio;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    const LOCAL: Address = Address::from_bytes([0xAA, 0, 0, 0, 0, 1]);
    const PEER: Address = Address::from_bytes([0xBB, 0, 0, 0, 0, 2]);

    const TICK: Duration = Duration::from_millis(10);

    type TestDevice = MeshDevice<crate::simulation::MemoryDriver>;

    fn device() -> (Arc<MemoryRadio>, TestDevice) {
        let radio = MemoryRadio::new(LOCAL);
        let mut device = MeshDevice::<crate::simulation::MemoryDriver>::new(
            radio.driver(),
            MeshConfig::default(),
            LinkConfig::default(),
        );
        device.begin().unwrap();
        (radio, device)
    }

    fn statuses(device: &mut TestDevice) -> Rc<RefCell<Vec<SendStatus>>> {
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&statuses);
        device.set_on_status(move |status| sink.borrow_mut().push(status));
        statuses
    }

    fn messages(device: &mut TestDevice) -> Rc<RefCell<Vec<(FrameType, Address, Vec<u8>)>>> {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&messages);
        device.set_on_message(move |frame_type, src, payload| {
            sink.borrow_mut().push((frame_type, src, payload.to_vec()));
        });
        messages
    }

    #[test]
    fn test_begin_surfaces_driver_fault() {
        let radio = MemoryRadio::new(LOCAL);
        radio.fail_init("no radio");
        let mut device = MeshDevice::<crate::simulation::MemoryDriver>::new(
            radio.driver(),
            MeshConfig::default(),
            LinkConfig::default(),
        );
        assert_eq!(
            device.begin(),
            Err(MeshError::Driver("no radio".to_string()))
        );
    }

    #[test]
    fn test_send_requires_running() {
        let radio = MemoryRadio::new(LOCAL);
        let mut device = MeshDevice::<crate::simulation::MemoryDriver>::new(
            radio.driver(),
            MeshConfig::default(),
            LinkConfig::default(),
        );
        assert_eq!(device.send_message(b"x", PEER), Err(MeshError::NotRunning));
    }

    #[test]
    fn test_payload_limit() {
        let (_radio, mut device) = device();
        let oversize = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            device.send_message(&oversize, PEER),
            Err(MeshError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
        );
        assert!(device.send_message(&oversize[..MAX_PAYLOAD_LEN], PEER).is_ok());
    }

    #[test]
    fn test_queue_capacity() {
        let (_radio, mut device) = device();
        for _ in 0..16 {
            device.send_message(b"x", PEER).unwrap();
        }
        assert_eq!(device.send_message(b"x", PEER), Err(MeshError::QueueFull));
        assert_eq!(device.stats().queue_drops, 1);
    }

    #[test]
    fn test_ids_increment_and_wrap() {
        let (_radio, mut device) = device();
        device.id_counter = 0xFE;
        for _ in 0..3 {
            device.send_message(b"x", PEER).unwrap();
        }
        let ids: Vec<u8> = device.queue.iter().map(|o| o.frame.id).collect();
        assert_eq!(ids, vec![0xFE, 0xFF, 0x00]);
    }

    #[test]
    fn test_unconfirmed_best_effort_status() {
        let (radio, mut device) = device();
        let statuses = statuses(&mut device);
        device.send_message(b"hi", PEER).unwrap();
        device.tick(TICK); // staged
        device.tick(TICK); // handed to the driver
        radio.report_send_status(true);
        device.tick(TICK);
        assert_eq!(*statuses.borrow(), vec![SendStatus::Success]);
    }

    #[test]
    fn test_unconfirmed_link_failure_is_silent() {
        let (radio, mut device) = device();
        let statuses = statuses(&mut device);
        device.send_message(b"hi", PEER).unwrap();
        device.tick(TICK);
        device.tick(TICK);
        radio.report_send_status(false);
        device.tick(Duration::from_millis(100));
        radio.report_send_status(false);
        device.tick(TICK);
        assert!(statuses.borrow().is_empty());
        assert_eq!(device.stats().link_failures, 1);
    }

    #[test]
    fn test_confirmed_success_on_ack() {
        let (radio, mut device) = device();
        let statuses = statuses(&mut device);
        device.send_confirmed_message(b"data", PEER).unwrap();
        device.tick(TICK);
        device.tick(TICK);
        let (dst, bytes) = radio.take_outbox().pop().unwrap();
        assert_eq!(dst, Address::BROADCAST); // no route: broadcast fallback
        let sent = Frame::decode(&bytes).unwrap();
        radio.report_send_status(true);
        device.tick(TICK);
        assert!(statuses.borrow().is_empty());

        let ack = Frame::ack(0, sent.id, PEER, LOCAL, 3);
        radio.deliver(PEER, &ack.encode());
        device.tick(TICK);
        assert_eq!(*statuses.borrow(), vec![SendStatus::Success]);

        // a second copy of the ack does not fire again
        radio.deliver(PEER, &ack.encode());
        device.tick(TICK);
        assert_eq!(statuses.borrow().len(), 1);
    }

    #[test]
    fn test_confirmed_timeout_fires_once() {
        let (radio, mut device) = device();
        let statuses = statuses(&mut device);
        device.send_confirmed_message(b"data", PEER).unwrap();
        device.tick(TICK);
        device.tick(TICK);
        radio.report_send_status(true);
        for _ in 0..120 {
            device.tick(TICK);
        }
        assert_eq!(*statuses.borrow(), vec![SendStatus::Fail]);
        assert_eq!(device.stats().confirm_timeouts, 1);
    }

    #[test]
    fn test_confirmed_link_failure() {
        let (radio, mut device) = device();
        let statuses = statuses(&mut device);
        device.send_confirmed_message(b"data", PEER).unwrap();
        device.tick(TICK);
        device.tick(TICK);
        radio.report_send_status(false);
        device.tick(Duration::from_millis(100));
        radio.report_send_status(false);
        device.tick(TICK);
        assert_eq!(*statuses.borrow(), vec![SendStatus::Fail]);
        assert!(device.pending.is_empty());
        // the timeout window passing adds nothing
        for _ in 0..120 {
            device.tick(TICK);
        }
        assert_eq!(statuses.borrow().len(), 1);
    }

    #[test]
    fn test_confirmed_broadcast_reports_broadcast_at_timeout() {
        let (radio, mut device) = device();
        let statuses = statuses(&mut device);
        device
            .send_confirmed_message(b"data", Address::BROADCAST)
            .unwrap();
        device.tick(TICK);
        device.tick(TICK);
        radio.report_send_status(true);
        device.tick(TICK);
        // link outcome alone resolves nothing
        assert!(statuses.borrow().is_empty());
        for _ in 0..120 {
            device.tick(TICK);
        }
        assert_eq!(*statuses.borrow(), vec![SendStatus::Broadcast]);
    }

    #[test]
    fn test_delivery_and_ack_synthesis() {
        let (radio, mut device) = device();
        let messages = messages(&mut device);
        let frame = Frame {
            network_id: 0,
            frame_type: FrameType::Confirmed,
            id: 9,
            hop_count: 3,
            src: PEER,
            dst: LOCAL,
            payload: vec![0xDE, 0xAD],
        };
        radio.deliver(PEER, &frame.encode());
        device.tick(TICK); // delivered, ack queued
        device.tick(TICK); // ack handed to the driver
        radio.report_send_status(true);
        device.tick(TICK);

        assert_eq!(
            *messages.borrow(),
            vec![(FrameType::Confirmed, PEER, vec![0xDE, 0xAD])]
        );
        let out = radio.take_outbox();
        assert_eq!(out.len(), 1);
        let ack = Frame::decode(&out[0].1).unwrap();
        assert_eq!(ack.frame_type, FrameType::Ack);
        assert_eq!(ack.id, 9);
        assert_eq!(ack.src, LOCAL);
        assert_eq!(ack.dst, PEER);
        assert!(ack.payload.is_empty());
    }

    #[test]
    fn test_duplicate_delivered_once_but_reacked() {
        let (radio, mut device) = device();
        let messages = messages(&mut device);
        let frame = Frame {
            network_id: 0,
            frame_type: FrameType::Confirmed,
            id: 9,
            hop_count: 3,
            src: PEER,
            dst: LOCAL,
            payload: vec![1],
        };
        let mut acks = 0;
        for _ in 0..2 {
            radio.deliver(PEER, &frame.encode());
            // enough ticks for the rate limiter to let the ack out
            for _ in 0..12 {
                device.tick(TICK);
            }
            radio.report_send_status(true);
            device.tick(TICK);
            acks += radio
                .take_outbox()
                .iter()
                .filter(|(_, bytes)| {
                    Frame::decode(bytes).map(|f| f.frame_type) == Some(FrameType::Ack)
                })
                .count();
        }
        assert_eq!(messages.borrow().len(), 1);
        assert_eq!(acks, 2);
        assert_eq!(device.stats().duplicates_dropped, 1);
    }

    #[test]
    fn test_foreign_frame_dropped_without_forwarder() {
        let (radio, mut device) = device();
        let messages = messages(&mut device);
        let frame = Frame {
            network_id: 0,
            frame_type: FrameType::Unconfirmed,
            id: 1,
            hop_count: 3,
            src: PEER,
            dst: Address::from_bytes([0xCC, 0, 0, 0, 0, 3]),
            payload: vec![1],
        };
        radio.deliver(PEER, &frame.encode());
        device.tick(TICK);
        device.tick(TICK);
        assert!(messages.borrow().is_empty());
        assert!(radio.take_outbox().is_empty());
    }

    #[test]
    fn test_broadcast_frame_delivered() {
        let (radio, mut device) = device();
        let messages = messages(&mut device);
        let frame = Frame {
            network_id: 0,
            frame_type: FrameType::Unconfirmed,
            id: 1,
            hop_count: 3,
            src: PEER,
            dst: Address::BROADCAST,
            payload: vec![7],
        };
        radio.deliver(PEER, &frame.encode());
        device.tick(TICK);
        assert_eq!(
            *messages.borrow(),
            vec![(FrameType::Unconfirmed, PEER, vec![7])]
        );
    }

    #[test]
    fn test_malformed_ingress_counted() {
        let (radio, mut device) = device();
        let mut bytes = Frame {
            network_id: 0,
            frame_type: FrameType::Unconfirmed,
            id: 1,
            hop_count: 3,
            src: PEER,
            dst: LOCAL,
            payload: vec![],
        }
        .encode();
        bytes[2] = 2; // reserved type
        radio.deliver(PEER, &bytes);
        device.tick(TICK);
        assert_eq!(device.stats().malformed_frames, 1);
        assert_eq!(device.stats().frames_rx, 0);
    }

    #[test]
    fn test_stop_unregisters_callbacks() {
        let (_radio, mut device) = device();
        let statuses = statuses(&mut device);
        device.stop();
        assert!(device.on_message.is_none());
        assert!(device.on_status.is_none());
        assert_eq!(device.send_message(b"x", PEER), Err(MeshError::NotRunning));
        assert!(statuses.borrow().is_empty());
    }
}
