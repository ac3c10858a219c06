//! In-memory radios for testing mesh behavior without hardware.
//!
//! [`MemoryRadio`] is the "antenna" end of a fake driver: the harness
//! keeps the `Arc`, hands [`MemoryRadio::driver`] to the engine, then
//! inspects what was transmitted, injects received frames, and reports
//! send outcomes, playing the role of the radio interrupt.
//!
//! [`AirBus`] wires several radios into a topology and shuttles frames
//! between them: a unicast frame reaches its peer and earns a link-level
//! acknowledgement only when the two nodes are connected; a broadcast
//! frame reaches every connected node and always reports success,
//! because entering the air is all a broadcast can promise.
//!
//! ## Example
//!
//! ```ignore
//! let mut bus = AirBus::new();
//! let a = bus.radio(addr_a);
//! let b = bus.radio(addr_b);
//! bus.connect(addr_a, addr_b);
//!
//! let mut node_a = MeshDevice::new(a.driver(), MeshConfig::default(), LinkConfig::default());
//! node_a.begin()?;
//! // ... tick the devices and bus.pump() in a loop
//! ```

use crate::address::Address;
use crate::error::{MeshError, MeshResult};
use crate::link::driver::{LinkDriver, LinkShared};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// The harness-facing end of an in-memory radio
#[derive(Debug)]
pub struct MemoryRadio {
    mac: Address,
    outbox: Mutex<Vec<(Address, Vec<u8>)>>,
    peers: Mutex<Vec<(Address, u8)>>,
    shared: Mutex<Option<Arc<LinkShared>>>,
    init_fault: Mutex<Option<String>>,
    send_fault: AtomicBool,
}

impl MemoryRadio {
    /// Create a radio with the given MAC
    pub fn new(mac: Address) -> Arc<Self> {
        Arc::new(Self {
            mac,
            outbox: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
            shared: Mutex::new(None),
            init_fault: Mutex::new(None),
            send_fault: AtomicBool::new(false),
        })
    }

    /// Make a driver handle for the engine side
    pub fn driver(self: &Arc<Self>) -> MemoryDriver {
        MemoryDriver {
            radio: Arc::clone(self),
        }
    }

    /// This radio's MAC
    pub fn mac(&self) -> Address {
        self.mac
    }

    /// Drain everything the engine transmitted: `(destination, bytes)`
    pub fn take_outbox(&self) -> Vec<(Address, Vec<u8>)> {
        std::mem::take(&mut self.outbox.lock().unwrap())
    }

    /// Registered unicast peers: `(peer, channel)`
    pub fn peers(&self) -> Vec<(Address, u8)> {
        self.peers.lock().unwrap().clone()
    }

    /// Inject a received frame, as the receive interrupt would. Returns
    /// false if the radio is detached or the frame was dropped.
    pub fn deliver(&self, src: Address, bytes: &[u8]) -> bool {
        match self.shared.lock().unwrap().as_ref() {
            Some(shared) => shared.offer_frame(src, bytes),
            None => false,
        }
    }

    /// Report the outcome of the last send, as the send interrupt would
    pub fn report_send_status(&self, ok: bool) {
        if let Some(shared) = self.shared.lock().unwrap().as_ref() {
            shared.report_send_status(ok);
        }
    }

    /// Make subsequent `try_send` calls fail synchronously
    pub fn set_send_fault(&self, on: bool) {
        self.send_fault.store(on, Ordering::Relaxed);
    }

    /// Make the next `init()` fail with the given message
    pub fn fail_init(&self, message: &str) {
        *self.init_fault.lock().unwrap() = Some(message.to_string());
    }

    /// Whether an engine is currently attached
    pub fn is_attached(&self) -> bool {
        self.shared.lock().unwrap().is_some()
    }
}

/// Engine-side handle implementing [`LinkDriver`] over a [`MemoryRadio`]
#[derive(Debug)]
pub struct MemoryDriver {
    radio: Arc<MemoryRadio>,
}

impl LinkDriver for MemoryDriver {
    fn init(&mut self) -> MeshResult<()> {
        if let Some(message) = self.radio.init_fault.lock().unwrap().take() {
            return Err(MeshError::Driver(message));
        }
        Ok(())
    }

    fn deinit(&mut self) {}

    fn local_address(&self) -> Address {
        self.radio.mac
    }

    fn attach(&mut self, shared: Arc<LinkShared>) {
        *self.radio.shared.lock().unwrap() = Some(shared);
    }

    fn detach(&mut self) {
        *self.radio.shared.lock().unwrap() = None;
    }

    fn add_peer(&mut self, peer: Address, channel: u8) -> MeshResult<()> {
        let mut peers = self.radio.peers.lock().unwrap();
        if !peers.iter().any(|(p, _)| *p == peer) {
            peers.push((peer, channel));
        }
        Ok(())
    }

    fn del_peer(&mut self, peer: Address) -> MeshResult<()> {
        self.radio.peers.lock().unwrap().retain(|(p, _)| *p != peer);
        Ok(())
    }

    fn try_send(&mut self, peer: Address, bytes: &[u8]) -> MeshResult<()> {
        if self.radio.send_fault.load(Ordering::Relaxed) {
            return Err(MeshError::Driver("send fault injected".to_string()));
        }
        self.radio.outbox.lock().unwrap().push((peer, bytes.to_vec()));
        Ok(())
    }
}

/// A simulated broadcast medium connecting several radios
#[derive(Debug, Default)]
pub struct AirBus {
    radios: Vec<Arc<MemoryRadio>>,
    /// Symmetric connectivity, stored with both orderings
    links: HashSet<(Address, Address)>,
}

impl AirBus {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a radio
    pub fn radio(&mut self, mac: Address) -> Arc<MemoryRadio> {
        let radio = MemoryRadio::new(mac);
        self.radios.push(Arc::clone(&radio));
        radio
    }

    /// Handle of an already-registered radio
    pub fn radio_handle(&self, mac: Address) -> Option<Arc<MemoryRadio>> {
        self.radios.iter().find(|r| r.mac == mac).cloned()
    }

    /// Put two nodes in range of each other
    pub fn connect(&mut self, a: Address, b: Address) {
        self.links.insert((a, b));
        self.links.insert((b, a));
    }

    /// Take two nodes out of range of each other
    pub fn disconnect(&mut self, a: Address, b: Address) {
        self.links.remove(&(a, b));
        self.links.remove(&(b, a));
    }

    fn in_range(&self, a: Address, b: Address) -> bool {
        self.links.contains(&(a, b))
    }

    /// Move every transmitted frame across the medium and report send
    /// outcomes, as the radios' interrupts would.
    pub fn pump(&self) {
        // collect first so deliveries within one pump cannot re-order
        let mut traffic = Vec::new();
        for radio in &self.radios {
            for (dst, bytes) in radio.take_outbox() {
                traffic.push((Arc::clone(radio), dst, bytes));
            }
        }
        for (sender, dst, bytes) in traffic {
            if dst.is_broadcast() {
                for radio in &self.radios {
                    if radio.mac != sender.mac && self.in_range(sender.mac, radio.mac) {
                        radio.deliver(sender.mac, &bytes);
                    }
                }
                // a broadcast only promises it entered the air
                sender.report_send_status(true);
            } else {
                let peer = self
                    .radios
                    .iter()
                    .find(|r| r.mac == dst && self.in_range(sender.mac, dst));
                match peer {
                    Some(radio) => {
                        radio.deliver(sender.mac, &bytes);
                        sender.report_send_status(true);
                    }
                    None => sender.report_send_status(false),
                }
            }
        }
    }
}
