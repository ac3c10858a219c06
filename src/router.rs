//! Mesh router: a device that also relays traffic for other nodes.
//!
//! [`MeshRouter`] is a [`MeshDevice`] composed with a [`TableForwarder`]
//! rather than a subclass of it. The forwarder relays frames addressed
//! elsewhere (subject to TTL and duplicate suppression) and maintains a
//! time-aged routing table learned from observed traffic, so unicast
//! egress can take the shortest known hop instead of falling back to
//! broadcast.

use crate::address::Address;
use crate::config::RouterConfig;
use crate::device::{ForeignDrop, Forwarder, MeshDevice};
use crate::frame::{Frame, MessageKind};
use crate::link::driver::LinkDriver;
use crate::routing::RoutingTable;
use crate::seen::SeenSet;
use std::time::Duration;

/// Table-driven forwarding hook
#[derive(Debug)]
pub struct TableForwarder {
    routes: RoutingTable,
}

impl TableForwarder {
    /// Create a forwarder with an empty routing table
    pub fn new(cfg: RouterConfig) -> Self {
        Self {
            routes: RoutingTable::new(
                Duration::from_millis(cfg.routing_ttl_ms),
                Duration::from_millis(cfg.routing_update_interval_ms),
                cfg.max_routing,
            ),
        }
    }

    /// The learned routing table
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }
}

impl Forwarder for TableForwarder {
    fn next_hop(&self, dst: Address) -> Address {
        self.routes.next_hop(dst).unwrap_or(Address::BROADCAST)
    }

    fn handle_foreign(&mut self, frame: &Frame, seen: &mut SeenSet) -> Result<Frame, ForeignDrop> {
        if frame.hop_count <= 1 {
            return Err(ForeignDrop::TtlExhausted);
        }
        if !seen.check_and_record(frame.id, frame.src, frame.dst, MessageKind::Forwarded) {
            return Err(ForeignDrop::Duplicate);
        }
        let mut forwarded = frame.clone();
        forwarded.hop_count -= 1;
        Ok(forwarded)
    }

    fn observe(&mut self, frame: &Frame, via: Address, local: Address, initial_hop_count: u8) {
        // our own frames echoed back must not become a route to ourselves
        if frame.src == local || frame.src.is_broadcast() {
            return;
        }
        // how far the hop count has been decremented is how far away the
        // source is; 0 means the sender delivered its own frame directly
        let hops = initial_hop_count.saturating_sub(frame.hop_count);
        self.routes.add_or_update(frame.src, via, hops);
    }

    fn tick(&mut self, elapsed: Duration) {
        self.routes.tick(elapsed);
    }

    fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// A mesh device that forwards and routes
pub type MeshRouter<D> = MeshDevice<D, TableForwarder>;

impl<D: LinkDriver> MeshRouter<D> {
    /// Create a router
    pub fn new(
        driver: D,
        cfg: crate::config::MeshConfig,
        link_cfg: crate::config::LinkConfig,
        router_cfg: RouterConfig,
    ) -> Self {
        MeshDevice::with_forwarder(driver, cfg, link_cfg, TableForwarder::new(router_cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::frame::FrameType;

    const A: Address = Address::from_bytes([0xAA, 0, 0, 0, 0, 1]);
    const B: Address = Address::from_bytes([0xBB, 0, 0, 0, 0, 2]);
    const R: Address = Address::from_bytes([0xEE, 0, 0, 0, 0, 9]);

    fn forwarder() -> TableForwarder {
        TableForwarder::new(RouterConfig::default())
    }

    fn seen() -> SeenSet {
        let cfg = MeshConfig::default();
        SeenSet::new(
            Duration::from_millis(cfg.seen_ttl_ms),
            Duration::from_millis(cfg.seen_cleanup_interval_ms),
            cfg.max_seen,
        )
    }

    fn frame(hop_count: u8) -> Frame {
        Frame {
            network_id: 0,
            frame_type: FrameType::Unconfirmed,
            id: 5,
            hop_count,
            src: A,
            dst: B,
            payload: vec![1, 2],
        }
    }

    #[test]
    fn test_forward_decrements_hop_count() {
        let mut fwd = forwarder();
        let mut seen = seen();
        let relayed = fwd.handle_foreign(&frame(3), &mut seen).unwrap();
        assert_eq!(relayed.hop_count, 2);
        assert_eq!(relayed.id, 5);
        assert_eq!(relayed.src, A);
        assert_eq!(relayed.dst, B);
        assert_eq!(relayed.payload, vec![1, 2]);
    }

    #[test]
    fn test_ttl_exhausted_not_forwarded() {
        let mut fwd = forwarder();
        let mut seen = seen();
        assert_eq!(
            fwd.handle_foreign(&frame(1), &mut seen),
            Err(ForeignDrop::TtlExhausted)
        );
        // and nothing was recorded, so a fresher copy could still relay
        assert!(seen.is_empty());
    }

    #[test]
    fn test_forward_once() {
        let mut fwd = forwarder();
        let mut seen = seen();
        assert!(fwd.handle_foreign(&frame(3), &mut seen).is_ok());
        assert_eq!(
            fwd.handle_foreign(&frame(3), &mut seen),
            Err(ForeignDrop::Duplicate)
        );
        // a different source is a different frame
        let mut other = frame(3);
        other.src = R;
        assert!(fwd.handle_foreign(&other, &mut seen).is_ok());
    }

    #[test]
    fn test_observe_learns_route() {
        let mut fwd = forwarder();
        // A's frame arrived through R with one decrement: A is one
        // relay away
        let mut relayed = frame(2);
        relayed.dst = Address::BROADCAST;
        fwd.observe(&relayed, R, B, 3);
        assert_eq!(fwd.next_hop(A), R);
        assert_eq!(fwd.route_count(), 1);
    }

    #[test]
    fn test_observe_prefers_direct() {
        let mut fwd = forwarder();
        fwd.observe(&frame(2), R, B, 3); // via relay, 1 hop
        fwd.observe(&frame(3), A, B, 3); // direct, 0 hops
        assert_eq!(fwd.next_hop(A), A);
    }

    #[test]
    fn test_observe_ignores_own_and_broadcast_sources() {
        let mut fwd = forwarder();
        let mut own = frame(2);
        own.src = B;
        fwd.observe(&own, R, B, 3);
        let mut anon = frame(2);
        anon.src = Address::BROADCAST;
        fwd.observe(&anon, R, B, 3);
        assert_eq!(fwd.route_count(), 0);
    }

    #[test]
    fn test_next_hop_fallback_is_broadcast() {
        let fwd = forwarder();
        assert_eq!(fwd.next_hop(A), Address::BROADCAST);
    }
}
