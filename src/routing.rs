//! Time-aged next-hop routing table.
//!
//! Routes are learned opportunistically from observed traffic: every
//! valid frame proves that its original source is reachable through the
//! immediate sender, at a distance derivable from how far the hop count
//! has been decremented. The table keeps the shortest observed route per
//! destination and lets entries expire so stale paths fall away.

use crate::address::Address;
use std::time::Duration;
use tracing::{debug, trace};

/// A cached route to a destination
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Final target
    pub destination: Address,
    /// Next-hop link address
    pub link: Address,
    /// Observed distance in hops (0 = direct neighbor)
    pub hops: u8,
    /// Remaining lifetime
    remaining: Duration,
}

impl RouteEntry {
    /// Remaining lifetime of this entry
    pub fn remaining(&self) -> Duration {
        self.remaining
    }
}

/// Bounded routing table with TTL aging and shortest-hop preference
#[derive(Debug)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
    ttl: Duration,
    update_interval: Duration,
    max_entries: usize,
    since_update: Duration,
}

impl RoutingTable {
    /// Create a new routing table
    pub fn new(ttl: Duration, update_interval: Duration, max_entries: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_entries),
            ttl,
            update_interval,
            max_entries,
            since_update: Duration::ZERO,
        }
    }

    /// Add a route or improve an existing one.
    ///
    /// An existing entry is only replaced by a strictly shorter route;
    /// its hop metric therefore never worsens while it is alive.
    pub fn add_or_update(&mut self, destination: Address, link: Address, hops: u8) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.destination == destination)
        {
            if entry.hops > hops {
                trace!(%destination, %link, hops, "route improved");
                entry.link = link;
                entry.hops = hops;
                entry.remaining = self.ttl;
            }
            return;
        }
        if self.entries.len() >= self.max_entries {
            // evict the entry closest to expiry
            if let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.remaining)
                .map(|(i, _)| i)
            {
                let evicted = self.entries.swap_remove(oldest);
                debug!(destination = %evicted.destination, "routing table full, evicting oldest route");
            }
        }
        trace!(%destination, %link, hops, "route learned");
        self.entries.push(RouteEntry {
            destination,
            link,
            hops,
            remaining: self.ttl,
        });
    }

    /// Next-hop link for a destination, if a route is cached
    pub fn next_hop(&self, destination: Address) -> Option<Address> {
        self.entries
            .iter()
            .find(|e| e.destination == destination)
            .map(|e| e.link)
    }

    /// Advance time; ages and prunes entries on the update cadence.
    pub fn tick(&mut self, elapsed: Duration) {
        self.since_update += elapsed;
        if self.since_update < self.update_interval {
            return;
        }
        let slice = self.since_update;
        self.since_update = Duration::ZERO;
        let before = self.entries.len();
        for entry in &mut self.entries {
            entry.remaining = entry.remaining.saturating_sub(slice);
        }
        self.entries.retain(|e| !e.remaining.is_zero());
        let expired = before - self.entries.len();
        if expired > 0 {
            debug!(expired, "routes expired");
        }
    }

    /// All live entries
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Number of cached routes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
