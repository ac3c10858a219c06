//! Duplicate suppression.
//!
//! The seen-set remembers every frame the node has recently observed,
//! keyed by `(id, src, dst, kind)`. The [`MessageKind`] discriminator is
//! part of the key so delivering and forwarding the same frame are
//! tracked independently.
//!
//! Aging runs on a fixed cadence rather than per tick, so an entry can
//! outlive its TTL by up to one cleanup interval. That slack is accepted:
//! the TTL only has to comfortably cover the link-level retry window.

use crate::address::Address;
use crate::frame::MessageKind;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct SeenEntry {
    id: u8,
    src: Address,
    dst: Address,
    kind: MessageKind,
    remaining: Duration,
}

impl SeenEntry {
    fn matches(&self, id: u8, src: Address, dst: Address, kind: MessageKind) -> bool {
        self.id == id && self.src == src && self.dst == dst && self.kind == kind
    }
}

/// Bounded time-aged set of observed frames
#[derive(Debug)]
pub struct SeenSet {
    /// Entries in insertion order; front is the oldest
    entries: VecDeque<SeenEntry>,
    ttl: Duration,
    cleanup_interval: Duration,
    max_entries: usize,
    since_cleanup: Duration,
}

impl SeenSet {
    /// Create a new seen-set
    pub fn new(ttl: Duration, cleanup_interval: Duration, max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            ttl,
            cleanup_interval,
            max_entries,
            since_cleanup: Duration::ZERO,
        }
    }

    /// Check whether a frame was already observed, and record it if not.
    /// Returns true if this is a NEW observation (not a duplicate).
    pub fn check_and_record(
        &mut self,
        id: u8,
        src: Address,
        dst: Address,
        kind: MessageKind,
    ) -> bool {
        if self.contains(id, src, dst, kind) {
            return false;
        }
        if self.entries.len() >= self.max_entries {
            // insert overflow evicts the oldest observation
            if let Some(evicted) = self.entries.pop_front() {
                warn!(
                    src = %evicted.src,
                    id = evicted.id,
                    "seen-set full, evicting oldest entry"
                );
            }
        }
        self.entries.push_back(SeenEntry {
            id,
            src,
            dst,
            kind,
            remaining: self.ttl,
        });
        true
    }

    /// Check without recording
    pub fn contains(&self, id: u8, src: Address, dst: Address, kind: MessageKind) -> bool {
        self.entries.iter().any(|e| e.matches(id, src, dst, kind))
    }

    /// Advance time; ages and prunes entries on the cleanup cadence.
    pub fn tick(&mut self, elapsed: Duration) {
        self.since_cleanup += elapsed;
        if self.since_cleanup < self.cleanup_interval {
            return;
        }
        let slice = self.since_cleanup;
        self.since_cleanup = Duration::ZERO;
        let before = self.entries.len();
        for entry in &mut self.entries {
            entry.remaining = entry.remaining.saturating_sub(slice);
        }
        self.entries.retain(|e| !e.remaining.is_zero());
        let expired = before - self.entries.len();
        if expired > 0 {
            debug!(expired, "seen-set entries expired");
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
