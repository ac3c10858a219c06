//! Engine configuration.
//!
//! Millisecond knobs follow the `_ms: u64` convention; they are converted
//! to `Duration` once at construction of the component that uses them.

/// Link adapter configuration
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Link-layer retry budget per frame
    pub max_tries: u8,
    /// Minimum spacing between driver send calls (ms)
    pub send_interval_ms: u64,
    /// Capacity of the cooperative ingress queue
    pub ingress_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_tries: 2,
            send_interval_ms: 100,
            ingress_capacity: 8,
        }
    }
}

/// Per-node mesh configuration
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Network identifier written into every frame (reserved, keep 0)
    pub network_id: u16,
    /// Initial TTL on locally originated frames
    pub initial_hop_count: u8,
    /// How long to wait for an end-to-end acknowledgement (ms)
    pub confirm_timeout_ms: u64,
    /// Lifetime of a duplicate-suppression entry (ms)
    pub seen_ttl_ms: u64,
    /// Cadence of duplicate-suppression aging (ms)
    pub seen_cleanup_interval_ms: u64,
    /// Maximum duplicate-suppression entries
    pub max_seen: usize,
    /// Maximum queued outbound messages
    pub max_queue: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            network_id: 0,
            initial_hop_count: 3,
            confirm_timeout_ms: 1000,
            seen_ttl_ms: 2000,
            seen_cleanup_interval_ms: 1000,
            max_seen: 10,
            max_queue: 16,
        }
    }
}

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Lifetime of a routing entry (ms)
    pub routing_ttl_ms: u64,
    /// Cadence of routing-table aging (ms)
    pub routing_update_interval_ms: u64,
    /// Maximum routing entries
    pub max_routing: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            routing_ttl_ms: 10_000,
            routing_update_interval_ms: 100,
            max_routing: 10,
        }
    }
}
