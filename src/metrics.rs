//! Metrics and telemetry
//!
//! This module provides Prometheus metrics for monitoring cache traffic,
//! load outcomes, and tier footprints. Counters are labeled by group so one
//! process hosting several groups can be monitored per namespace.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

lazy_static! {
    // === Traffic counters ===

    /// Total get requests per group
    pub static ref GETS: IntCounterVec = register_int_counter_vec!(
        "peercache_gets_total",
        "Total get requests",
        &["group"]
    )
    .unwrap();

    /// Gets answered from either cache tier
    pub static ref CACHE_HITS: IntCounterVec = register_int_counter_vec!(
        "peercache_hits_total",
        "Gets answered from a cache tier",
        &["group"]
    )
    .unwrap();

    /// Gets that arrived over the network from peers
    pub static ref SERVER_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "peercache_server_requests_total",
        "Gets received from remote peers",
        &["group"]
    )
    .unwrap();

    // === Load outcome counters ===

    /// Values loaded by the local loader
    pub static ref LOCAL_LOADS: IntCounterVec = register_int_counter_vec!(
        "peercache_local_loads_total",
        "Successful local loader invocations",
        &["group"]
    )
    .unwrap();

    /// Local loader failures
    pub static ref LOCAL_LOAD_ERRORS: IntCounterVec = register_int_counter_vec!(
        "peercache_local_load_errors_total",
        "Failed local loader invocations",
        &["group"]
    )
    .unwrap();

    /// Values fetched from an owning peer
    pub static ref PEER_LOADS: IntCounterVec = register_int_counter_vec!(
        "peercache_peer_loads_total",
        "Successful remote peer fetches",
        &["group"]
    )
    .unwrap();

    /// Remote fetches that failed and fell back to the local loader
    pub static ref PEER_ERRORS: IntCounterVec = register_int_counter_vec!(
        "peercache_peer_errors_total",
        "Failed remote peer fetches",
        &["group"]
    )
    .unwrap();

    // === Footprint gauges ===

    /// Current bytes held per group and tier
    pub static ref CACHE_BYTES: IntGaugeVec = register_int_gauge_vec!(
        "peercache_cache_bytes",
        "Bytes held in cache, by tier",
        &["group", "tier"]
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
