//! peercache - distributed in-memory read-through caching over a fixed set
//! of peer processes
//!
//! This library provides a data loading mechanism with caching and
//! de-duplication:
//! - Consistent-hash ownership: exactly one peer is authoritative per key
//! - Two cache tiers per process (owned keys and replicated hot keys)
//!   sharing one byte budget with coordinated eviction
//! - Single-flight loading: concurrent misses for one key collapse into a
//!   single loader or peer fetch
//! - An HTTP/protobuf transport for peer-to-peer fetches
//!
//! A get probes the local tiers first and otherwise delegates to the
//! key's owner, which serves from its own cache or produces the value.
//! When a popular key goes cold, the whole peer group typically performs a
//! single load rather than one per caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod byteview;
pub mod cache;
pub mod config;
pub mod error;
pub mod group;
pub mod http;
pub mod metrics;
pub mod peers;
pub mod ring;
pub mod singleflight;
pub mod sink;

// Re-export main types
pub use byteview::ByteView;
pub use cache::CacheStats;
pub use config::Config;
pub use error::{Error, Result};
pub use group::{
    clear_groups, get_group, register_group_hook, register_server_start, CacheKind, Group,
    GroupBuilder, GroupStats, Loader, LoaderFn,
};
pub use peers::{
    clear_peer_picker, register_peer_picker, register_per_group_peer_picker, Context, NoPeers,
    PeerClient, PeerPicker,
};
