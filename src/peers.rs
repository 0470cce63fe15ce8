//! Peer discovery and transport contracts
//!
//! Defines how a process finds the owner of a key ([`PeerPicker`]) and how
//! it asks that owner for a value ([`PeerClient`]). The concrete HTTP
//! implementation lives in [`crate::http`]; groups resolve their picker
//! lazily through the process-wide registry in this module, so transports
//! can be wired up during bootstrap before any group is used.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::error::Result;
use crate::http::wire::{GetRequest, GetResponse};

// =============================================================================
// Context
// =============================================================================

/// Opaque per-request context carried through gets, loaders, and peer
/// calls.
///
/// Carries an optional deadline which transports map onto request
/// timeouts. The context is never part of the cache key.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// A context with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// A context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A context expiring at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// The absolute deadline, if one is set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; `None` when no deadline is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

// =============================================================================
// Transport contracts
// =============================================================================

/// A remote peer that can answer get requests.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Fetch the value for the request's group and key from this peer.
    async fn get(&self, ctx: &Context, request: &GetRequest) -> Result<GetResponse>;
}

/// Locates the peer that owns a specific key.
pub trait PeerPicker: Send + Sync {
    /// The owner of `key`, only when it is a peer other than this
    /// process; `None` when this process owns the key or no peers are
    /// configured.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>>;
}

/// A picker that never finds a remote peer, so every key is loaded
/// locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPeers;

impl PeerPicker for NoPeers {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
        None
    }
}

// =============================================================================
// Process-wide picker registry
// =============================================================================

type PickerFactory = Box<dyn Fn(&str) -> Arc<dyn PeerPicker> + Send + Sync>;

lazy_static! {
    static ref PICKER_FACTORY: RwLock<Option<PickerFactory>> = RwLock::new(None);
}

/// Register the peer-picker factory used by every group.
///
/// Called once during bootstrap, before groups resolve their picker.
/// Either this or [`register_per_group_peer_picker`] may be called, not
/// both.
///
/// # Panics
///
/// Panics if a picker factory is already registered.
pub fn register_peer_picker<F>(factory: F)
where
    F: Fn() -> Arc<dyn PeerPicker> + Send + Sync + 'static,
{
    install_picker_factory(Box::new(move |_| factory()));
}

/// Register a peer-picker factory that receives the group name, for
/// setups that route groups through different peer sets.
///
/// # Panics
///
/// Panics if a picker factory is already registered.
pub fn register_per_group_peer_picker<F>(factory: F)
where
    F: Fn(&str) -> Arc<dyn PeerPicker> + Send + Sync + 'static,
{
    install_picker_factory(Box::new(factory));
}

fn install_picker_factory(factory: PickerFactory) {
    let mut guard = PICKER_FACTORY.write();
    if guard.is_some() {
        panic!("peer picker registered more than once");
    }
    *guard = Some(factory);
}

/// Resolve the picker for `group`, falling back to [`NoPeers`] when no
/// factory is registered.
pub(crate) fn picker_for(group: &str) -> Arc<dyn PeerPicker> {
    match PICKER_FACTORY.read().as_ref() {
        Some(factory) => factory(group),
        None => Arc::new(NoPeers),
    }
}

/// Drop the registered picker factory so another can be installed.
///
/// Only intended for test isolation; production processes register their
/// picker once at bootstrap.
pub fn clear_peer_picker() {
    *PICKER_FACTORY.write() = None;
}
