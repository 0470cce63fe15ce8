//! Cache groups
//!
//! A [`Group`] is a named cache namespace spread over a set of peer
//! processes. Each get first consults the local tiers, then delegates to
//! the key's owning peer, and finally falls back to the user-supplied
//! loader; concurrent misses for one key collapse into a single load.
//!
//! Groups are created once, live for the process lifetime, and are
//! reachable by name through a process-wide registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once, OnceLock};

use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tracing::{debug, warn};

use crate::byteview::ByteView;
use crate::cache::{CacheStats, CacheTier};
use crate::error::{Error, Result};
use crate::http::wire::GetRequest;
use crate::metrics;
use crate::peers::{self, Context, PeerClient, PeerPicker};
use crate::singleflight::Flight;
use crate::sink::Sink;

/// Default share of the byte budget at which the hot tier becomes the
/// eviction victim: the hot tier is squeezed once it exceeds one eighth of
/// the main tier's footprint.
const HOT_TIER_RATIO: u64 = 8;

/// Default probability that a value fetched from a peer is mirrored into
/// the hot tier
const DEFAULT_HOT_SAMPLE_RATE: f64 = 0.1;

// =============================================================================
// Loader
// =============================================================================

/// Loads the authoritative value for a key.
///
/// The returned data must be unversioned: the key alone must describe the
/// loaded bytes, with no implicit current time and no reliance on
/// expiration.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Produce the value for `key`, populating `dest`.
    async fn load(&self, ctx: &Context, key: &str, dest: &mut dyn Sink) -> Result<()>;
}

/// Adapts a plain async function producing value bytes into a [`Loader`].
///
/// # Example
///
/// ```no_run
/// use peercache::{Group, LoaderFn};
///
/// let group = Group::builder(
///     "colors",
///     LoaderFn::new(|key| async move { Ok(format!("value-for-{key}").into_bytes()) }),
/// )
/// .cache_bytes(64 << 20)
/// .build();
/// ```
pub struct LoaderFn<F> {
    f: F,
}

impl<F> LoaderFn<F> {
    /// Wrap `f` as a loader
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send,
{
    async fn load(&self, _ctx: &Context, key: &str, dest: &mut dyn Sink) -> Result<()> {
        let bytes = (self.f)(key.to_owned()).await?;
        dest.set_bytes(&bytes)
    }
}

// =============================================================================
// Registry and hooks
// =============================================================================

lazy_static! {
    static ref GROUPS: RwLock<HashMap<String, Group>> = RwLock::new(HashMap::new());
    static ref NEW_GROUP_HOOK: RwLock<Option<Box<dyn Fn(&Group) + Send + Sync>>> =
        RwLock::new(None);
    static ref SERVER_START_HOOK: Mutex<Option<Box<dyn FnOnce() + Send>>> = Mutex::new(None);
}

static SERVER_START: Once = Once::new();

/// Return the named group previously created, if any.
pub fn get_group(name: &str) -> Option<Group> {
    GROUPS.read().get(name).cloned()
}

/// Register a hook run each time a group is created.
///
/// # Panics
///
/// Panics when called more than once.
pub fn register_group_hook<F>(hook: F)
where
    F: Fn(&Group) + Send + Sync + 'static,
{
    let mut guard = NEW_GROUP_HOOK.write();
    if guard.is_some() {
        panic!("group hook registered more than once");
    }
    *guard = Some(Box::new(hook));
}

/// Register a hook run once, when the first group is created.
///
/// This is where a peer server is typically started.
///
/// # Panics
///
/// Panics when called more than once.
pub fn register_server_start<F>(hook: F)
where
    F: FnOnce() + Send + 'static,
{
    let mut guard = SERVER_START_HOOK.lock();
    if guard.is_some() {
        panic!("server start hook registered more than once");
    }
    *guard = Some(Box::new(hook));
}

fn call_server_start() {
    SERVER_START.call_once(|| {
        if let Some(hook) = SERVER_START_HOOK.lock().take() {
            hook();
        }
    });
}

/// Drop every registered group so tests can build a fresh topology.
///
/// Only intended for test isolation; production processes create their
/// groups once at bootstrap.
pub fn clear_groups() {
    GROUPS.write().clear();
}

// =============================================================================
// Stats
// =============================================================================

/// Per-group counters, updated lock-free on the request paths.
#[derive(Debug, Default)]
pub struct GroupStats {
    /// Any get request, including those arriving from peers
    pub gets: AtomicU64,
    /// Gets answered from either cache tier
    pub cache_hits: AtomicU64,
    /// Remote fetches that returned a value
    pub peer_loads: AtomicU64,
    /// Remote fetches that failed
    pub peer_errors: AtomicU64,
    /// Gets that missed both tiers (gets minus cache hits)
    pub loads: AtomicU64,
    /// Loads that survived single-flight deduplication
    pub loads_deduped: AtomicU64,
    /// Successful local loader invocations
    pub local_loads: AtomicU64,
    /// Failed local loader invocations
    pub local_load_errs: AtomicU64,
    /// Gets that came over the network from peers
    pub server_requests: AtomicU64,
}

/// Identifies one of a group's two cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Cache of keys this process owns
    Main,
    /// Cache of popular keys owned by other peers
    Hot,
}

// =============================================================================
// Group
// =============================================================================

type LoadOutcome = std::result::Result<ByteView, Arc<Error>>;

struct GroupInner {
    name: String,
    loader: Arc<dyn Loader>,
    picker: OnceLock<Arc<dyn PeerPicker>>,
    /// Combined byte budget for both tiers; 0 disables caching
    cache_bytes: u64,
    hot_sample_rate: f64,
    main_cache: CacheTier,
    hot_cache: CacheTier,
    flight: Flight<LoadOutcome>,
    stats: GroupStats,
}

/// A named cache namespace with a loader, a byte budget, and a peer
/// picker.
///
/// `Group` is a cheap-clone handle; all clones share the same caches and
/// counters.
///
/// # Example
///
/// ```no_run
/// use peercache::sink::ByteSink;
/// use peercache::{Context, Group, LoaderFn};
///
/// # async fn example() -> peercache::Result<()> {
/// let group = Group::builder(
///     "colors",
///     LoaderFn::new(|key: String| async move { Ok(key.into_bytes()) }),
/// )
/// .cache_bytes(64 << 20)
/// .build();
///
/// let mut value = Vec::new();
/// group
///     .get(&Context::new(), "red", &mut ByteSink::new(&mut value))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

/// Configures and registers a [`Group`].
pub struct GroupBuilder {
    name: String,
    loader: Arc<dyn Loader>,
    cache_bytes: u64,
    hot_sample_rate: f64,
    picker: Option<Arc<dyn PeerPicker>>,
}

impl GroupBuilder {
    /// Combined byte budget for the main and hot tiers (0 disables
    /// caching)
    pub fn cache_bytes(mut self, bytes: u64) -> Self {
        self.cache_bytes = bytes;
        self
    }

    /// Probability in `[0, 1]` that a peer-fetched value is mirrored into
    /// the hot tier (default 0.1)
    pub fn hot_sample_rate(mut self, rate: f64) -> Self {
        self.hot_sample_rate = rate;
        self
    }

    /// Use `picker` instead of resolving the process-wide registered
    /// picker on first use
    pub fn peer_picker(mut self, picker: Arc<dyn PeerPicker>) -> Self {
        self.picker = Some(picker);
        self
    }

    /// Register the group and return its handle.
    ///
    /// # Panics
    ///
    /// Panics when a group with the same name already exists or when the
    /// hot sample rate is outside `[0, 1]`; both are fatal configuration
    /// errors.
    pub fn build(self) -> Group {
        assert!(
            (0.0..=1.0).contains(&self.hot_sample_rate),
            "hot sample rate {} is outside [0, 1]",
            self.hot_sample_rate
        );

        let picker = OnceLock::new();
        if let Some(injected) = self.picker {
            let _ = picker.set(injected);
        }

        let group = Group {
            inner: Arc::new(GroupInner {
                name: self.name,
                loader: self.loader,
                picker,
                cache_bytes: self.cache_bytes,
                hot_sample_rate: self.hot_sample_rate,
                main_cache: CacheTier::new(),
                hot_cache: CacheTier::new(),
                flight: Flight::new(),
                stats: GroupStats::default(),
            }),
        };

        let mut groups = GROUPS.write();
        call_server_start();
        if groups.contains_key(group.name()) {
            panic!("duplicate registration of group {}", group.name());
        }
        if let Some(hook) = NEW_GROUP_HOOK.read().as_ref() {
            hook(&group);
        }
        groups.insert(group.name().to_owned(), group.clone());
        group
    }
}

impl Group {
    /// Start building a group with the given unique name and loader.
    pub fn builder(name: impl Into<String>, loader: impl Loader + 'static) -> GroupBuilder {
        GroupBuilder {
            name: name.into(),
            loader: Arc::new(loader),
            cache_bytes: 0,
            hot_sample_rate: DEFAULT_HOT_SAMPLE_RATE,
            picker: None,
        }
    }

    /// Create and register a group with the default options.
    ///
    /// # Panics
    ///
    /// Panics when a group with the same name already exists.
    pub fn new(
        name: impl Into<String>,
        cache_bytes: u64,
        loader: impl Loader + 'static,
    ) -> Group {
        Self::builder(name, loader).cache_bytes(cache_bytes).build()
    }

    /// The group's name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The group's request counters
    pub fn stats(&self) -> &GroupStats {
        &self.inner.stats
    }

    /// Snapshot of one tier's counters
    pub fn cache_stats(&self, kind: CacheKind) -> CacheStats {
        self.tier(kind).stats()
    }

    /// Get the value for `key`, delivering it into `dest`.
    ///
    /// The value is served from the local tiers when possible; otherwise
    /// it is fetched from the owning peer or produced by the loader, with
    /// concurrent misses for the same key collapsed into one load.
    pub async fn get(&self, ctx: &Context, key: &str, dest: &mut dyn Sink) -> Result<()> {
        self.inner.stats.gets.fetch_add(1, Ordering::Relaxed);
        metrics::GETS.with_label_values(&[self.name()]).inc();

        if let Some(value) = self.lookup_cache(key) {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            metrics::CACHE_HITS.with_label_values(&[self.name()]).inc();
            return dest.set_view(value);
        }

        // Track whether dest was populated during the load, so the one
        // caller whose loader ran does not copy the value a second time.
        let (value, dest_populated) = self.load(ctx, key, &mut *dest).await?;
        if dest_populated {
            return Ok(());
        }
        dest.set_view(value)
    }

    /// Probe the main tier, then the hot tier.
    fn lookup_cache(&self, key: &str) -> Option<ByteView> {
        if self.inner.cache_bytes == 0 {
            return None;
        }
        self.inner
            .main_cache
            .get(key)
            .or_else(|| self.inner.hot_cache.get(key))
    }

    /// Load `key` by asking the owning peer or invoking the local loader,
    /// gated through the single-flight map.
    ///
    /// Returns the value and whether `dest` was already populated.
    async fn load(&self, ctx: &Context, key: &str, dest: &mut dyn Sink) -> Result<(ByteView, bool)> {
        self.inner.stats.loads.fetch_add(1, Ordering::Relaxed);

        let mut dest_populated = false;
        let outcome = self
            .inner
            .flight
            .run(key, async {
                // Check the cache again: the flight map only dedups calls
                // that overlap in time, so two sequential misses for one
                // key would otherwise both run the producer and bill the
                // byte budget twice for a single entry.
                if let Some(value) = self.lookup_cache(key) {
                    self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    metrics::CACHE_HITS.with_label_values(&[self.name()]).inc();
                    return Ok(value);
                }
                self.inner
                    .stats
                    .loads_deduped
                    .fetch_add(1, Ordering::Relaxed);

                if let Some(peer) = self.picker().pick_peer(key) {
                    match self.get_from_peer(ctx, peer.as_ref(), key).await {
                        Ok(value) => {
                            self.inner.stats.peer_loads.fetch_add(1, Ordering::Relaxed);
                            metrics::PEER_LOADS.with_label_values(&[self.name()]).inc();
                            return Ok(value);
                        }
                        Err(err) => {
                            self.inner.stats.peer_errors.fetch_add(1, Ordering::Relaxed);
                            metrics::PEER_ERRORS.with_label_values(&[self.name()]).inc();
                            warn!(
                                group = %self.name(),
                                key,
                                error = %err,
                                "peer fetch failed, falling back to local load"
                            );
                        }
                    }
                }

                match self.get_locally(ctx, key, &mut *dest).await {
                    Ok(value) => {
                        self.inner.stats.local_loads.fetch_add(1, Ordering::Relaxed);
                        metrics::LOCAL_LOADS.with_label_values(&[self.name()]).inc();
                        // Only one caller of load observes this marker.
                        dest_populated = true;
                        debug!(group = %self.name(), key, bytes = value.len(), "filled from loader");
                        self.populate_cache(key, value.clone(), CacheKind::Main);
                        Ok(value)
                    }
                    Err(err) => {
                        self.inner
                            .stats
                            .local_load_errs
                            .fetch_add(1, Ordering::Relaxed);
                        metrics::LOCAL_LOAD_ERRORS
                            .with_label_values(&[self.name()])
                            .inc();
                        Err(Arc::new(err))
                    }
                }
            })
            .await;

        match outcome {
            Some(Ok(value)) => Ok((value, dest_populated)),
            Some(Err(shared)) => Err(Error::Shared(shared)),
            None => Err(Error::LoadInterrupted),
        }
    }

    /// Invoke the user loader and freeze the sink's view.
    async fn get_locally(&self, ctx: &Context, key: &str, dest: &mut dyn Sink) -> Result<ByteView> {
        self.inner.loader.load(ctx, key, dest).await?;
        dest.view()
    }

    /// Fetch `key` from its owning peer, occasionally mirroring the value
    /// into the hot tier.
    async fn get_from_peer(
        &self,
        ctx: &Context,
        peer: &dyn PeerClient,
        key: &str,
    ) -> Result<ByteView> {
        let request = GetRequest {
            group: self.name().to_owned(),
            key: key.to_owned(),
        };
        let response = peer.get(ctx, &request).await?;
        let value = ByteView::from(response.value);

        // Sampling keeps the replicated footprint small without any
        // cross-peer coordination.
        if rand::rng().random::<f64>() < self.inner.hot_sample_rate {
            self.populate_cache(key, value.clone(), CacheKind::Hot);
        }
        Ok(value)
    }

    /// Store an entry and evict until both tiers fit the byte budget.
    ///
    /// The hot tier is the victim while it exceeds one eighth of the main
    /// tier's bytes, which reserves most of the budget for keys this
    /// process owns.
    fn populate_cache(&self, key: &str, value: ByteView, kind: CacheKind) {
        if self.inner.cache_bytes == 0 {
            return;
        }
        self.tier(kind).add(key, value);

        loop {
            let main_bytes = self.inner.main_cache.bytes();
            let hot_bytes = self.inner.hot_cache.bytes();
            if main_bytes + hot_bytes <= self.inner.cache_bytes {
                break;
            }
            if hot_bytes > main_bytes / HOT_TIER_RATIO {
                self.inner.hot_cache.remove_oldest();
            } else {
                self.inner.main_cache.remove_oldest();
            }
        }

        metrics::CACHE_BYTES
            .with_label_values(&[self.name(), "main"])
            .set(self.inner.main_cache.bytes() as i64);
        metrics::CACHE_BYTES
            .with_label_values(&[self.name(), "hot"])
            .set(self.inner.hot_cache.bytes() as i64);
    }

    fn tier(&self, kind: CacheKind) -> &CacheTier {
        match kind {
            CacheKind::Main => &self.inner.main_cache,
            CacheKind::Hot => &self.inner.hot_cache,
        }
    }

    /// The group's peer picker, resolved from the process-wide registry on
    /// first use.
    fn picker(&self) -> &Arc<dyn PeerPicker> {
        self.inner
            .picker
            .get_or_init(|| peers::picker_for(&self.inner.name))
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.inner.name)
            .field("cache_bytes", &self.inner.cache_bytes)
            .finish_non_exhaustive()
    }
}
