//! End-to-End Cache Group Tests
//!
//! Exercises the public API of cache groups as a complete system:
//!
//! 1. **Read-through** - misses reach the loader, hits do not
//! 2. **Request coalescing** - concurrent misses share one load
//! 3. **Byte budget** - coordinated eviction keeps both tiers within bounds
//! 4. **Sink variants** - values delivered as bytes, text, and views
//! 5. **Hooks** - group creation and server start hooks fire once

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use peercache::sink::{ByteSink, StringSink, TruncatingByteSink, ViewSink};
use peercache::{ByteView, CacheKind, Context, Group, LoaderFn};

// =============================================================================
// Test Helpers
// =============================================================================

/// Build a group whose loader answers `<key>!` and counts invocations.
fn counting_group(name: &str, cache_bytes: u64) -> (Group, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let group = Group::builder(
        name,
        LoaderFn::new(move |key: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("{key}!").into_bytes())
            }
        }),
    )
    .cache_bytes(cache_bytes)
    .build();
    (group, loads)
}

/// Build a group whose loader answers a fixed five-byte value for every
/// key, so entry costs depend only on key length.
fn fixed_value_group(name: &str, cache_bytes: u64) -> (Group, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let group = Group::builder(
        name,
        LoaderFn::new(move |_key: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(b"12345".to_vec())
            }
        }),
    )
    .cache_bytes(cache_bytes)
    .build();
    (group, loads)
}

/// Get `key` into a fresh byte buffer.
async fn get_bytes(group: &Group, key: &str) -> peercache::Result<Vec<u8>> {
    let mut value = Vec::new();
    let mut sink = ByteSink::new(&mut value);
    group.get(&Context::new(), key, &mut sink).await?;
    Ok(value)
}

// =============================================================================
// Test: Read-Through Caching
// =============================================================================

/// A miss loads through the loader; the following get is a cache hit.
#[tokio::test]
async fn test_local_load_then_cache_hit() {
    let (group, loads) = counting_group("it-read-through", 1 << 20);

    let value = get_bytes(&group, "abc").await.expect("first get");
    assert_eq!(value, b"abc!");

    let stats = group.stats();
    assert_eq!(stats.gets.load(Ordering::Relaxed), 1);
    assert_eq!(stats.cache_hits.load(Ordering::Relaxed), 0);
    assert_eq!(stats.local_loads.load(Ordering::Relaxed), 1);

    let value = get_bytes(&group, "abc").await.expect("second get");
    assert_eq!(value, b"abc!");

    assert_eq!(stats.gets.load(Ordering::Relaxed), 2);
    assert_eq!(stats.cache_hits.load(Ordering::Relaxed), 1);
    assert_eq!(stats.local_loads.load(Ordering::Relaxed), 1);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

/// The cached view keeps its bytes even when a caller mutates the buffer
/// it received.
#[tokio::test]
async fn test_cached_value_is_immutable() {
    let (group, _) = counting_group("it-immutable", 1 << 20);

    let mut first = get_bytes(&group, "stable").await.expect("get");
    first[0] = b'X';

    let second = get_bytes(&group, "stable").await.expect("get");
    assert_eq!(second, b"stable!");
}

// =============================================================================
// Test: Request Coalescing
// =============================================================================

/// 100 concurrent gets for one key produce exactly one load and all
/// receive the same bytes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_share_one_load() {
    let serial = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&serial);
    let group = Group::builder(
        "it-coalescing",
        LoaderFn::new(move |_key: String| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let serial = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(serial.to_string().into_bytes())
            }
        }),
    )
    .cache_bytes(1 << 20)
    .build();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..100 {
        let group = group.clone();
        tasks.spawn(async move { get_bytes(&group, "k").await.expect("get") });
    }

    let mut results = Vec::new();
    while let Some(result) = tasks.join_next().await {
        results.push(result.expect("task"));
    }

    assert!(results.iter().all(|bytes| bytes == b"1"));
    assert_eq!(serial.load(Ordering::SeqCst), 1);

    let stats = group.stats();
    assert_eq!(stats.local_loads.load(Ordering::Relaxed), 1);
    assert_eq!(stats.loads_deduped.load(Ordering::Relaxed), 1);
    assert_eq!(stats.gets.load(Ordering::Relaxed), 100);
}

// =============================================================================
// Test: Byte Budget and Eviction
// =============================================================================

/// Filling a 30-byte budget exactly, then overflowing it, evicts entries
/// from the least recently used end until the budget holds again.
#[tokio::test]
async fn test_byte_budget_evicts_oldest_first() {
    let (group, loads) = fixed_value_group("it-eviction", 30);

    // Entry costs: "a"+5=6, "bb"+5=7, "ccc"+5=8, "dddd"+5=9; cumulative 30.
    for key in ["a", "bb", "ccc", "dddd"] {
        get_bytes(&group, key).await.expect("fill");
    }
    let main = group.cache_stats(CacheKind::Main);
    assert_eq!(main.bytes, 30);
    assert_eq!(main.items, 4);
    assert_eq!(main.evictions, 0);

    // "eeeee" costs 10: "a" (6) and then "bb" (7) must go, leaving 27.
    get_bytes(&group, "eeeee").await.expect("overflow");
    let main = group.cache_stats(CacheKind::Main);
    assert_eq!(main.bytes, 27);
    assert_eq!(main.items, 3);
    assert_eq!(main.evictions, 2);

    // Survivors are served from cache; evicted keys reload.
    let loads_before = loads.load(Ordering::SeqCst);
    get_bytes(&group, "ccc").await.expect("survivor");
    get_bytes(&group, "dddd").await.expect("survivor");
    get_bytes(&group, "eeeee").await.expect("survivor");
    assert_eq!(loads.load(Ordering::SeqCst), loads_before);

    get_bytes(&group, "a").await.expect("reload");
    assert_eq!(loads.load(Ordering::SeqCst), loads_before + 1);
}

/// The combined footprint of both tiers never exceeds the budget after a
/// get returns.
#[tokio::test]
async fn test_budget_invariant_under_churn() {
    let budget = 200u64;
    let (group, _) = counting_group("it-budget-churn", budget);

    for i in 0..500 {
        get_bytes(&group, &format!("churn-key-{i}")).await.expect("get");
        let main = group.cache_stats(CacheKind::Main).bytes;
        let hot = group.cache_stats(CacheKind::Hot).bytes;
        assert!(
            main + hot <= budget,
            "after get {i}: main {main} + hot {hot} > {budget}"
        );
    }
    assert!(group.cache_stats(CacheKind::Main).evictions > 0);
}

// =============================================================================
// Test: Sink Variants
// =============================================================================

/// The same cached value can be delivered through every sink variant.
#[tokio::test]
async fn test_all_sink_variants_deliver_the_value() {
    let (group, loads) = counting_group("it-sinks", 1 << 20);
    let ctx = Context::new();

    let mut bytes = Vec::new();
    group
        .get(&ctx, "color", &mut ByteSink::new(&mut bytes))
        .await
        .expect("byte sink");
    assert_eq!(bytes, b"color!");

    let mut text = String::new();
    group
        .get(&ctx, "color", &mut StringSink::new(&mut text))
        .await
        .expect("string sink");
    assert_eq!(text, "color!");

    let mut view = ByteView::new();
    group
        .get(&ctx, "color", &mut ViewSink::new(&mut view))
        .await
        .expect("view sink");
    assert_eq!(view.as_bytes(), b"color!");

    let mut truncated = vec![0u8; 3];
    group
        .get(&ctx, "color", &mut TruncatingByteSink::new(&mut truncated))
        .await
        .expect("truncating sink");
    assert_eq!(truncated, b"col");

    // One load served all four sinks.
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Test: Hooks
// =============================================================================

/// The server-start hook fires once for the first group; the group hook
/// fires for every group created afterwards.
#[tokio::test]
async fn test_creation_hooks_fire() {
    static SERVER_STARTS: AtomicUsize = AtomicUsize::new(0);
    static GROUPS_SEEN: AtomicUsize = AtomicUsize::new(0);

    peercache::register_server_start(|| {
        SERVER_STARTS.fetch_add(1, Ordering::SeqCst);
    });
    // Other tests in this binary create groups concurrently; count only
    // the ones belonging to this test.
    peercache::register_group_hook(|group| {
        if group.name().starts_with("it-hooks-") {
            GROUPS_SEEN.fetch_add(1, Ordering::SeqCst);
        }
    });

    let (_a, _) = counting_group("it-hooks-a", 1 << 10);
    let (_b, _) = counting_group("it-hooks-b", 1 << 10);

    assert!(SERVER_STARTS.load(Ordering::SeqCst) <= 1);
    assert_eq!(GROUPS_SEEN.load(Ordering::SeqCst), 2);

    let found = peercache::get_group("it-hooks-a").expect("registered");
    assert_eq!(found.name(), "it-hooks-a");
}
