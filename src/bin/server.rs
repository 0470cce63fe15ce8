//! peercache demo server
//!
//! Runs one cache peer serving a small demo group plus the peer wire
//! protocol. Start several instances to form a group:
//!
//! ```text
//! PEERCACHE_ADDR=127.0.0.1:8080 \
//! PEERCACHE_POOL=http://127.0.0.1:8080,http://127.0.0.1:8081 \
//!     cargo run --bin server
//! ```
//!
//! # Endpoints
//!
//! - `GET /color?name=red` - look up a value through the cache
//! - `GET /stats` - group and tier counters
//! - `GET /health` - health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /_groupcache/<group>/<key>` - peer wire protocol

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use peercache::http::HttpPool;
use peercache::sink::ByteSink;
use peercache::{metrics, CacheKind, Config, Context, Group, LoaderFn};

/// Built-in demo data the loader serves cache misses from
fn demo_store() -> HashMap<String, Vec<u8>> {
    HashMap::from([
        ("red".to_string(), b"#FF0000".to_vec()),
        ("green".to_string(), b"#00FF00".to_vec()),
        ("blue".to_string(), b"#0000FF".to_vec()),
    ])
}

#[derive(Deserialize)]
struct ColorQuery {
    name: String,
}

/// Look up one color through the cache
async fn color(Query(query): Query<ColorQuery>) -> impl IntoResponse {
    let Some(group) = peercache::get_group("colors") else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    };

    let mut value = Vec::new();
    let mut sink = ByteSink::new(&mut value);
    match group.get(&Context::new(), &query.name, &mut sink).await {
        Ok(()) => (StatusCode::OK, value),
        Err(err) => (StatusCode::NOT_FOUND, err.to_string().into_bytes()),
    }
}

/// Health check endpoint
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> String {
    metrics::gather()
}

/// Group and tier counters
async fn stats() -> impl IntoResponse {
    let Some(group) = peercache::get_group("colors") else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({})));
    };

    let stats = group.stats();
    let main = group.cache_stats(CacheKind::Main);
    let hot = group.cache_stats(CacheKind::Hot);
    let body = serde_json::json!({
        "gets": stats.gets.load(Ordering::Relaxed),
        "cache_hits": stats.cache_hits.load(Ordering::Relaxed),
        "peer_loads": stats.peer_loads.load(Ordering::Relaxed),
        "peer_errors": stats.peer_errors.load(Ordering::Relaxed),
        "loads": stats.loads.load(Ordering::Relaxed),
        "loads_deduped": stats.loads_deduped.load(Ordering::Relaxed),
        "local_loads": stats.local_loads.load(Ordering::Relaxed),
        "local_load_errs": stats.local_load_errs.load(Ordering::Relaxed),
        "server_requests": stats.server_requests.load(Ordering::Relaxed),
        "main": { "bytes": main.bytes, "items": main.items, "hits": main.hits },
        "hot": { "bytes": hot.bytes, "items": hot.items, "hits": hot.hits },
    });
    (StatusCode::OK, Json(body))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;

    // Environment overrides for quick multi-instance runs.
    if let Ok(addr) = std::env::var("PEERCACHE_ADDR") {
        config.pool.self_url = format!("http://{addr}");
        if let Some((host, port)) = addr.rsplit_once(':') {
            config.server.host = host.to_string();
            config.server.port = port.parse()?;
        }
    }
    if let Ok(pool_list) = std::env::var("PEERCACHE_POOL") {
        config.pool.peers = pool_list.split(',').map(str::to_owned).collect();
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let pool = HttpPool::with_options(config.pool.self_url.clone(), (&config.pool).into());
    if config.pool.peers.is_empty() {
        pool.set_peers([config.pool.self_url.clone()]);
    } else {
        pool.set_peers(config.pool.peers.clone());
    }

    let store = Arc::new(demo_store());
    Group::builder(
        "colors",
        LoaderFn::new(move |key: String| {
            let store = Arc::clone(&store);
            async move {
                info!(key = %key, "loading from demo store");
                store
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| peercache::Error::Loader("color not found".into()))
            }
        }),
    )
    .cache_bytes(config.cache.cache_bytes)
    .hot_sample_rate(config.cache.hot_sample_rate)
    .build();

    let app = Router::new()
        .route("/color", get(color))
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/stats", get(stats))
        .merge(pool.router());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(addr = %addr, self_url = %config.pool.self_url, "peer listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
