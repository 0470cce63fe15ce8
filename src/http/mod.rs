//! HTTP peer pool
//!
//! [`HttpPool`] wires a process into a peer group over HTTP. It owns the
//! consistent-hash ring mapping keys to peer base URLs, hands out
//! [`HttpPeer`] clients for remote owners, and serves the wire protocol to
//! other peers through an axum [`Router`].
//!
//! # Example
//!
//! ```no_run
//! use peercache::http::HttpPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = HttpPool::new("http://10.0.0.1:8000");
//! pool.set_peers([
//!     "http://10.0.0.1:8000",
//!     "http://10.0.0.2:8000",
//!     "http://10.0.0.3:8000",
//! ]);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, pool.router()).await?;
//! # Ok(())
//! # }
//! ```

pub mod wire;

mod client;

pub use client::HttpPeer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use prost::Message;
use tracing::{debug, info};

use crate::group::get_group;
use crate::metrics;
use crate::peers::{register_peer_picker, Context, PeerClient, PeerPicker};
use crate::ring::{Ring, DEFAULT_REPLICAS};
use crate::sink::ByteSink;

/// Path under which peers serve each other
pub const DEFAULT_BASE_PATH: &str = "/_groupcache/";

static POOL_CREATED: AtomicBool = AtomicBool::new(false);

/// Options for an [`HttpPool`].
#[derive(Debug, Clone)]
pub struct HttpPoolOptions {
    /// HTTP path serving peer requests; must start and end with `/`
    /// (default [`DEFAULT_BASE_PATH`])
    pub base_path: String,

    /// Number of virtual nodes per peer on the ring (default 50)
    pub replicas: usize,
}

impl Default for HttpPoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
        }
    }
}

struct PoolState {
    ring: Ring,
    peers: HashMap<String, Arc<HttpPeer>>,
}

struct PoolInner {
    /// This peer's base URL, e.g. `http://10.0.0.1:8000`
    self_url: String,
    options: HttpPoolOptions,
    client: reqwest::Client,
    state: Mutex<PoolState>,
}

/// A peer picker for a pool of HTTP peers.
///
/// `HttpPool` is a cheap-clone handle; it registers itself as the
/// process-wide peer picker on construction, so groups created afterwards
/// route remote keys through it.
#[derive(Clone)]
pub struct HttpPool {
    inner: Arc<PoolInner>,
}

impl HttpPool {
    /// Create the pool for this process with default options and register
    /// it as the process-wide peer picker.
    ///
    /// `self_url` must be this peer's base URL as other peers reach it,
    /// for example `http://10.0.0.1:8000`.
    ///
    /// # Panics
    ///
    /// Panics when called a second time in one process, or when a peer
    /// picker is already registered.
    pub fn new(self_url: impl Into<String>) -> HttpPool {
        Self::with_options(self_url, HttpPoolOptions::default())
    }

    /// Create the pool with explicit options.
    ///
    /// # Panics
    ///
    /// See [`HttpPool::new`]; additionally panics when the base path does
    /// not start and end with `/` or when `replicas` is zero.
    pub fn with_options(self_url: impl Into<String>, options: HttpPoolOptions) -> HttpPool {
        if POOL_CREATED.swap(true, Ordering::SeqCst) {
            panic!("HttpPool created more than once in this process");
        }
        assert!(
            options.base_path.starts_with('/') && options.base_path.ends_with('/'),
            "base path {:?} must start and end with '/'",
            options.base_path
        );
        assert!(options.replicas >= 1, "replicas must be at least 1");

        let replicas = options.replicas;
        let pool = HttpPool {
            inner: Arc::new(PoolInner {
                self_url: self_url.into(),
                options,
                client: reqwest::Client::new(),
                state: Mutex::new(PoolState {
                    ring: Ring::new(replicas),
                    peers: HashMap::new(),
                }),
            }),
        };

        let picker = pool.clone();
        register_peer_picker(move || Arc::new(picker.clone()) as Arc<dyn PeerPicker>);
        pool
    }

    /// Replace the pool's peer set.
    ///
    /// Each peer is a base URL such as `http://10.0.0.2:8000`. The ring
    /// and the per-peer clients are rebuilt from scratch and swapped in
    /// atomically; in-flight lookups see either the old or the new set.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = Ring::new(self.inner.options.replicas);
        ring.add_peers(peers.iter().cloned());

        let mut clients = HashMap::new();
        for peer in &peers {
            let base = format!("{}{}", peer, self.inner.options.base_path);
            match HttpPeer::with_client(&base, self.inner.client.clone()) {
                Ok(client) => {
                    clients.insert(peer.clone(), Arc::new(client));
                }
                Err(err) => panic!("invalid peer base URL {base}: {err}"),
            }
        }

        info!(peers = peers.len(), "peer set replaced");
        let mut state = self.inner.state.lock();
        state.ring = ring;
        state.peers = clients;
    }

    /// The axum router serving the wire protocol for this pool.
    ///
    /// Mount it on the listener other peers use to reach `self_url`.
    pub fn router(&self) -> Router {
        let path = format!("{}{{group}}/{{key}}", self.inner.options.base_path);
        Router::new().route(&path, get(serve_get))
    }

    /// This peer's own base URL.
    pub fn self_url(&self) -> &str {
        &self.inner.self_url
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let state = self.inner.state.lock();
        let owner = state.ring.get(key)?;
        if owner == self.inner.self_url {
            return None;
        }
        state
            .peers
            .get(owner)
            .cloned()
            .map(|peer| peer as Arc<dyn PeerClient>)
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.inner.self_url)
            .field("base_path", &self.inner.options.base_path)
            .finish_non_exhaustive()
    }
}

/// Serve one peer get: look up the group, run the get locally, and answer
/// with a protobuf-encoded response.
async fn serve_get(Path((group_name, key)): Path<(String, String)>) -> Response {
    debug!(group = %group_name, key = %key, "serving peer request");

    let Some(group) = get_group(&group_name) else {
        return (
            StatusCode::NOT_FOUND,
            format!("no such group: {group_name}"),
        )
            .into_response();
    };

    group
        .stats()
        .server_requests
        .fetch_add(1, Ordering::Relaxed);
    metrics::SERVER_REQUESTS
        .with_label_values(&[group.name()])
        .inc();

    let mut value = Vec::new();
    let mut sink = ByteSink::new(&mut value);
    if let Err(err) = group.get(&Context::new(), &key, &mut sink).await {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    let body = wire::GetResponse {
        value: value.into(),
        minute_qps: None,
    }
    .encode_to_vec();

    ([(header::CONTENT_TYPE, "application/x-protobuf")], body).into_response()
}
