//! HTTP Transport Integration Tests
//!
//! Boots a real peer server on an ephemeral port and exercises the wire
//! protocol end to end: raw HTTP round-trips, the peer client, escaping of
//! path segments, and the error contract (404 for unknown groups, 500 for
//! failing loads, transport errors for unreachable peers).

use std::sync::atomic::Ordering;
use std::time::Duration;

use prost::Message;

use peercache::http::wire::{GetRequest, GetResponse};
use peercache::http::HttpPeer;
use peercache::http::HttpPool;
use peercache::{Context, Error, Group, LoaderFn, PeerClient};

/// The pool may be created only once per process, so every server-side
/// scenario lives in this one test.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wire_protocol_round_trip() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let self_url = format!("http://{addr}");

    let pool = HttpPool::new(self_url.clone());
    pool.set_peers([self_url.clone()]);

    let group = Group::builder(
        "http-colors",
        LoaderFn::new(|key: String| async move {
            if key == "missing" {
                Err(Error::Loader("no such color".into()))
            } else {
                Ok(format!("value-of-{key}").into_bytes())
            }
        }),
    )
    .cache_bytes(1 << 20)
    .build();

    let app = pool.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });
    // Give the server a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // --- Raw HTTP round-trip ------------------------------------------------
    let http = reqwest::Client::new();
    let response = http
        .get(format!("{self_url}/_groupcache/http-colors/red"))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/x-protobuf")
    );
    let body = response.bytes().await.expect("body");
    let decoded = GetResponse::decode(body).expect("protobuf body");
    assert_eq!(decoded.value.as_ref(), b"value-of-red");

    assert_eq!(group.stats().server_requests.load(Ordering::Relaxed), 1);

    // --- Peer client round-trip --------------------------------------------
    let peer = HttpPeer::new(&format!("{self_url}/_groupcache/")).expect("peer client");
    let response = peer
        .get(
            &Context::new(),
            &GetRequest {
                group: "http-colors".to_string(),
                key: "blue".to_string(),
            },
        )
        .await
        .expect("peer get");
    assert_eq!(response.value.as_ref(), b"value-of-blue");

    // --- Keys with separators survive escaping ------------------------------
    let response = peer
        .get(
            &Context::new(),
            &GetRequest {
                group: "http-colors".to_string(),
                key: "shades/of gray".to_string(),
            },
        )
        .await
        .expect("escaped key");
    assert_eq!(response.value.as_ref(), b"value-of-shades/of gray");

    // --- Unknown group answers 404 ------------------------------------------
    let response = http
        .get(format!("{self_url}/_groupcache/no-such-group/key"))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let err = peer
        .get(
            &Context::new(),
            &GetRequest {
                group: "no-such-group".to_string(),
                key: "key".to_string(),
            },
        )
        .await
        .expect_err("unknown group fails");
    assert!(matches!(err, Error::PeerStatus { status: 404 }));

    // --- Failing loads answer 500 -------------------------------------------
    let response = http
        .get(format!("{self_url}/_groupcache/http-colors/missing"))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(
        response.status(),
        reqwest::StatusCode::INTERNAL_SERVER_ERROR
    );

    // --- Served values are cached like any other get ------------------------
    let before = group.stats().cache_hits.load(Ordering::Relaxed);
    let response = http
        .get(format!("{self_url}/_groupcache/http-colors/red"))
        .send()
        .await
        .expect("request succeeds");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(group.stats().cache_hits.load(Ordering::Relaxed), before + 1);
}

/// A peer that cannot be reached surfaces a transport error, the signal a
/// group uses to fall back to its local loader.
#[tokio::test]
async fn test_unreachable_peer_is_a_transport_error() {
    // Bind-then-drop yields a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let peer = HttpPeer::new(&format!("http://{addr}/_groupcache/")).expect("peer client");
    let err = peer
        .get(
            &Context::with_timeout(Duration::from_secs(2)),
            &GetRequest {
                group: "any".to_string(),
                key: "key".to_string(),
            },
        )
        .await
        .expect_err("nothing is listening");
    assert!(matches!(err, Error::Transport(_)));
}
