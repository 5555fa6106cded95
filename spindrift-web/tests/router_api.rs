//! Integration tests for the P2P request router over a live supervisor.
//!
//! Each test drives the axum router end to end with a simulated swarm
//! engine behind it, covering the API response shapes, the scheme and
//! method security policy, and the rendered control document.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use spindrift_core::config::SpindriftConfig;
use spindrift_core::engine::{BoxedSwarmEngine, SimulatedSwarmEngine};
use spindrift_core::supervisor::WorkerSupervisor;
use spindrift_web::{AppState, build_router};
use tower::ServiceExt;

const MAGNET: &str = "magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA&dn=test";
const HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

struct RouterFixture {
    app: Router,
    _dir: tempfile::TempDir,
}

impl RouterFixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SpindriftConfig::for_testing();
        config.download.download_dir = dir.path().join("downloads");
        config.store.state_file = dir.path().join("state.json");

        let download = config.download.clone();
        let supervisor = Arc::new(WorkerSupervisor::new(
            config,
            Arc::new(move |events| {
                Box::new(SimulatedSwarmEngine::new(&download, events)) as BoxedSwarmEngine
            }),
        ));
        supervisor.initialize().await;

        let app = build_router(AppState { supervisor });
        Self { app, _dir: dir }
    }

    async fn request(&self, method: &str, p2p_url: &str) -> (StatusCode, Value) {
        let uri = format!("/p2p?url={}", urlencoding::encode(p2p_url));
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn start(&self) -> Value {
        let (status, body) = self
            .request("POST", &format!("{MAGNET}&action=api&api=start"))
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

#[tokio::test]
async fn test_start_returns_hash_and_magnet() {
    let fixture = RouterFixture::new().await;

    let body = fixture.start().await;
    assert_eq!(body["success"], true);
    assert_eq!(body["infoHash"], HASH);
    assert_eq!(body["magnetURI"], MAGNET);
}

#[tokio::test]
async fn test_status_shape_for_fresh_download() {
    let fixture = RouterFixture::new().await;
    fixture.start().await;

    let (status, body) = fixture
        .request("GET", &format!("bt://{HASH}?action=api&api=status"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["infoHash"], HASH);
    assert_eq!(body["done"], false);
    assert_eq!(body["paused"], false);
    assert!(body["progress"].as_f64().unwrap() < 1.0);
    assert!(body["numPeers"].is_number());
}

#[tokio::test]
async fn test_status_unknown_hash_is_404() {
    let fixture = RouterFixture::new().await;

    let (status, body) = fixture
        .request("GET", &format!("bt://{}?action=api&api=status", "ff".repeat(20)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Torrent not found");
}

#[tokio::test]
async fn test_pause_and_resume_round_trip() {
    let fixture = RouterFixture::new().await;
    fixture.start().await;

    let (status, body) = fixture
        .request("POST", &format!("bt://{HASH}?action=api&api=pause"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["paused"], true);

    let (status, body) = fixture
        .request("POST", &format!("bt://{HASH}?action=api&api=resume"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused"], false);
}

#[tokio::test]
async fn test_remove_unknown_hash_is_404() {
    let fixture = RouterFixture::new().await;

    let (status, body) = fixture
        .request("POST", &format!("bt://{}?action=api&api=remove", "12".repeat(20)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Torrent not found");
}

#[tokio::test]
async fn test_mutations_require_post() {
    let fixture = RouterFixture::new().await;

    let (status, _) = fixture
        .request("GET", &format!("{MAGNET}&action=api&api=start"))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = fixture
        .request("POST", &format!("bt://{HASH}?action=api&api=status"))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_non_p2p_scheme_is_forbidden() {
    let fixture = RouterFixture::new().await;

    let (status, _) = fixture
        .request("POST", "https://evil.example/?action=api&api=start")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_api_action_is_bad_request() {
    let fixture = RouterFixture::new().await;

    let (status, _) = fixture
        .request("GET", &format!("bt://{HASH}?action=api&api=seed"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plain_url_renders_control_document() {
    let fixture = RouterFixture::new().await;
    fixture.start().await;

    let uri = format!("/p2p?url={}", urlencoding::encode(&format!("bt://{HASH}")));
    let response = fixture
        .app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let page = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(page.contains("<progress"));
    assert!(page.contains("Pause"));
}

#[tokio::test]
async fn test_control_page_script_urls_reach_the_api() {
    let fixture = RouterFixture::new().await;
    fixture.start().await;

    // The rendered page builds its fetch target by appending the routing
    // parameters to the inner P2P URL from its own `url` query parameter.
    // Those exact URLs must dispatch as API calls, not hit the scheme
    // policy.
    for inner in [format!("bt://{HASH}"), MAGNET.to_string()] {
        let sep = if inner.contains('?') { '&' } else { '?' };
        let poll = format!("{inner}{sep}action=api&api=status");
        let (status, body) = fixture.request("GET", &poll).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["infoHash"], HASH);
    }
}

#[tokio::test]
async fn test_downloads_listing() {
    let fixture = RouterFixture::new().await;
    fixture.start().await;

    let response = fixture
        .app
        .clone()
        .oneshot(Request::builder().uri("/downloads").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["torrents"][0]["infoHash"], HASH);
}
