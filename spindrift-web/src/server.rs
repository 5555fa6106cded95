//! Axum server exposing the P2P request router.
//!
//! One route does the real work: `/p2p` receives the original scheme URL
//! in its `url` query parameter (host applications forward `bt://`,
//! `bittorrent://` and `magnet:` requests this way) and either dispatches
//! an API action or renders the control document. `/downloads` lists every
//! known download for external clients.

use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Deserialize;
use serde_json::json;
use spindrift_core::magnet::InfoHash;
use spindrift_core::status::{DownloadState, DownloadStatus};
use spindrift_core::supervisor::WorkerSupervisor;
use spindrift_core::DownloadError;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::pages::control_page;
use crate::router::{ApiAction, P2pRequest, RouterError, parse_p2p_url};

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The download supervisor every handler delegates to
    pub supervisor: Arc<WorkerSupervisor>,
}

/// Builds the application router; separated from `run_server` for tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/p2p", get(handle_p2p).post(handle_p2p))
        .route("/downloads", get(list_downloads))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the web server until the listener fails.
///
/// # Errors
/// Returns an error when the port cannot be bound or the server loop ends.
pub async fn run_server(
    supervisor: Arc<WorkerSupervisor>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(AppState { supervisor });

    let addr = format!("127.0.0.1:{port}");
    info!("spindrift router listening on http://{addr}/p2p");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Query carrying the forwarded P2P scheme URL.
#[derive(Deserialize)]
pub struct P2pQuery {
    /// The original scheme URL, e.g. `bt://<hash>?action=api&api=start`.
    url: String,
}

/// Single entry point for both GET and POST `/p2p` requests.
pub async fn handle_p2p(
    method: Method,
    State(state): State<AppState>,
    Query(query): Query<P2pQuery>,
) -> Response {
    let request = match parse_p2p_url(&query.url) {
        Ok(request) => request,
        Err(e) => return router_error_response(e),
    };

    let action = match request.api_action() {
        Ok(action) => action,
        Err(e) => return router_error_response(e),
    };

    match action {
        None => {
            let status = state.supervisor.status(request.info_hash).ok();
            control_page(request.info_hash, status.as_ref()).into_response()
        }
        Some(action) => {
            if let Err(response) = enforce_method_policy(action, &method) {
                return response;
            }
            dispatch_api(&state, &request, action).await
        }
    }
}

/// Mutations require POST; the status read requires GET.
fn enforce_method_policy(action: ApiAction, method: &Method) -> Result<(), Response> {
    let allowed = if action.requires_post() {
        Method::POST
    } else {
        Method::GET
    };
    if *method == allowed {
        Ok(())
    } else {
        Err((
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": format!("this action requires {allowed}") })),
        )
            .into_response())
    }
}

async fn dispatch_api(state: &AppState, request: &P2pRequest, action: ApiAction) -> Response {
    match action {
        ApiAction::Start => {
            // An explicit magnet parameter wins over the URL's own form.
            let magnet = request
                .param("magnet")
                .map(str::to_string)
                .unwrap_or_else(|| request.magnet_uri.clone());
            let announce = request.params_all("tr");
            match state.supervisor.start(&magnet, &announce).await {
                Ok(status) => Json(json!({
                    "success": true,
                    "infoHash": status.info_hash,
                    "magnetURI": status.magnet_uri,
                }))
                .into_response(),
                Err(e) => error_response(e),
            }
        }
        ApiAction::Status => match target_hash(request) {
            Ok(info_hash) => match state.supervisor.status(info_hash) {
                Ok(status) => Json(status_body(&status)).into_response(),
                Err(e) => error_response(e),
            },
            Err(response) => response,
        },
        ApiAction::Pause => match target_hash(request) {
            Ok(info_hash) => match state.supervisor.pause(info_hash).await {
                Ok(_) => Json(json!({ "success": true, "paused": true })).into_response(),
                Err(e) => error_response(e),
            },
            Err(response) => response,
        },
        ApiAction::Resume => match target_hash(request) {
            Ok(info_hash) => match state.supervisor.resume(info_hash).await {
                Ok(_) => Json(json!({ "success": true, "paused": false })).into_response(),
                Err(e) => error_response(e),
            },
            Err(response) => response,
        },
        ApiAction::Remove => match target_hash(request) {
            Ok(info_hash) => match state.supervisor.remove(info_hash).await {
                Ok(()) => Json(json!({ "success": true, "removed": true })).into_response(),
                Err(e) => error_response(e),
            },
            Err(response) => response,
        },
    }
}

/// Lists every known download, newest first.
pub async fn list_downloads(State(state): State<AppState>) -> Json<serde_json::Value> {
    let torrents: Vec<serde_json::Value> =
        state.supervisor.status_all().iter().map(status_body).collect();
    Json(json!({
        "total": torrents.len(),
        "torrents": torrents,
    }))
}

/// Hash an API call operates on: an explicit `hash` parameter wins over
/// the hash embedded in the URL itself. There is no implicit fallback to
/// some other torrent.
fn target_hash(request: &P2pRequest) -> Result<InfoHash, Response> {
    match request.param("hash") {
        Some(text) => InfoHash::from_str(text).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.user_message() })),
            )
                .into_response()
        }),
        None => Ok(request.info_hash),
    }
}

/// Status record as served over the API, with the derived `done`/`paused`
/// booleans clients key on.
fn status_body(status: &DownloadStatus) -> serde_json::Value {
    let mut value = serde_json::to_value(status).unwrap_or_else(|_| json!({}));
    if let Some(map) = value.as_object_mut() {
        map.insert("done".to_string(), json!(status.state == DownloadState::Done));
        map.insert(
            "paused".to_string(),
            json!(status.state == DownloadState::Paused),
        );
    }
    value
}

fn router_error_response(error: RouterError) -> Response {
    let code = match error {
        RouterError::UnsupportedScheme { .. } => StatusCode::FORBIDDEN,
        RouterError::Malformed { .. } => StatusCode::BAD_REQUEST,
    };
    (code, Json(json!({ "error": error.to_string() }))).into_response()
}

fn error_response(error: DownloadError) -> Response {
    let code = match &error {
        DownloadError::InvalidMagnet { .. } => StatusCode::BAD_REQUEST,
        DownloadError::TorrentNotFound { .. } => StatusCode::NOT_FOUND,
        DownloadError::CommandTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DownloadError::WorkerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DownloadError::Engine { .. }
        | DownloadError::Store(_)
        | DownloadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(json!({ "error": error.user_message() }))).into_response()
}
