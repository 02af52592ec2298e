//! HTTP control surface of a BINVOTE process

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use binvote_consensus::ConsensusEngine;
use binvote_core::{ApiConfig, ProcessId, ProcessStatus, Value};
use binvote_p2p::{routes, FAULTY_BODY, LIVE_BODY};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// API state: the engine of the process being served
pub type ApiState = Arc<ConsensusEngine>;

/// Body of `POST /message`.
///
/// `value` is kept raw so that anything other than `0` and `1` can be
/// accepted and ignored instead of failing extraction.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub from: ProcessId,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Create API router
pub fn create_router(state: ApiState, config: &ApiConfig) -> Router {
    let mut router = Router::new()
        .route(routes::STATUS, get(status))
        .route(routes::GET_STATE, get(get_state))
        .route(routes::START, get(start))
        .route(routes::STOP, get(stop))
        .route(routes::MESSAGE, post(message))
        .with_state(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    if config.enable_trace {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

/// Liveness of the process (not of its round loop)
async fn status(State(engine): State<ApiState>) -> impl IntoResponse {
    match engine.status() {
        ProcessStatus::Live => (StatusCode::OK, LIVE_BODY),
        ProcessStatus::Faulty => (StatusCode::INTERNAL_SERVER_ERROR, FAULTY_BODY),
    }
}

async fn get_state(State(engine): State<ApiState>) -> impl IntoResponse {
    Json(engine.get_state())
}

/// Blocks until the cluster is ready, then launches consensus
async fn start(State(engine): State<ApiState>) -> impl IntoResponse {
    match engine.start().await {
        Ok(()) => (
            StatusCode::OK,
            "Consensus algorithm started".to_string(),
        ),
        Err(e) if e.is_rejection() => (StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            error!("Process {} failed to start: {}", engine.id(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn stop(State(engine): State<ApiState>) -> impl IntoResponse {
    engine.stop();
    (StatusCode::OK, "Node stopped")
}

async fn message(
    State(engine): State<ApiState>,
    Json(req): Json<MessageRequest>,
) -> impl IntoResponse {
    match engine.receive_message(req.from, Value::from_json(&req.value)) {
        Ok(_) => (StatusCode::OK, "Message received".to_string()),
        Err(e) if e.is_rejection() => {
            debug!("Process {} refused message from {}: {}", engine.id(), req.from, e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Serve the control surface of `engine` on an already bound listener
pub async fn serve(engine: ApiState, listener: TcpListener, config: ApiConfig) -> anyhow::Result<()> {
    let id = engine.id();
    let router = create_router(engine, &config);

    info!("Process {} listening on {}", id, listener.local_addr()?);

    axum::serve(listener, router).await?;

    Ok(())
}

/// Start API server
pub async fn start_api_server(
    engine: ApiState,
    listen_addr: &str,
    config: ApiConfig,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    serve(engine, listener, config).await
}
