//! Main HTTP control plane server: builds the axum router for whichever
//! role (`write` or `read`) this process is serving and binds it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::middleware::access_log;
use crate::routes::{env, health, sandbox, warmup};
use crate::state::GatewayState;

pub fn build_router(state: Arc<GatewayState>) -> Router {
    let sandbox_router = Router::new()
        .route("/start", post(sandbox::start))
        .route("/stop", post(sandbox::stop))
        .route("/status", get(sandbox::status))
        .route("/create_session", post(sandbox::create_session))
        .route("/close_session", post(sandbox::close_session))
        .route("/run_in_session", post(sandbox::run_in_session))
        .route("/execute", post(sandbox::execute))
        .route("/read_file", post(sandbox::read_file))
        .route("/write_file", post(sandbox::write_file))
        .route("/upload", post(sandbox::upload))
        .route("/arun_nohup", post(sandbox::arun_nohup))
        .route("/statistics", get(sandbox::statistics))
        .route("/check_pid", post(sandbox::check_pid));

    let warmup_router = Router::new()
        .route("/configure", post(warmup::configure))
        .route("/status", get(warmup::status));

    Router::new()
        .nest("/apis/envs/sandbox/v1/sandbox", sandbox_router)
        .route("/apis/envs/sandbox/v1/env/{op}", post(env::dispatch))
        .nest("/apis/envs/sandbox/v1/warmup", warmup_router)
        .route("/api/health", get(health::health))
        .layer(axum::middleware::from_fn(access_log))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the control plane HTTP server for `state.role`.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: Arc<GatewayState>) -> Result<()> {
    let role = state.role;
    let app = build_router(state);

    info!(%addr, ?role, "gateway HTTP server listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
