//! In-container HTTP agent. Runs alongside a sandbox's workload, owns real
//! shells and processes, and answers the HTTP calls the control plane's
//! sandbox actor makes against `AGENT_INTERNAL_PORT`.

pub mod env;
pub mod routes;
pub mod shell;
pub mod state;
pub mod unpack;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use state::AgentState;

/// Must match `rockhold_sandbox::AGENT_INTERNAL_PORT`, the fixed container
/// port the control plane's deployment driver publishes.
pub const AGENT_PORT: u16 = 8700;

pub fn build_router(state: Arc<AgentState>) -> Router {
    let session_router = Router::new()
        .route("/{name}/create", post(routes::create_session))
        .route("/{name}/close", post(routes::close_session))
        .route("/{name}/run", post(routes::run_in_session));

    Router::new()
        .nest("/session", session_router)
        .route("/execute", post(routes::execute))
        .route("/file", get(routes::read_file).post(routes::write_file))
        .route("/upload", post(routes::upload))
        .route("/env/{op}", post(routes::env_dispatch))
        .route("/healthz", get(routes::healthz))
        .with_state(state)
}

#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: Arc<AgentState>) -> Result<()> {
    let app = build_router(state);
    info!(%addr, "in-container agent listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
