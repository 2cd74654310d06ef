use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use rockhold_agent::state::AgentState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let state = Arc::new(AgentState::new());
    let addr: SocketAddr = ([0, 0, 0, 0], rockhold_agent::AGENT_PORT).into();
    rockhold_agent::start_server(addr, state).await
}
