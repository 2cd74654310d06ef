//! `/warmup/*`: pool admin. Declaring a pool's target size and inspecting its
//! current idle count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use rockhold_core::DeploymentSpec;
use rockhold_warmup::PoolConfig;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{require_write, ApiResult};
use crate::state::GatewayState;

#[derive(Deserialize)]
pub struct ConfigureRequest {
    pub image: String,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    #[serde(default = "default_burst_headroom")]
    pub burst_headroom: usize,
    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,
    #[serde(default = "default_max_idle_seconds")]
    pub max_idle_seconds: u64,
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
}

fn default_target_size() -> usize {
    1
}
fn default_burst_headroom() -> usize {
    1
}
fn default_max_concurrent_builds() -> usize {
    2
}
fn default_max_idle_seconds() -> u64 {
    600
}
fn default_startup_timeout_seconds() -> u64 {
    60
}

pub async fn configure(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ConfigureRequest>,
) -> ApiResult<Json<Value>> {
    require_write(&state)?;

    let spec = DeploymentSpec {
        image: req.image,
        cpus: req.cpus.unwrap_or(1.0),
        memory: req.memory.unwrap_or_else(|| "512m".to_string()),
        env: req.env,
        startup_timeout_seconds: req.startup_timeout_seconds,
    };
    let pool_key = spec.pool_key();

    state
        .warmup
        .configure(
            spec,
            PoolConfig {
                target_size: req.target_size,
                burst_headroom: req.burst_headroom,
                max_concurrent_builds: req.max_concurrent_builds,
                max_idle_seconds: req.max_idle_seconds,
                startup_timeout: Duration::from_secs(req.startup_timeout_seconds),
            },
        )
        .await;

    Ok(Json(json!({ "pool_key": pool_key })))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub image: String,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub memory: Option<String>,
}

pub async fn status(State(state): State<Arc<GatewayState>>, Query(q): Query<StatusQuery>) -> ApiResult<Json<Value>> {
    let spec = DeploymentSpec {
        image: q.image,
        cpus: q.cpus.unwrap_or(1.0),
        memory: q.memory.unwrap_or_else(|| "512m".to_string()),
        env: HashMap::new(),
        startup_timeout_seconds: 60,
    };
    let pool_key = spec.pool_key();
    let idle_count = state.warmup.idle_count(&pool_key).await;
    Ok(Json(json!({ "pool_key": pool_key, "idle_count": idle_count })))
}
