//! `/env/{make,step,reset,close,list}`: generic environment RPCs forwarded
//! verbatim to the in-container agent. The body shape is env-specific and
//! opaque to the control plane beyond the `sandbox_id` routing key.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use rockhold_core::SandboxError;
use serde_json::Value;

use crate::error::{require_write, ApiError, ApiResult};
use crate::state::GatewayState;

pub async fn dispatch(
    State(state): State<Arc<GatewayState>>,
    Path(op): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    require_write(&state)?;

    let sandbox_id = body
        .get("sandbox_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError(SandboxError::InvalidArgument("missing sandbox_id".to_string())))?
        .to_string();

    // Per-id lock mirrors the other mutating sandbox operations; `step`,
    // `reset`, and `list` are left unlocked like the other read/step paths.
    let _guard = if op == "make" || op == "close" {
        Some(state.registry.lock(&sandbox_id).await?)
    } else {
        None
    };

    let actor = state
        .registry
        .lookup(&sandbox_id)
        .await
        .ok_or_else(|| ApiError(SandboxError::NotFound(sandbox_id.clone())))?;

    let result = actor.env_rpc(&op, body).await?;
    Ok(Json(result))
}
