//! `/sandbox/*` endpoints: lifecycle, sessions, file I/O, detached processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use rockhold_core::{
    DeploymentSpec, SandboxError, SandboxLifecycle, SandboxStartResponse, SandboxStatistics,
    SandboxStatusResponse,
};
use serde::{Deserialize, Serialize};

use crate::error::{require_write, ApiError, ApiResult};
use crate::state::{GatewayRole, GatewayState};

fn default_timeout() -> u64 {
    30
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub image: String,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub startup_timeout: Option<u64>,
}

pub async fn start(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<StartRequest>,
) -> ApiResult<Json<SandboxStartResponse>> {
    require_write(&state)?;

    let spec = DeploymentSpec {
        image: req.image,
        cpus: req.cpus.unwrap_or(1.0),
        memory: req.memory.unwrap_or_else(|| "512m".to_string()),
        env: req.env,
        startup_timeout_seconds: req.startup_timeout.unwrap_or(60),
    };

    let actor = state.warmup.acquire(&spec).await?;
    Ok(Json(SandboxStartResponse {
        sandbox_id: actor.id.clone(),
        host_name: "127.0.0.1".to_string(),
        host_ip: "127.0.0.1".to_string(),
        cpus: actor.spec.cpus,
        memory: actor.spec.memory.clone(),
    }))
}

#[derive(Deserialize)]
pub struct SandboxIdRequest {
    pub sandbox_id: String,
}

pub async fn stop(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<SandboxIdRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_write(&state)?;
    let _guard = state.registry.lock(&req.sandbox_id).await?;
    let actor = state
        .registry
        .unregister(&req.sandbox_id)
        .await
        .ok_or_else(|| SandboxError::NotFound(req.sandbox_id.clone()))?;
    actor.stop().await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub sandbox_id: String,
}

pub async fn status(
    State(state): State<Arc<GatewayState>>,
    Query(q): Query<StatusQuery>,
) -> ApiResult<Json<SandboxStatusResponse>> {
    if state.role == GatewayRole::Read {
        let snapshot = rockhold_sandbox::status::read_status(&state.status_dir, &q.sandbox_id).await?;
        let lifecycle = if snapshot.any_failed() {
            SandboxLifecycle::Terminated
        } else if snapshot.all_succeeded() {
            SandboxLifecycle::Running
        } else {
            SandboxLifecycle::Creating
        };
        return Ok(Json(SandboxStatusResponse {
            sandbox_id: q.sandbox_id,
            status: lifecycle,
            is_alive: snapshot.all_succeeded(),
            phases: snapshot.phases,
            port_mapping: snapshot.port_mapping,
            host_name: "127.0.0.1".to_string(),
            host_ip: "127.0.0.1".to_string(),
            image: String::new(),
            gateway_version: env!("CARGO_PKG_VERSION").to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            cpus: 0.0,
            memory: String::new(),
        }));
    }

    let actor = state
        .registry
        .lookup(&q.sandbox_id)
        .await
        .ok_or_else(|| SandboxError::NotFound(q.sandbox_id.clone()))?;
    let snapshot = actor.status_snapshot().await;
    let (is_alive, _) = actor.probe_alive().await;
    Ok(Json(SandboxStatusResponse {
        sandbox_id: q.sandbox_id,
        status: SandboxLifecycle::Running,
        is_alive,
        phases: snapshot.phases,
        port_mapping: snapshot.port_mapping,
        host_name: "127.0.0.1".to_string(),
        host_ip: "127.0.0.1".to_string(),
        image: actor.spec.image.clone(),
        gateway_version: env!("CARGO_PKG_VERSION").to_string(),
        sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        cpus: actor.spec.cpus,
        memory: actor.spec.memory.clone(),
    }))
}

async fn lookup_ready(state: &GatewayState, sandbox_id: &str) -> ApiResult<Arc<rockhold_sandbox::SandboxActor>> {
    state
        .registry
        .lookup(sandbox_id)
        .await
        .ok_or_else(|| ApiError(SandboxError::NotFound(sandbox_id.to_string())))
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub sandbox_id: String,
    pub session: String,
    #[serde(default)]
    pub env_enable: bool,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

pub async fn create_session(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_write(&state)?;
    let _guard = state.registry.lock(&req.sandbox_id).await?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;
    let env = if req.env_enable { req.env } else { Default::default() };
    actor.create_session(&req.session, env).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Deserialize)]
pub struct CloseSessionRequest {
    pub sandbox_id: String,
    pub session: String,
}

pub async fn close_session(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CloseSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_write(&state)?;
    let _guard = state.registry.lock(&req.sandbox_id).await?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;
    actor.close_session(&req.session).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Deserialize)]
pub struct RunInSessionRequest {
    pub sandbox_id: String,
    pub session: String,
    pub command: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Serialize)]
pub struct Observation {
    pub output: String,
}

pub async fn run_in_session(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<RunInSessionRequest>,
) -> ApiResult<Json<Observation>> {
    require_write(&state)?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;
    let output = actor
        .run_in_session(&req.session, &req.command, Duration::from_secs(req.timeout))
        .await?;
    Ok(Json(Observation { output }))
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub sandbox_id: String,
    pub command: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Serialize)]
pub struct CommandResponse {
    pub output: String,
}

pub async fn execute(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<Json<CommandResponse>> {
    require_write(&state)?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;
    let output = actor.execute(&req.command, Duration::from_secs(req.timeout)).await?;
    Ok(Json(CommandResponse { output }))
}

#[derive(Deserialize)]
pub struct ReadFileRequest {
    pub sandbox_id: String,
    pub path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

#[derive(Serialize)]
pub struct FileContent {
    pub content: String,
}

pub async fn read_file(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ReadFileRequest>,
) -> ApiResult<Json<FileContent>> {
    require_write(&state)?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;
    let content = match (req.start_line, req.end_line) {
        (Some(start), Some(end)) => actor.read_file_by_line_range(&req.path, start, end).await?,
        _ => actor.read_file(&req.path).await?,
    };
    Ok(Json(FileContent { content }))
}

#[derive(Deserialize)]
pub struct WriteFileRequest {
    pub sandbox_id: String,
    pub path: String,
    pub content: String,
}

pub async fn write_file(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<WriteFileRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_write(&state)?;
    let _guard = state.registry.lock(&req.sandbox_id).await?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;
    actor.write_file(&req.path, &req.content).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn upload(
    State(state): State<Arc<GatewayState>>,
    mut form: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    require_write(&state)?;

    let mut sandbox_id: Option<String> = None;
    let mut target_path: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| ApiError(SandboxError::InvalidArgument(format!("bad multipart body: {e}"))))?
    {
        match field.name().unwrap_or_default() {
            "sandbox_id" => {
                sandbox_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError(SandboxError::InvalidArgument(e.to_string())))?,
                )
            }
            "target_path" => {
                target_path = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError(SandboxError::InvalidArgument(e.to_string())))?,
                )
            }
            "file" => {
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError(SandboxError::InvalidArgument(e.to_string())))?
                        .to_vec(),
                )
            }
            _ => {}
        }
    }

    let sandbox_id = sandbox_id.ok_or_else(|| ApiError(SandboxError::InvalidArgument("missing sandbox_id".to_string())))?;
    let target_path = target_path.ok_or_else(|| ApiError(SandboxError::InvalidArgument("missing target_path".to_string())))?;
    let bytes = file_bytes.ok_or_else(|| ApiError(SandboxError::InvalidArgument("missing file".to_string())))?;

    let _guard = state.registry.lock(&sandbox_id).await?;
    let actor = lookup_ready(&state, &sandbox_id).await?;

    let tmp_path = std::env::temp_dir().join(format!("rockhold-upload-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| ApiError(SandboxError::Internal(anyhow::anyhow!("failed to stage upload: {e}"))))?;

    let result = actor.upload(&tmp_path, &target_path).await;
    let _ = tokio::fs::remove_file(&tmp_path).await;
    result?;

    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct ArunNohupRequest {
    pub sandbox_id: String,
    pub session: String,
    pub command: String,
    #[serde(default)]
    pub ignore_output: bool,
    #[serde(default)]
    pub response_limited_bytes: Option<usize>,
    #[serde(default = "default_timeout")]
    pub submit_timeout: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
}

fn default_poll_timeout() -> u64 {
    300
}

pub async fn arun_nohup(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ArunNohupRequest>,
) -> ApiResult<Json<rockhold_sandbox::NohupResult>> {
    require_write(&state)?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;

    let mode = if req.ignore_output {
        rockhold_sandbox::OutputMode::Ignore
    } else if let Some(limit) = req.response_limited_bytes {
        rockhold_sandbox::OutputMode::Limited(limit)
    } else {
        rockhold_sandbox::OutputMode::Full
    };

    let result = actor
        .arun_nohup(
            &req.session,
            &req.command,
            mode,
            Duration::from_secs(req.submit_timeout),
            Duration::from_secs(req.poll_timeout),
            Duration::from_millis(500),
        )
        .await?;
    Ok(Json(result))
}

pub async fn statistics(
    State(state): State<Arc<GatewayState>>,
    Query(q): Query<StatusQuery>,
) -> ApiResult<Json<SandboxStatistics>> {
    let actor = lookup_ready(&state, &q.sandbox_id).await?;
    Ok(Json(actor.get_statistics().await))
}

#[derive(Deserialize)]
pub struct CheckPidRequest {
    pub sandbox_id: String,
    pub session: String,
    pub pid: u64,
}

pub async fn check_pid(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CheckPidRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_write(&state)?;
    let actor = lookup_ready(&state, &req.sandbox_id).await?;
    let exists = actor.check_pid_exists(&req.session, req.pid, Duration::from_secs(10)).await?;
    Ok(Json(serde_json::json!({ "exists": exists })))
}
