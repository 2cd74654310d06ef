//! HTTP surface the control plane's sandbox actor drives. Response shapes
//! mirror exactly what `SandboxActor`'s own HTTP client expects: `run`,
//! `execute`, and the file read all return their text bodies raw, not
//! wrapped in JSON, while `/env/{op}` is opaque JSON passed straight
//! through.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rockhold_core::SandboxError;
use serde::Deserialize;

use crate::state::AgentState;

/// POSIX single-quote escaping: wraps in single quotes, closing and
/// reopening the quote around any embedded `'`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn error_response(err: SandboxError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

/// The control plane enforces its own timeout by dropping the HTTP
/// connection (see `SandboxActor::raw_submit`/`execute`), so no timeout
/// field travels in the request body. This is a safety net only, to keep an
/// abandoned command from pinning a session or child process forever.
const SAFETY_NET_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Deserialize)]
pub struct RunRequest {
    pub command: String,
}

#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

pub async fn create_session(
    State(state): State<Arc<AgentState>>,
    AxumPath(name): AxumPath<String>,
    Json(body): Json<CreateSessionRequest>,
) -> Response {
    let env = body.env;
    match state.sessions.create(&name).await {
        Ok(()) => {
            if !env.is_empty() {
                if let Some(session) = state.sessions.get(&name).await {
                    for (key, value) in &env {
                        let export = format!("export {key}={}", shell_quote(value));
                        if let Err(e) = session.run(&export, SAFETY_NET_TIMEOUT).await {
                            return error_response(e);
                        }
                    }
                }
            }
            StatusCode::OK.into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn close_session(State(state): State<Arc<AgentState>>, AxumPath(name): AxumPath<String>) -> Response {
    state.sessions.close(&name).await;
    StatusCode::OK.into_response()
}

pub async fn run_in_session(
    State(state): State<Arc<AgentState>>,
    AxumPath(name): AxumPath<String>,
    Json(body): Json<RunRequest>,
) -> Response {
    let Some(session) = state.sessions.get(&name).await else {
        return error_response(SandboxError::SessionGone(name));
    };
    match session.run(&body.command, SAFETY_NET_TIMEOUT).await {
        Ok((output, _exit_code)) => output.into_response(),
        Err(e @ SandboxError::SessionGone(_)) => {
            state.sessions.close(&name).await;
            error_response(e)
        }
        Err(e) => error_response(e),
    }
}

pub async fn execute(State(state): State<Arc<AgentState>>, Json(body): Json<RunRequest>) -> Response {
    match state.run_ephemeral(&body.command, SAFETY_NET_TIMEOUT).await {
        Ok(output) => output.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct ReadFileQuery {
    pub path: String,
}

pub async fn read_file(State(_state): State<Arc<AgentState>>, Query(query): Query<ReadFileQuery>) -> Response {
    match tokio::fs::read_to_string(&query.path).await {
        Ok(content) => content.into_response(),
        Err(e) => error_response(SandboxError::InvalidArgument(format!("failed to read {}: {e}", query.path))),
    }
}

#[derive(Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

pub async fn write_file(State(_state): State<Arc<AgentState>>, Json(body): Json<WriteFileRequest>) -> Response {
    if let Some(parent) = Path::new(&body.path).parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return error_response(SandboxError::Internal(anyhow::anyhow!("failed to create parent dirs: {e}")));
        }
    }
    match tokio::fs::write(&body.path, body.content.as_bytes()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(SandboxError::Internal(anyhow::anyhow!("failed to write {}: {e}", body.path))),
    }
}

pub async fn upload(State(_state): State<Arc<AgentState>>, mut form: Multipart) -> Response {
    let mut target_path: Option<String> = None;
    let mut unzip = false;
    let mut bytes: Option<Vec<u8>> = None;

    loop {
        let field = match form.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return error_response(SandboxError::InvalidArgument(format!("bad multipart body: {e}"))),
        };
        match field.name().unwrap_or_default() {
            "target_path" => target_path = field.text().await.ok(),
            "unzip" => unzip = field.text().await.map(|t| t == "true").unwrap_or(false),
            "file" => bytes = field.bytes().await.ok().map(|b| b.to_vec()),
            _ => {}
        }
    }

    let Some(target_path) = target_path else {
        return error_response(SandboxError::InvalidArgument("missing target_path".to_string()));
    };
    let Some(bytes) = bytes else {
        return error_response(SandboxError::InvalidArgument("missing file".to_string()));
    };

    if unzip {
        let dir = std::path::PathBuf::from(&target_path);
        let result = tokio::task::spawn_blocking(move || crate::unpack::unzip_into(&bytes, &dir)).await;
        match result {
            Ok(Ok(())) => StatusCode::OK.into_response(),
            Ok(Err(e)) => error_response(e),
            Err(e) => error_response(SandboxError::Internal(anyhow::anyhow!("extraction task panicked: {e}"))),
        }
    } else {
        match write_atomically(&target_path, &bytes).await {
            Ok(()) => StatusCode::OK.into_response(),
            Err(e) => error_response(e),
        }
    }
}

/// Writes to `<target>.part` then renames over `target`, so a crash or a
/// concurrent reader never observes a half-written upload.
async fn write_atomically(target_path: &str, bytes: &[u8]) -> std::result::Result<(), SandboxError> {
    if let Some(parent) = Path::new(target_path).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create parent dirs: {e}")))?;
    }
    let part_path = format!("{target_path}.part");
    tokio::fs::write(&part_path, bytes)
        .await
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to write {part_path}: {e}")))?;
    tokio::fs::rename(&part_path, target_path)
        .await
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to finalize upload {target_path}: {e}")))
}

pub async fn healthz() -> Response {
    StatusCode::OK.into_response()
}

pub async fn env_dispatch(
    State(state): State<Arc<AgentState>>,
    AxumPath(op): AxumPath<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    match state.env_rpc(&op, body).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(e),
    }
}
