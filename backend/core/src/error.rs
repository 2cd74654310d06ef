use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The envelope carried by a `TRANSFER` error: an exception that originated
/// inside a sandbox container and crossed the HTTP boundary as an 511 response.
///
/// `remote_class_path` is diagnostic only — nothing on this side resolves it
/// by reflection the way the source system did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferEnvelope {
    pub remote_class_path: String,
    pub message: String,
    pub traceback: String,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Top-level error type for the sandbox orchestration control plane.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("sandbox not ready: {0}")]
    NotReady(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("session gone: {0}")]
    SessionGone(String),

    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("exception transferred from sandbox: {}", .0.message)]
    Transfer(TransferEnvelope),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SandboxError {
    /// The surface-visible kind name, independent of the message text.
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::InvalidArgument(_) => "INVALID_ARGUMENT",
            SandboxError::NotFound(_) => "NOT_FOUND",
            SandboxError::NotReady(_) => "NOT_READY",
            SandboxError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            SandboxError::Timeout(_) => "TIMEOUT",
            SandboxError::SessionGone(_) => "SESSION_GONE",
            SandboxError::LaunchFailed(_) => "LAUNCH_FAILED",
            SandboxError::Transfer(_) => "TRANSFER",
            SandboxError::Internal(_) => "INTERNAL",
        }
    }

    /// The HTTP status code this error kind maps to at the control plane edge.
    pub fn http_status(&self) -> u16 {
        match self {
            SandboxError::InvalidArgument(_) => 400,
            SandboxError::NotFound(_) => 404,
            SandboxError::NotReady(_) => 409,
            SandboxError::ResourceExhausted(_) => 429,
            SandboxError::Timeout(_) => 504,
            SandboxError::SessionGone(_) => 410,
            SandboxError::LaunchFailed(_) => 502,
            SandboxError::Transfer(_) => 511,
            SandboxError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
