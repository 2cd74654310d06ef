//! Client-side error type, grounded on `remote_sandbox.py`'s
//! `_handle_response_errors`/`_handle_transfer_exception`: a 511 response
//! carries a `rockletexception` envelope raised from inside the sandbox, any
//! other non-2xx is a plain HTTP failure, and a never-alive sandbox times out.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteException {
    pub class_path: String,
    pub message: String,
    pub traceback: String,
    #[serde(default)]
    pub extra_info: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("exception transferred from sandbox ({class_path}): {message}", class_path = .0.class_path, message = .0.message)]
    Transfer(RemoteException),

    #[error("control plane returned {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("sandbox did not become alive within {0:?}")]
    NotAliveTimeout(std::time::Duration),

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Inspects a response for the `511` transfer envelope or any other
/// non-success status, returning `Ok(response)` unchanged otherwise. No
/// reflection-based exception reconstruction is attempted on this side --
/// the envelope is surfaced as data (`ClientError::Transfer`), matching the
/// "no reflection-based dispatch" decision recorded for the control plane.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if response.status().as_u16() == 511 {
        let body: serde_json::Value = response.json().await?;
        let envelope: RemoteException = serde_json::from_value(
            body.get("rockletexception").cloned().unwrap_or(serde_json::Value::Null),
        )
        .unwrap_or(RemoteException {
            class_path: "Unknown".to_string(),
            message: "malformed transfer envelope".to_string(),
            traceback: String::new(),
            extra_info: HashMap::new(),
        });
        return Err(ClientError::Transfer(envelope));
    }
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        return Err(ClientError::Http { status, detail });
    }
    Ok(response)
}
