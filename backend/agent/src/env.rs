//! Generic `env_make/step/reset/close/list` RPCs. The control plane treats
//! these as opaque and forwards them verbatim; on this side each env
//! instance is just a named shell session, so `step` is "run this action as
//! a command" and `reset` is "throw the session away and start a clean one".
//! Callers that need a real gym-style environment run their own harness
//! through `env_make`'s `init_command` and drive it with `step`.

use std::time::Duration;

use rockhold_core::{Result, SandboxError};
use serde_json::{json, Value};

use crate::shell::SessionTable;

const ENV_SESSION_PREFIX: &str = "env:";
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

fn session_name(env_id: &str) -> String {
    format!("{ENV_SESSION_PREFIX}{env_id}")
}

pub struct EnvRegistry {
    sessions: SessionTable,
}

impl EnvRegistry {
    pub fn new() -> Self {
        Self { sessions: SessionTable::new() }
    }

    pub async fn dispatch(&self, op: &str, body: Value) -> Result<Value> {
        match op {
            "make" => self.make(body).await,
            "step" => self.step(body).await,
            "reset" => self.reset(body).await,
            "close" => self.close(body).await,
            "list" => self.list().await,
            other => Err(SandboxError::InvalidArgument(format!("unknown env op: {other}"))),
        }
    }

    async fn make(&self, body: Value) -> Result<Value> {
        let env_id = require_str(&body, "env_id")?;
        self.sessions.create(&session_name(&env_id)).await?;

        let init_command = body.get("config").and_then(|c| c.get("init_command")).and_then(|v| v.as_str());
        let observation = if let Some(command) = init_command {
            let session = self.sessions.get(&session_name(&env_id)).await.expect("just created");
            let (output, _) = session.run(command, DEFAULT_STEP_TIMEOUT).await?;
            output
        } else {
            String::new()
        };

        Ok(json!({ "env_id": env_id, "observation": observation }))
    }

    async fn step(&self, body: Value) -> Result<Value> {
        let env_id = require_str(&body, "env_id")?;
        let session = self
            .sessions
            .get(&session_name(&env_id))
            .await
            .ok_or_else(|| SandboxError::NotFound(format!("env {env_id} not found")))?;

        let action = body
            .get("action")
            .and_then(|a| a.as_str().map(|s| s.to_string()).or_else(|| a.get("command").and_then(|c| c.as_str()).map(|s| s.to_string())))
            .ok_or_else(|| SandboxError::InvalidArgument("missing action".to_string()))?;

        let (output, exit_code) = session.run(&action, DEFAULT_STEP_TIMEOUT).await?;
        Ok(json!({ "observation": output, "exit_code": exit_code, "done": false }))
    }

    async fn reset(&self, body: Value) -> Result<Value> {
        let env_id = require_str(&body, "env_id")?;
        self.sessions.close(&session_name(&env_id)).await;
        self.sessions.create(&session_name(&env_id)).await?;
        Ok(json!({ "env_id": env_id, "observation": "" }))
    }

    async fn close(&self, body: Value) -> Result<Value> {
        let env_id = require_str(&body, "env_id")?;
        self.sessions.close(&session_name(&env_id)).await;
        Ok(json!({ "env_id": env_id, "closed": true }))
    }

    async fn list(&self) -> Result<Value> {
        let names = self.sessions.names().await;
        let ids: Vec<&str> = names
            .iter()
            .filter_map(|n| n.strip_prefix(ENV_SESSION_PREFIX))
            .collect();
        Ok(json!({ "envs": ids }))
    }
}

fn require_str(body: &Value, field: &str) -> Result<String> {
    body.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| SandboxError::InvalidArgument(format!("missing {field}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn make_then_step_runs_the_action_in_the_same_session() {
        let registry = EnvRegistry::new();
        registry.make(json!({ "env_id": "e1" })).await.unwrap();
        registry.step(json!({ "env_id": "e1", "action": "cd /tmp" })).await.unwrap();
        let result = registry.step(json!({ "env_id": "e1", "action": "pwd" })).await.unwrap();
        assert_eq!(result["observation"].as_str().unwrap().trim(), "/tmp");
    }

    #[tokio::test]
    async fn step_on_unknown_env_is_not_found() {
        let registry = EnvRegistry::new();
        let err = registry.step(json!({ "env_id": "missing", "action": "echo hi" })).await.unwrap_err();
        assert!(matches!(err, SandboxError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_reports_active_env_ids() {
        let registry = EnvRegistry::new();
        registry.make(json!({ "env_id": "a" })).await.unwrap();
        registry.make(json!({ "env_id": "b" })).await.unwrap();
        let result = registry.list().await.unwrap();
        let mut ids: Vec<&str> = result["envs"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn close_removes_the_env_from_the_list() {
        let registry = EnvRegistry::new();
        registry.make(json!({ "env_id": "a" })).await.unwrap();
        registry.close(json!({ "env_id": "a" })).await.unwrap();
        let result = registry.list().await.unwrap();
        assert!(result["envs"].as_array().unwrap().is_empty());
    }
}
