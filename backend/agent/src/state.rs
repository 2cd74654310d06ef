use std::process::Stdio;
use std::time::Duration;

use rockhold_core::{Result, SandboxError};

use crate::env::EnvRegistry;
use crate::shell::SessionTable;

pub struct AgentState {
    pub sessions: SessionTable,
    env_registry: EnvRegistry,
}

impl AgentState {
    pub fn new() -> Self {
        Self { sessions: SessionTable::new(), env_registry: EnvRegistry::new() }
    }

    /// Session-less one-shot execution: a fresh `sh -c` per call, no state
    /// carried between invocations.
    pub async fn run_ephemeral(&self, command: &str, timeout: Duration) -> Result<String> {
        let child = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(format!("{command} 2>&1"))
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            Ok(Err(e)) => Err(SandboxError::Internal(anyhow::anyhow!("failed to spawn command: {e}"))),
            Err(_) => Err(SandboxError::Timeout(format!("command timed out after {timeout:?}"))),
        }
    }

    pub async fn env_rpc(&self, op: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.env_registry.dispatch(op, body).await
    }
}
