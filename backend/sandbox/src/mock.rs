//! In-memory `DeploymentDriver` for tests that don't need a live Docker
//! daemon: C2/C3/C4/C5 can be exercised against this instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rockhold_core::{DeploymentDriver, DeploymentSpec, ExecResult, PortMapping, Result, SandboxError};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MockDeploymentDriver {
    started: Arc<Mutex<HashMap<String, PortMapping>>>,
    next_port: Arc<Mutex<u16>>,
    exec_responses: Arc<Mutex<Vec<ExecResult>>>,
}

impl MockDeploymentDriver {
    pub fn new() -> Self {
        Self {
            started: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(Mutex::new(30000)),
            exec_responses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_exec_responses(responses: Vec<ExecResult>) -> Self {
        let driver = Self::new();
        *driver.exec_responses.blocking_lock() = responses;
        driver
    }

    pub async fn is_started(&self, id: &str) -> bool {
        self.started.lock().await.contains_key(id)
    }
}

#[async_trait]
impl DeploymentDriver for MockDeploymentDriver {
    async fn start(&self, id: &str, _spec: &DeploymentSpec) -> Result<PortMapping> {
        let mut next_port = self.next_port.lock().await;
        let host_port = *next_port;
        *next_port += 1;

        let mut mapping = PortMapping::new();
        mapping.insert(crate::docker::AGENT_INTERNAL_PORT, host_port);
        self.started.lock().await.insert(id.to_string(), mapping.clone());
        Ok(mapping)
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.started.lock().await.remove(id);
        Ok(())
    }

    async fn exec(&self, id: &str, _cmd: &str) -> Result<ExecResult> {
        if !self.started.lock().await.contains_key(id) {
            return Err(SandboxError::NotFound(format!("sandbox {id} not started")));
        }
        let mut responses = self.exec_responses.lock().await;
        if responses.is_empty() {
            Ok(ExecResult { exit_code: 0, stdout: String::new(), stderr: String::new(), timed_out: false })
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}
