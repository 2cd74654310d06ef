//! Shared application state for the control plane HTTP service.

use std::path::PathBuf;
use std::sync::Arc;

use rockhold_core::DeploymentDriver;
use rockhold_sandbox::SandboxRegistry;
use rockhold_warmup::WarmupPool;

/// Which half of the dual-role API this process is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRole {
    /// Accepts mutating endpoints (`start`, `stop`, `run_in_session`, ...).
    Write,
    /// Status-only: answers strictly from the persisted status JSON,
    /// never holds actor handles.
    Read,
}

#[derive(Clone)]
pub struct GatewayState {
    pub role: GatewayRole,
    pub registry: Arc<SandboxRegistry>,
    pub driver: Arc<dyn DeploymentDriver>,
    pub warmup: Arc<WarmupPool>,
    pub status_dir: PathBuf,
}

impl GatewayState {
    pub fn is_write(&self) -> bool {
        self.role == GatewayRole::Write
    }
}
