use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One of the two reserved bring-up phases, or an additional driver-specific one.
pub const PHASE_IMAGE_PULL: &str = "image_pull";
pub const PHASE_DOCKER_RUN: &str = "docker_run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    Waiting,
    Running,
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub status: PhaseState,
    #[serde(default)]
    pub message: String,
}

impl PhaseStatus {
    pub fn waiting() -> Self {
        Self { status: PhaseState::Waiting, message: String::new() }
    }
}

/// `port_mapping` is container-port → host-port.
pub type PortMapping = HashMap<u16, u16>;

/// The phases + port mapping persisted to `<status_dir>/<sandbox_id>.json`.
/// Mirrors the source's `ServiceStatus`: phases are auto-seeded with
/// `image_pull` and `docker_run` on construction, in that order, and are
/// never reordered afterward — kept as a `Vec<(String, PhaseStatus)>` rather
/// than a plain map so on-disk JSON preserves phase order for readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub phases: Vec<(String, PhaseStatus)>,
    #[serde(default)]
    pub port_mapping: PortMapping,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            phases: vec![
                (PHASE_IMAGE_PULL.to_string(), PhaseStatus::waiting()),
                (PHASE_DOCKER_RUN.to_string(), PhaseStatus::waiting()),
            ],
            port_mapping: PortMapping::new(),
        }
    }
}

impl ServiceStatus {
    pub fn get_phase(&self, name: &str) -> Option<&PhaseStatus> {
        self.phases.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    /// Insert or update a phase, appending new phase names to the end
    /// without ever reordering existing ones.
    pub fn set_phase(&mut self, name: &str, status: PhaseState, message: impl Into<String>) {
        let message = message.into();
        if let Some((_, p)) = self.phases.iter_mut().find(|(n, _)| n == name) {
            p.status = status;
            p.message = message;
        } else {
            self.phases.push((name.to_string(), PhaseStatus { status, message }));
        }
    }

    pub fn all_succeeded(&self) -> bool {
        !self.phases.is_empty() && self.phases.iter().all(|(_, p)| p.status == PhaseState::Success)
    }

    pub fn any_failed(&self) -> bool {
        self.phases.iter().any(|(_, p)| p.status == PhaseState::Failed)
    }
}

/// The resource/image spec a caller supplies to start a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub image: String,
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    /// Raw memory string as supplied by the caller, e.g. `"8g"`. Parsed via
    /// `crate::memory_size::parse_memory_size` before being handed to the
    /// driver.
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_seconds: u64,
}

fn default_cpus() -> f64 {
    1.0
}
fn default_memory() -> String {
    "512m".to_string()
}
fn default_startup_timeout() -> u64 {
    60
}

impl DeploymentSpec {
    /// A stable hash of the fields that determine warmup-pool interchangeability:
    /// image plus resource shape, but not per-request env overrides (those are
    /// applied post hand-off by starting a fresh session, per §4.4).
    pub fn pool_key(&self) -> String {
        use std::fmt::Write as _;
        let memory_bytes = crate::memory_size::parse_memory_size(&self.memory).unwrap_or(0);
        let mut key = String::new();
        let _ = write!(key, "{}|{}|{}", self.image, self.cpus, memory_bytes);
        key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxLifecycle {
    Creating,
    Running,
    Terminating,
    Terminated,
}

/// Actor-side bring-up state machine (§4.2), distinct from the
/// registry-visible `SandboxLifecycle` above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorState {
    Init,
    Starting,
    Ready,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Alive,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Started,
    Running,
    Exited,
    TimedOut,
}

/// Result of a one-shot host-side exec against a container (C1's narrow
/// `exec` surface, used for cluster probes rather than user traffic).
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Response body for `POST /sandbox/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxStartResponse {
    pub sandbox_id: String,
    pub host_name: String,
    pub host_ip: String,
    pub cpus: f64,
    pub memory: String,
}

/// Response body for `GET /sandbox/status`. Carries the supplemental
/// version fields the original's `SandboxStatusResponse` reported; the
/// multi-tenant `user_id`/`experiment_id` fields are dropped (excluded by
/// this document's Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxStatusResponse {
    pub sandbox_id: String,
    pub status: SandboxLifecycle,
    pub phases: Vec<(String, PhaseStatus)>,
    pub port_mapping: PortMapping,
    pub host_name: String,
    pub host_ip: String,
    pub is_alive: bool,
    pub image: String,
    pub gateway_version: String,
    pub sdk_version: String,
    pub cpus: f64,
    pub memory: String,
}

/// `get_statistics` response: counts only, never a full metrics pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxStatistics {
    pub live_sessions: usize,
    pub dead_sessions: usize,
    pub tracked_processes: usize,
    pub running_processes: usize,
    pub uptime_seconds: u64,
}

/// Stable vocabulary for future metrics instrumentation. No exporter is
/// wired to these — see the `metrics emission` Non-goal — they exist so a
/// later observability layer has agreed-upon names rather than inventing
/// its own.
pub mod metric_names {
    pub const SANDBOX_REQUEST_TOTAL: &str = "sandbox_request_total";
    pub const SANDBOX_REQUEST_SUCCESS: &str = "sandbox_request_success";
    pub const SANDBOX_REQUEST_FAILURE: &str = "sandbox_request_failure";
    pub const SANDBOX_REQUEST_RT: &str = "sandbox_request_rt";
    pub const SANDBOX_TOTAL_COUNT: &str = "sandbox_total_count";
    pub const SANDBOX_COUNT_IMAGE: &str = "sandbox_count_image";
    pub const SANDBOX_CPU_RESOURCE: &str = "sandbox_cpu_resource";
    pub const SANDBOX_MEM_RESOURCE: &str = "sandbox_mem_resource";
    pub const SANDBOX_DISK_RESOURCE: &str = "sandbox_disk_resource";
    pub const SANDBOX_NET_RESOURCE: &str = "sandbox_net_resource";
    pub const TOTAL_CPU_RESOURCE: &str = "total_cpu_resource";
    pub const TOTAL_MEM_RESOURCE: &str = "total_mem_resource";
    pub const AVAILABLE_CPU_RESOURCE: &str = "available_cpu_resource";
    pub const AVAILABLE_MEM_RESOURCE: &str = "available_mem_resource";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_seeds_reserved_phases_in_order() {
        let status = ServiceStatus::default();
        assert_eq!(status.phases[0].0, PHASE_IMAGE_PULL);
        assert_eq!(status.phases[1].0, PHASE_DOCKER_RUN);
        assert_eq!(status.phases[0].1.status, PhaseState::Waiting);
    }

    #[test]
    fn set_phase_never_reorders_existing_entries() {
        let mut status = ServiceStatus::default();
        status.set_phase(PHASE_DOCKER_RUN, PhaseState::Success, "ok");
        status.set_phase(PHASE_IMAGE_PULL, PhaseState::Success, "ok");
        status.set_phase("extra_phase", PhaseState::Running, "in progress");
        assert_eq!(status.phases[0].0, PHASE_IMAGE_PULL);
        assert_eq!(status.phases[1].0, PHASE_DOCKER_RUN);
        assert_eq!(status.phases[2].0, "extra_phase");
    }

    #[test]
    fn all_succeeded_requires_every_phase_success() {
        let mut status = ServiceStatus::default();
        assert!(!status.all_succeeded());
        status.set_phase(PHASE_IMAGE_PULL, PhaseState::Success, "");
        assert!(!status.all_succeeded());
        status.set_phase(PHASE_DOCKER_RUN, PhaseState::Success, "");
        assert!(status.all_succeeded());
    }
}
