//! `SandboxActor`: the control-plane-side typed remote handle to one
//! sandbox's in-container HTTP agent. Owns the deployment driver call that
//! brought the container up, the session table, the detached-process table,
//! and the bring-up state machine (`INIT → STARTING → READY → STOPPING →
//! STOPPED`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rockhold_core::{
    ActorState, DeploymentDriver, DeploymentSpec, PhaseState, PortMapping, ProcessState, Result,
    SandboxError, SandboxStatistics, ServiceStatus, PHASE_DOCKER_RUN, PHASE_IMAGE_PULL,
};
use tokio::sync::RwLock;
use tracing::info;

use crate::docker::AGENT_INTERNAL_PORT;
use crate::nohup::{self, CommandChannel, NohupResult, OutputMode};
use crate::session::SessionTable;
use crate::status;

struct ProcessEntry {
    tmp_file: String,
    state: ProcessState,
    started_at: Instant,
}

pub struct SandboxActor {
    pub id: String,
    pub spec: DeploymentSpec,
    driver: Arc<dyn DeploymentDriver>,
    http: reqwest::Client,
    base_url: RwLock<Option<String>>,
    state: RwLock<ActorState>,
    sessions: SessionTable,
    processes: RwLock<HashMap<u64, ProcessEntry>>,
    status: RwLock<ServiceStatus>,
    status_dir: PathBuf,
    ready_at: RwLock<Option<Instant>>,
}

impl SandboxActor {
    pub fn new(id: String, spec: DeploymentSpec, driver: Arc<dyn DeploymentDriver>, status_dir: impl AsRef<Path>) -> Self {
        Self {
            id,
            spec,
            driver,
            http: reqwest::Client::new(),
            base_url: RwLock::new(None),
            state: RwLock::new(ActorState::Init),
            sessions: SessionTable::new(),
            processes: RwLock::new(HashMap::new()),
            status: RwLock::new(ServiceStatus::default()),
            status_dir: status_dir.as_ref().to_path_buf(),
            ready_at: RwLock::new(None),
        }
    }

    pub async fn actor_state(&self) -> ActorState {
        *self.state.read().await
    }

    pub async fn port_mapping(&self) -> PortMapping {
        self.status.read().await.port_mapping.clone()
    }

    pub async fn status_snapshot(&self) -> ServiceStatus {
        self.status.read().await.clone()
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.status.read().await.clone();
        status::write_status(&self.status_dir, &self.id, &snapshot).await
    }

    async fn set_phase(&self, name: &str, phase_state: PhaseState, message: impl Into<String>) -> Result<()> {
        self.status.write().await.set_phase(name, phase_state, message);
        self.persist().await
    }

    /// Brings the container up and waits for the in-container agent to
    /// answer `is_alive` before declaring the actor `READY`.
    pub async fn start(&self, startup_timeout: Duration) -> Result<PortMapping> {
        *self.state.write().await = ActorState::Starting;
        self.set_phase(PHASE_IMAGE_PULL, PhaseState::Running, "").await?;

        let mapping = match self.driver.start(&self.id, &self.spec).await {
            Ok(mapping) => mapping,
            Err(e) => {
                self.set_phase(PHASE_IMAGE_PULL, PhaseState::Failed, e.to_string()).await?;
                *self.state.write().await = ActorState::Stopped;
                return Err(e);
            }
        };
        self.set_phase(PHASE_IMAGE_PULL, PhaseState::Success, "").await?;
        self.set_phase(PHASE_DOCKER_RUN, PhaseState::Running, "").await?;

        self.status.write().await.port_mapping = mapping.clone();
        let host_port = mapping.get(&AGENT_INTERNAL_PORT).copied().ok_or_else(|| {
            SandboxError::LaunchFailed("no host port bound for agent port".to_string())
        })?;
        *self.base_url.write().await = Some(format!("http://127.0.0.1:{host_port}"));

        let deadline = Instant::now() + startup_timeout;
        loop {
            let (alive, message) = self.probe_alive().await;
            if alive {
                break;
            }
            if Instant::now() >= deadline {
                self.set_phase(PHASE_DOCKER_RUN, PhaseState::Failed, message.clone()).await?;
                self.driver.stop(&self.id).await.ok();
                *self.state.write().await = ActorState::Stopped;
                return Err(SandboxError::Timeout(format!(
                    "sandbox {} did not become alive within {startup_timeout:?}: {message}",
                    self.id
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        self.set_phase(PHASE_DOCKER_RUN, PhaseState::Success, "").await?;
        *self.ready_at.write().await = Some(Instant::now());
        *self.state.write().await = ActorState::Ready;
        info!(sandbox_id = %self.id, "sandbox actor ready");
        Ok(mapping)
    }

    pub async fn stop(&self) -> Result<()> {
        *self.state.write().await = ActorState::Stopping;
        self.driver.stop(&self.id).await?;
        status::delete_status(&self.status_dir, &self.id).await?;
        *self.state.write().await = ActorState::Stopped;
        Ok(())
    }

    fn ensure_ready_sync(state: ActorState, id: &str) -> Result<()> {
        if state != ActorState::Ready {
            return Err(SandboxError::NotReady(format!("sandbox {id} is {state:?}")));
        }
        Ok(())
    }

    async fn ensure_ready(&self) -> Result<()> {
        Self::ensure_ready_sync(*self.state.read().await, &self.id)
    }

    async fn base_url(&self) -> Result<String> {
        self.base_url
            .read()
            .await
            .clone()
            .ok_or_else(|| SandboxError::NotReady(format!("sandbox {} has no agent endpoint yet", self.id)))
    }

    /// Single HTTP round trip to the in-container agent, bypassing the
    /// session lock — callers that need FIFO ordering go through
    /// `run_in_session`/`SessionTable::with_session` instead.
    async fn raw_submit(&self, session: &str, command: &str, timeout: Duration) -> Result<String> {
        let url = format!("{}/session/{session}/run", self.base_url().await?);
        let body = serde_json::json!({ "command": command });
        let request = self.http.post(&url).json(&body).send();

        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) if response.status().is_success() => response
                .text()
                .await
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to read agent response: {e}"))),
            Ok(Ok(response)) if response.status().as_u16() == 410 => {
                Err(SandboxError::SessionGone(session.to_string()))
            }
            Ok(Ok(response)) => Err(SandboxError::Internal(anyhow::anyhow!(
                "agent returned {} for session {session}",
                response.status()
            ))),
            Ok(Err(e)) => Err(SandboxError::Internal(anyhow::anyhow!("agent request failed: {e}"))),
            Err(_) => Err(SandboxError::Timeout(format!("session {session} command timed out"))),
        }
    }

    pub async fn create_session(&self, name: &str, env: HashMap<String, String>) -> Result<()> {
        self.ensure_ready().await?;
        self.sessions.create(name).await?;
        let url = format!("{}/session/{name}/create", self.base_url().await?);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "env": env }))
            .send()
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("create_session failed: {e}")))?;
        if !response.status().is_success() {
            return Err(agent_error_from_response(response).await);
        }
        Ok(())
    }

    pub async fn close_session(&self, name: &str) -> Result<()> {
        self.ensure_ready().await?;
        self.sessions.close(name).await?;
        let url = format!("{}/session/{name}/close", self.base_url().await?);
        let _ = self.http.post(&url).send().await;
        Ok(())
    }

    pub async fn run_in_session(&self, name: &str, command: &str, timeout: Duration) -> Result<String> {
        self.ensure_ready().await?;
        self.sessions
            .with_session(name, || self.raw_submit(name, command, timeout))
            .await
    }

    pub async fn execute(&self, command: &str, timeout: Duration) -> Result<String> {
        self.ensure_ready().await?;
        let url = format!("{}/execute", self.base_url().await?);
        let body = serde_json::json!({ "command": command });
        match tokio::time::timeout(timeout, self.http.post(&url).json(&body).send()).await {
            Ok(Ok(response)) => {
                if !response.status().is_success() {
                    return Err(agent_error_from_response(response).await);
                }
                response
                    .text()
                    .await
                    .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to read execute response: {e}")))
            }
            Ok(Err(e)) => Err(SandboxError::Internal(anyhow::anyhow!("execute request failed: {e}"))),
            Err(_) => Err(SandboxError::Timeout("execute timed out".to_string())),
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        self.ensure_ready().await?;
        let url = format!("{}/file?path={}", self.base_url().await?, urlencoding_path(path));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("read_file failed: {e}")))?;
        if !response.status().is_success() {
            return Err(agent_error_from_response(response).await);
        }
        response
            .text()
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("read_file body failed: {e}")))
    }

    pub async fn read_file_by_line_range(&self, path: &str, start_line: usize, end_line: usize) -> Result<String> {
        let content = self.read_file(path).await?;
        let lines: Vec<&str> = content.lines().collect();
        let start = start_line.saturating_sub(1).min(lines.len());
        let end = end_line.min(lines.len());
        Ok(lines[start..end].join("\n"))
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.ensure_ready().await?;
        let url = format!("{}/file", self.base_url().await?);
        let body = serde_json::json!({ "path": path, "content": content });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("write_file failed: {e}")))?;
        if !response.status().is_success() {
            return Err(SandboxError::Internal(anyhow::anyhow!(
                "write_file returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Uploads `source_path` to `target_path` inside the sandbox. Directories
    /// are archived to a temp zip first and streamed with `unzip=true`.
    pub async fn upload(&self, source_path: &Path, target_path: &str) -> Result<()> {
        self.ensure_ready().await?;
        let metadata = tokio::fs::metadata(source_path)
            .await
            .map_err(|e| SandboxError::InvalidArgument(format!("upload source not found: {e}")))?;

        let (bytes, unzip) = if metadata.is_dir() {
            (zip_directory(source_path)?, true)
        } else {
            let data = tokio::fs::read(source_path)
                .await
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to read upload source: {e}")))?;
            (data, false)
        };

        let url = format!("{}/upload", self.base_url().await?);
        let part = reqwest::multipart::Part::bytes(bytes).file_name("upload.bin");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("target_path", target_path.to_string())
            .text("unzip", unzip.to_string());

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("upload failed: {e}")))?;
        if !response.status().is_success() {
            return Err(SandboxError::Internal(anyhow::anyhow!("upload returned {}", response.status())));
        }
        Ok(())
    }

    pub async fn probe_alive(&self) -> (bool, String) {
        let Some(base) = self.base_url.read().await.clone() else {
            return (false, "sandbox has no agent endpoint yet".to_string());
        };
        match self.http.get(format!("{base}/healthz")).send().await {
            Ok(response) if response.status().is_success() => (true, "ok".to_string()),
            Ok(response) => (false, format!("agent returned {}", response.status())),
            Err(e) => (false, e.to_string()),
        }
    }

    pub async fn get_statistics(&self) -> SandboxStatistics {
        let names = self.sessions.names().await;
        let mut live = 0usize;
        let mut dead = 0usize;
        for name in &names {
            match self.sessions.state(name).await {
                Some(rockhold_core::SessionState::Alive) => live += 1,
                Some(rockhold_core::SessionState::Dead) => dead += 1,
                None => {}
            }
        }

        let processes = self.processes.read().await;
        let tracked = processes.len();
        let running = processes.values().filter(|p| p.state == ProcessState::Running).count();

        let uptime = self
            .ready_at
            .read()
            .await
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);

        SandboxStatistics {
            live_sessions: live,
            dead_sessions: dead,
            tracked_processes: tracked,
            running_processes: running,
            uptime_seconds: uptime,
        }
    }

    /// Launches a detached command inside `session`, polls it to completion
    /// (or `poll_timeout`), then collects its output per `mode`.
    pub async fn arun_nohup(
        &self,
        session: &str,
        command: &str,
        mode: OutputMode,
        submit_timeout: Duration,
        poll_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<NohupResult> {
        self.ensure_ready().await?;
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        let channel = ActorChannel { actor: self, session };
        let outcome = self
            .sessions
            .with_session(session, || {
                nohup::start_nohup_process(&channel, command, submit_timeout, now_nanos)
            })
            .await?;

        let handle = match outcome {
            nohup::NohupLaunchOutcome::Started(handle) => handle,
            nohup::NohupLaunchOutcome::Failed(result) => return Ok(result),
        };

        self.processes.write().await.insert(
            handle.pid,
            ProcessEntry { tmp_file: handle.tmp_file.clone(), state: ProcessState::Running, started_at: handle.started_at },
        );

        let channel = ActorChannel { actor: self, session };
        let (success, wait_message) =
            nohup::wait_for_process_completion(&channel, handle.pid, poll_timeout, poll_interval).await;

        if let Some(entry) = self.processes.write().await.get_mut(&handle.pid) {
            entry.state = if success { ProcessState::Exited } else { ProcessState::TimedOut };
        }

        let collected = nohup::handle_nohup_output(&channel, &handle.tmp_file, mode, submit_timeout).await?;

        if !success {
            let output = format!("{wait_message}\n{collected}");
            return Ok(NohupResult { exit_code: 1, output, failure_reason: Some(wait_message) });
        }

        Ok(NohupResult { exit_code: 0, output: collected, failure_reason: None })
    }

    pub async fn check_pid_exists(&self, session: &str, pid: u64, timeout: Duration) -> Result<bool> {
        let channel = ActorChannel { actor: self, session };
        let out = channel.submit(&format!("kill -0 {pid} >/dev/null 2>&1; echo $?"), timeout).await?;
        Ok(out.trim() == "0")
    }

    /// Forwards generic environment RPCs verbatim to the in-container agent.
    pub async fn env_rpc(&self, op: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.ensure_ready().await?;
        let url = format!("{}/env/{op}", self.base_url().await?);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("env_{op} failed: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("env_{op} response decode failed: {e}")))
    }
}

struct ActorChannel<'a> {
    actor: &'a SandboxActor,
    session: &'a str,
}

#[async_trait]
impl<'a> CommandChannel for ActorChannel<'a> {
    async fn submit(&self, command: &str, timeout: Duration) -> Result<String> {
        self.actor.raw_submit(self.session, command, timeout).await
    }
}

/// Maps a non-2xx response from the in-container agent back to the
/// `SandboxError` variant whose `http_status()` the agent's own
/// `error_response` helper derived it from.
async fn agent_error_from_response(response: reqwest::Response) -> SandboxError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match status {
        400 => SandboxError::InvalidArgument(body),
        404 => SandboxError::NotFound(body),
        409 => SandboxError::NotReady(body),
        410 => SandboxError::SessionGone(body),
        429 => SandboxError::ResourceExhausted(body),
        502 => SandboxError::LaunchFailed(body),
        504 => SandboxError::Timeout(body),
        _ => SandboxError::Internal(anyhow::anyhow!("agent returned {status}: {body}")),
    }
}

fn zip_directory(dir: &Path) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::FileOptions::default();
        for entry in walk_files(dir)? {
            let relative = entry
                .strip_prefix(dir)
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("bad relative path: {e}")))?;
            writer
                .start_file(relative.to_string_lossy().to_string(), options)
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("zip start_file failed: {e}")))?;
            let data = std::fs::read(&entry)
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to read {}: {e}", entry.display())))?;
            std::io::Write::write_all(&mut writer, &data)
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("zip write failed: {e}")))?;
        }
        writer
            .finish()
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("zip finish failed: {e}")))?;
    }
    Ok(buffer.into_inner())
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to read dir {}: {e}", current.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| SandboxError::Internal(anyhow::anyhow!("dir entry failed: {e}")))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    Ok(files)
}

fn urlencoding_path(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_') { c.to_string() } else { format!("%{:02X}", c as u32) })
        .collect()
}
