//! Thin remote driver for the control plane's HTTP surface, grounded on
//! `remote_sandbox.py`'s `RemoteSandboxRuntime`: one small `_request` helper
//! plus one typed method per endpoint, executed over the sandbox routes
//! nested at `/apis/envs/sandbox/v1`.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use rockhold_core::{SandboxStartResponse, SandboxStatistics, SandboxStatusResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{check_response, ClientError};

const BASE_PATH: &str = "/apis/envs/sandbox/v1";

#[derive(Debug, Clone)]
pub struct RockholdClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct Observation {
    pub output: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandResponse {
    pub output: String,
}

#[derive(Debug, Deserialize)]
pub struct FileContent {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct NohupResult {
    pub exit_code: i32,
    pub output: String,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub cpus: Option<f64>,
    pub memory: Option<String>,
    pub env: HashMap<String, String>,
    pub startup_timeout: Option<u64>,
}

impl RockholdClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.starts_with("http") {
            tracing::warn!(%base_url, "base url does not start with http, adding http://");
            base_url = format!("http://{base_url}");
        }
        Self { base_url, http: reqwest::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, BASE_PATH, path)
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    async fn get_json<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, ClientError> {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    pub async fn start(&self, image: &str, opts: StartOptions) -> Result<SandboxStartResponse, ClientError> {
        self.post_json(
            "/sandbox/start",
            &json!({
                "image": image,
                "cpus": opts.cpus,
                "memory": opts.memory,
                "env": opts.env,
                "startup_timeout": opts.startup_timeout,
            }),
        )
        .await
    }

    pub async fn stop(&self, sandbox_id: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self.post_json("/sandbox/stop", &json!({ "sandbox_id": sandbox_id })).await?;
        Ok(())
    }

    pub async fn status(&self, sandbox_id: &str) -> Result<SandboxStatusResponse, ClientError> {
        self.get_json("/sandbox/status", &[("sandbox_id", sandbox_id)]).await
    }

    /// Single liveness probe. Network failures and non-transfer errors are
    /// swallowed into `false`, matching `_is_alive`'s "internal errors are
    /// thrown, everything else just returns False" contract -- only the
    /// transfer-envelope case propagates as an error.
    pub async fn is_alive(&self, sandbox_id: &str) -> Result<bool, ClientError> {
        match self.status(sandbox_id).await {
            Ok(status) => Ok(status.is_alive),
            Err(ClientError::Transfer(envelope)) => Err(ClientError::Transfer(envelope)),
            Err(_) => Ok(false),
        }
    }

    /// Polls `is_alive` until it returns true or `timeout` elapses, grounded
    /// on `wait_until_alive`'s loop-with-sleep shape in the source's http
    /// utilities.
    pub async fn wait_until_alive(
        &self,
        sandbox_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_alive(sandbox_id).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ClientError::NotAliveTimeout(timeout));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn create_session(&self, sandbox_id: &str, session: &str) -> Result<(), ClientError> {
        self.create_session_with_env(sandbox_id, session, HashMap::new()).await
    }

    pub async fn create_session_with_env(
        &self,
        sandbox_id: &str,
        session: &str,
        env: HashMap<String, String>,
    ) -> Result<(), ClientError> {
        let env_enable = !env.is_empty();
        let _: serde_json::Value = self
            .post_json(
                "/sandbox/create_session",
                &json!({ "sandbox_id": sandbox_id, "session": session, "env_enable": env_enable, "env": env }),
            )
            .await?;
        Ok(())
    }

    pub async fn close_session(&self, sandbox_id: &str, session: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .post_json("/sandbox/close_session", &json!({ "sandbox_id": sandbox_id, "session": session }))
            .await?;
        Ok(())
    }

    pub async fn run_in_session(
        &self,
        sandbox_id: &str,
        session: &str,
        command: &str,
        timeout_secs: u64,
    ) -> Result<Observation, ClientError> {
        self.post_json(
            "/sandbox/run_in_session",
            &json!({ "sandbox_id": sandbox_id, "session": session, "command": command, "timeout": timeout_secs }),
        )
        .await
    }

    pub async fn execute(
        &self,
        sandbox_id: &str,
        command: &str,
        timeout_secs: u64,
    ) -> Result<CommandResponse, ClientError> {
        self.post_json(
            "/sandbox/execute",
            &json!({ "sandbox_id": sandbox_id, "command": command, "timeout": timeout_secs }),
        )
        .await
    }

    pub async fn read_file(&self, sandbox_id: &str, path: &str) -> Result<FileContent, ClientError> {
        self.post_json("/sandbox/read_file", &json!({ "sandbox_id": sandbox_id, "path": path })).await
    }

    pub async fn read_file_range(
        &self,
        sandbox_id: &str,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<FileContent, ClientError> {
        self.post_json(
            "/sandbox/read_file",
            &json!({ "sandbox_id": sandbox_id, "path": path, "start_line": start_line, "end_line": end_line }),
        )
        .await
    }

    pub async fn write_file(&self, sandbox_id: &str, path: &str, content: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .post_json("/sandbox/write_file", &json!({ "sandbox_id": sandbox_id, "path": path, "content": content }))
            .await?;
        Ok(())
    }

    /// Uploads a file or directory, grounded on `upload`'s zip-a-directory
    /// branch: a regular file is sent as-is, a directory is archived to a
    /// temp zip first.
    pub async fn upload(&self, sandbox_id: &str, source_path: &Path, target_path: &str) -> Result<(), ClientError> {
        let metadata = tokio::fs::metadata(source_path).await?;
        let bytes = if metadata.is_dir() {
            let dir = source_path.to_path_buf();
            tokio::task::spawn_blocking(move || zip_directory(&dir))
                .await
                .map_err(|e| ClientError::Http { status: 0, detail: format!("zip task panicked: {e}") })??
        } else {
            tokio::fs::read(source_path).await?
        };

        let part = reqwest::multipart::Part::bytes(bytes).file_name("upload.bin");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("sandbox_id", sandbox_id.to_string())
            .text("target_path", target_path.to_string());

        let response = self.http.post(self.url("/sandbox/upload")).multipart(form).send().await?;
        check_response(response).await?;
        Ok(())
    }

    pub async fn get_statistics(&self, sandbox_id: &str) -> Result<SandboxStatistics, ClientError> {
        self.get_json("/sandbox/statistics", &[("sandbox_id", sandbox_id)]).await
    }

    pub async fn check_pid_exists(&self, sandbox_id: &str, session: &str, pid: u64) -> Result<bool, ClientError> {
        let body: serde_json::Value = self
            .post_json("/sandbox/check_pid", &json!({ "sandbox_id": sandbox_id, "session": session, "pid": pid }))
            .await?;
        Ok(body.get("exists").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub async fn arun_nohup(
        &self,
        sandbox_id: &str,
        session: &str,
        command: &str,
        ignore_output: bool,
        response_limited_bytes: Option<usize>,
    ) -> Result<NohupResult, ClientError> {
        self.post_json(
            "/sandbox/arun_nohup",
            &json!({
                "sandbox_id": sandbox_id,
                "session": session,
                "command": command,
                "ignore_output": ignore_output,
                "response_limited_bytes": response_limited_bytes,
            }),
        )
        .await
    }

    async fn env_rpc(&self, op: &str, sandbox_id: &str, extra: serde_json::Value) -> Result<serde_json::Value, ClientError> {
        let mut body = extra;
        if let serde_json::Value::Object(map) = &mut body {
            map.insert("sandbox_id".to_string(), json!(sandbox_id));
        }
        self.post_json(&format!("/env/{op}"), &body).await
    }

    pub async fn env_make(&self, sandbox_id: &str, env_id: &str, config: serde_json::Value) -> Result<serde_json::Value, ClientError> {
        self.env_rpc("make", sandbox_id, json!({ "env_id": env_id, "config": config })).await
    }

    pub async fn env_step(&self, sandbox_id: &str, env_id: &str, action: serde_json::Value) -> Result<serde_json::Value, ClientError> {
        self.env_rpc("step", sandbox_id, json!({ "env_id": env_id, "action": action })).await
    }

    pub async fn env_reset(&self, sandbox_id: &str, env_id: &str) -> Result<serde_json::Value, ClientError> {
        self.env_rpc("reset", sandbox_id, json!({ "env_id": env_id })).await
    }

    pub async fn env_close(&self, sandbox_id: &str, env_id: &str) -> Result<serde_json::Value, ClientError> {
        self.env_rpc("close", sandbox_id, json!({ "env_id": env_id })).await
    }

    pub async fn env_list(&self, sandbox_id: &str) -> Result<serde_json::Value, ClientError> {
        self.env_rpc("list", sandbox_id, json!({})).await
    }
}

fn zip_directory(dir: &Path) -> Result<Vec<u8>, ClientError> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::FileOptions::default();
        for entry in walk_files(dir)? {
            let relative = entry.strip_prefix(dir).expect("walked entry under dir");
            writer
                .start_file(relative.to_string_lossy().to_string(), options)
                .map_err(|e| ClientError::Http { status: 0, detail: format!("zip start_file failed: {e}") })?;
            let data = std::fs::read(&entry)
                .map_err(|e| ClientError::Http { status: 0, detail: format!("failed to read {}: {e}", entry.display()) })?;
            std::io::Write::write_all(&mut writer, &data)
                .map_err(|e| ClientError::Http { status: 0, detail: format!("zip write failed: {e}") })?;
        }
        writer
            .finish()
            .map_err(|e| ClientError::Http { status: 0, detail: format!("zip finish failed: {e}") })?;
    }
    Ok(buffer.into_inner())
}

fn walk_files(dir: &Path) -> Result<Vec<std::path::PathBuf>, ClientError> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| ClientError::Http { status: 0, detail: format!("failed to read dir {}: {e}", current.display()) })?;
        for entry in entries {
            let entry = entry.map_err(|e| ClientError::Http { status: 0, detail: e.to_string() })?;
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

pub use rockhold_core::DeploymentSpec;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_adds_http_scheme_when_missing() {
        let client = RockholdClient::new("localhost:8000");
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[test]
    fn new_keeps_explicit_scheme() {
        let client = RockholdClient::new("https://rockhold.internal");
        assert_eq!(client.base_url, "https://rockhold.internal");
    }

    #[test]
    fn url_nests_under_the_sandbox_base_path() {
        let client = RockholdClient::new("http://localhost:8000");
        assert_eq!(client.url("/sandbox/start"), "http://localhost:8000/apis/envs/sandbox/v1/sandbox/start");
        assert_eq!(client.url("/env/step"), "http://localhost:8000/apis/envs/sandbox/v1/env/step");
    }

    #[tokio::test]
    async fn wait_until_alive_times_out_against_an_unreachable_host() {
        let client = RockholdClient::new("http://127.0.0.1:1");
        let result = client
            .wait_until_alive("sbx-1", Duration::from_millis(50), Duration::from_millis(10))
            .await;
        assert!(result.is_err());
    }
}
