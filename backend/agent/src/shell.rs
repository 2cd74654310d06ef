//! Persistent shell sessions, framed with a unique per-session marker so a
//! command's end and exit code can be recognized on an otherwise untyped
//! byte stream. Adapted from a PTY-attach marker technique to a plain piped
//! child process: no interactive prompt ever appears on a non-tty pipe, so
//! only the marker this module writes itself needs stripping.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use rockhold_core::{Result, SandboxError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{Mutex, RwLock};

fn marker_regex(marker: &str) -> Regex {
    Regex::new(&format!("^{}:(-?[0-9]+)$", regex::escape(marker))).expect("marker regex is well-formed")
}

static SH_PATH: Lazy<&'static str> = Lazy::new(|| "/bin/sh");

/// One live child shell. `exec 2>&1` is run once before handing control to
/// an interactive `sh -s`, so every later command's stderr rides the same
/// pipe as its stdout without wrapping the command in a subshell -- a
/// subshell would scope away `cd`/export side effects the session is
/// supposed to retain.
pub struct Session {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    marker: String,
    marker_pattern: Regex,
}

impl Session {
    pub fn spawn() -> Result<Self> {
        let marker = format!("__ROCKHOLD_MARK_{}__", uuid::Uuid::new_v4().simple());
        let mut child = tokio::process::Command::new(*SH_PATH)
            .arg("-c")
            .arg("exec 2>&1; exec sh -s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::LaunchFailed(format!("failed to spawn shell: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| SandboxError::LaunchFailed("no stdin pipe".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| SandboxError::LaunchFailed("no stdout pipe".to_string()))?;

        let marker_pattern = marker_regex(&marker);
        Ok(Session { stdin: Mutex::new(stdin), stdout: Mutex::new(BufReader::new(stdout)), child: Mutex::new(child), marker, marker_pattern })
    }

    pub async fn run(&self, command: &str, timeout: Duration) -> Result<(String, i64)> {
        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(command.as_bytes())
                .await
                .map_err(|e| SandboxError::SessionGone(format!("write failed: {e}")))?;
            stdin
                .write_all(format!("\nprintf '\\n{}:%d\\n' \"$?\"\n", self.marker).as_bytes())
                .await
                .map_err(|e| SandboxError::SessionGone(format!("write failed: {e}")))?;
            stdin.flush().await.map_err(|e| SandboxError::SessionGone(format!("flush failed: {e}")))?;
        }

        let read = self.read_until_marker();
        match tokio::time::timeout(timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(SandboxError::Timeout(format!("command timed out after {timeout:?}"))),
        }
    }

    async fn read_until_marker(&self) -> Result<(String, i64)> {
        let mut stdout = self.stdout.lock().await;
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| SandboxError::SessionGone(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(SandboxError::SessionGone("shell process exited".to_string()));
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if let Some(captures) = self.marker_pattern.captures(trimmed) {
                let exit_code: i64 = captures.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(-1);
                return Ok((lines.join(""), exit_code));
            }
            lines.push(line);
        }
    }

    pub async fn close(&self) {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    pub async fn check_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }
}

#[derive(Default, Clone)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, name: &str) -> Result<()> {
        let session = Session::spawn()?;
        self.sessions.write().await.insert(name.to_string(), Arc::new(session));
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(name).cloned()
    }

    pub async fn close(&self, name: &str) {
        if let Some(session) = self.sessions.write().await.remove(name) {
            session.close().await;
        }
    }

    pub async fn names(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_output_and_exit_code() {
        let session = Session::spawn().unwrap();
        let (output, code) = session.run("echo hello", Duration::from_secs(5)).await.unwrap();
        assert_eq!(output.trim(), "hello");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn run_reports_nonzero_exit_code() {
        let session = Session::spawn().unwrap();
        let (_, code) = session.run("false", Duration::from_secs(5)).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn session_persists_cwd_across_commands() {
        let session = Session::spawn().unwrap();
        session.run("cd /tmp", Duration::from_secs(5)).await.unwrap();
        let (output, _) = session.run("pwd", Duration::from_secs(5)).await.unwrap();
        assert_eq!(output.trim(), "/tmp");
    }

    #[tokio::test]
    async fn stderr_is_merged_into_the_command_output() {
        let session = Session::spawn().unwrap();
        let (output, _) = session.run("echo oops >&2", Duration::from_secs(5)).await.unwrap();
        assert_eq!(output.trim(), "oops");
    }

    #[tokio::test]
    async fn run_times_out_on_a_hanging_command() {
        let session = Session::spawn().unwrap();
        let result = session.run("sleep 5", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(SandboxError::Timeout(_))));
    }

    #[tokio::test]
    async fn close_marks_the_session_dead() {
        let session = Session::spawn().unwrap();
        assert!(session.check_alive().await);
        session.close().await;
        assert!(!session.check_alive().await);
    }
}
