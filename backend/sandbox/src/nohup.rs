//! Detached (NOHUP) process execution: launch, poll for completion, and
//! collect output, pinned to the exact message formats of
//! `original_source/tests/unit/sdk/test_arun_nohup.py`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rockhold_core::{Result, SandboxError};

/// Fixed affixes the launcher wrapper prints around the detached PID.
pub const PID_PREFIX: &str = "__ROCKHOLD_NOHUP_PID__:";
pub const PID_SUFFIX: &str = ":__ROCKHOLD_NOHUP_PID_END__";

static PID_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "{}([0-9]+){}",
        regex::escape(PID_PREFIX),
        regex::escape(PID_SUFFIX)
    ))
    .unwrap()
});

/// Abstracts the one session round trip a nohup launch/poll/read needs,
/// so this module is testable without a live in-container agent.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn submit(&self, command: &str, timeout: Duration) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct NohupHandle {
    pub pid: u64,
    pub tmp_file: String,
    pub started_at: Instant,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NohupResult {
    pub exit_code: i64,
    pub output: String,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Full,
    Limited(usize),
    Ignore,
}

pub enum NohupLaunchOutcome {
    Started(NohupHandle),
    Failed(NohupResult),
}

/// Builds the one-shot shell write that spawns `command` detached, redirects
/// its output to a unique tmp file, and prints the PID marker.
fn launcher_script(command: &str, tmp_file: &str) -> String {
    format!(
        "nohup sh -c {command:?} > {tmp_file} 2>&1 & echo \"{PID_PREFIX}$!{PID_SUFFIX}\""
    )
}

fn extract_pid(raw_output: &str) -> Option<u64> {
    PID_MARKER
        .captures(raw_output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub async fn start_nohup_process(
    channel: &dyn CommandChannel,
    command: &str,
    submit_timeout: Duration,
    now_nanos: u128,
) -> Result<NohupLaunchOutcome> {
    let tmp_file = format!("/tmp/tmp_{now_nanos}.out");
    let launcher = launcher_script(command, &tmp_file);

    match channel.submit(&launcher, submit_timeout).await {
        Err(SandboxError::Timeout(_)) => Ok(NohupLaunchOutcome::Failed(NohupResult {
            exit_code: 1,
            output: "Command submission timeout while launching detached process".to_string(),
            failure_reason: Some("Command submission timeout".to_string()),
        })),
        Err(e) => Err(e),
        Ok(raw) => match extract_pid(&raw) {
            Some(pid) => Ok(NohupLaunchOutcome::Started(NohupHandle {
                pid,
                tmp_file,
                started_at: Instant::now(),
            })),
            None => Ok(NohupLaunchOutcome::Failed(NohupResult {
                exit_code: 1,
                output: format!("Failed to submit command: no PID marker found in launcher output: {raw}"),
                failure_reason: Some("Failed to submit command: no PID marker found in launcher output".to_string()),
            })),
        },
    }
}

/// Polls `kill -0 <pid>` until the process exits or `timeout` elapses.
///
/// Only the tracked PID is treated as a life indicator: if the launched
/// command forks and detaches, surviving children are not tracked and the
/// process is reported complete as soon as the tracked PID exits.
pub async fn wait_for_process_completion(
    channel: &dyn CommandChannel,
    pid: u64,
    timeout: Duration,
    interval: Duration,
) -> (bool, String) {
    let start = Instant::now();
    loop {
        if start.elapsed() >= timeout {
            return (false, "Process timed out".to_string());
        }

        let probe = format!("kill -0 {pid} >/dev/null 2>&1; echo $?");
        match channel.submit(&probe, interval).await {
            Ok(out) if out.trim() == "0" => {
                tokio::time::sleep(interval).await;
                continue;
            }
            Ok(_) => {
                let elapsed = start.elapsed().as_secs_f64();
                return (true, format!("Process completed successfully in {elapsed:.1}s"));
            }
            Err(_) => {
                tokio::time::sleep(interval).await;
                continue;
            }
        }
    }
}

/// Collects the detached process's redirected output per `mode`.
pub async fn handle_nohup_output(
    channel: &dyn CommandChannel,
    tmp_file: &str,
    mode: OutputMode,
    read_timeout: Duration,
) -> Result<String> {
    match mode {
        OutputMode::Full => channel.submit(&format!("cat {tmp_file}"), read_timeout).await,
        OutputMode::Limited(n) => {
            channel
                .submit(&format!("head -c {n} {tmp_file}"), read_timeout)
                .await
        }
        OutputMode::Ignore => {
            let stat_out = channel
                .submit(&format!("stat -c%s {tmp_file} 2>/dev/null"), read_timeout)
                .await
                .unwrap_or_default();
            let size: Option<u64> = stat_out.trim().parse().ok();

            let mut message = format!("Process output written to {tmp_file}");
            if let Some(bytes) = size {
                let size_line = if bytes >= 1024 {
                    format!("File size: {:.2} KB", bytes as f64 / 1024.0)
                } else {
                    format!("File size: {bytes} bytes")
                };
                message.push_str(&format!(" ({size_line})"));
            }
            message.push_str(" without streaming the log content.");
            Ok(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct ScriptedChannel {
        responses: StdMutex<Vec<Result<String>>>,
    }

    #[async_trait]
    impl CommandChannel for ScriptedChannel {
        async fn submit(&self, _command: &str, _timeout: Duration) -> Result<String> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn start_nohup_extracts_pid_from_marker() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![Ok(format!("{PID_PREFIX}4242{PID_SUFFIX}\n"))]),
        };
        let outcome = start_nohup_process(&channel, "echo detached", Duration::from_secs(5), 1701)
            .await
            .unwrap();
        match outcome {
            NohupLaunchOutcome::Started(handle) => {
                assert_eq!(handle.pid, 4242);
                assert_eq!(handle.tmp_file, "/tmp/tmp_1701.out");
            }
            NohupLaunchOutcome::Failed(r) => panic!("expected success, got {r:?}"),
        }
    }

    #[tokio::test]
    async fn start_nohup_missing_marker_fails_submission() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![Ok("no marker here".to_string())]),
        };
        let outcome = start_nohup_process(&channel, "echo x", Duration::from_secs(5), 1)
            .await
            .unwrap();
        match outcome {
            NohupLaunchOutcome::Failed(r) => {
                assert_eq!(r.exit_code, 1);
                assert!(r.output.contains("Failed to submit command"));
                assert!(r.failure_reason.unwrap().contains("Failed to submit command"));
            }
            NohupLaunchOutcome::Started(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn start_nohup_submission_timeout_reported() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![Err(SandboxError::Timeout("upstream".to_string()))]),
        };
        let outcome = start_nohup_process(&channel, "echo x", Duration::from_secs(5), 1)
            .await
            .unwrap();
        match outcome {
            NohupLaunchOutcome::Failed(r) => {
                assert_eq!(r.exit_code, 1);
                assert!(r.output.to_lowercase().contains("timeout"));
                assert!(r.failure_reason.unwrap().to_lowercase().contains("timeout"));
            }
            NohupLaunchOutcome::Started(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn ignore_mode_reports_kb_size_and_path() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![Ok("2048".to_string())]),
        };
        let output = handle_nohup_output(&channel, "/tmp/tmp_1701.out", OutputMode::Ignore, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.contains("/tmp/tmp_1701.out"));
        assert!(output.contains("File size: 2.00 KB"));
        assert!(output.contains("without streaming the log content"));
    }

    #[tokio::test]
    async fn ignore_mode_bytes_under_1024() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![Ok("500".to_string())]),
        };
        let output = handle_nohup_output(&channel, "/tmp/tmp_2.out", OutputMode::Ignore, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.contains("File size: 500 bytes"));
    }

    #[tokio::test]
    async fn ignore_mode_stat_failure_omits_size_line() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![Ok(String::new())]),
        };
        let output = handle_nohup_output(&channel, "/tmp/tmp_3.out", OutputMode::Ignore, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.contains("/tmp/tmp_3.out"));
        assert!(!output.contains("File size:"));
        assert!(output.contains("without streaming the log content"));
    }

    #[tokio::test]
    async fn wait_for_completion_success_message_format() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![Ok("1".to_string())]),
        };
        let (success, message) =
            wait_for_process_completion(&channel, 4242, Duration::from_secs(5), Duration::from_millis(10)).await;
        assert!(success);
        assert!(message.starts_with("Process completed successfully in"));
    }

    #[tokio::test]
    async fn wait_for_completion_times_out() {
        let channel = ScriptedChannel {
            responses: StdMutex::new(vec![]),
        };
        let (success, message) =
            wait_for_process_completion(&channel, 4242, Duration::ZERO, Duration::from_millis(1)).await;
        assert!(!success);
        assert!(message.contains("Process timed out"));
    }
}
