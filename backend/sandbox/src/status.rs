//! Atomic persistence of `ServiceStatus` to `<status_dir>/<sandbox_id>.json`,
//! following the same write-temp-then-rename pattern as the config crate's
//! `io::write_config`.

use std::path::{Path, PathBuf};

use rockhold_core::{Result, SandboxError, ServiceStatus};
use tokio::fs;

pub fn status_path(status_dir: &Path, sandbox_id: &str) -> PathBuf {
    status_dir.join(format!("{sandbox_id}.json"))
}

pub async fn write_status(status_dir: &Path, sandbox_id: &str, status: &ServiceStatus) -> Result<()> {
    fs::create_dir_all(status_dir)
        .await
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create status dir: {e}")))?;

    let final_path = status_path(status_dir, sandbox_id);
    let tmp_path = status_dir.join(format!("{sandbox_id}.json.tmp"));

    let body = serde_json::to_vec_pretty(status)
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to serialize status: {e}")))?;
    fs::write(&tmp_path, body)
        .await
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to write status tmp file: {e}")))?;
    fs::rename(&tmp_path, &final_path)
        .await
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to rename status file: {e}")))?;
    Ok(())
}

pub async fn read_status(status_dir: &Path, sandbox_id: &str) -> Result<ServiceStatus> {
    let path = status_path(status_dir, sandbox_id);
    let body = fs::read(&path)
        .await
        .map_err(|_| SandboxError::NotFound(format!("no status file for sandbox {sandbox_id}")))?;
    serde_json::from_slice(&body)
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("status file corrupt: {e}")))
}

pub async fn delete_status(status_dir: &Path, sandbox_id: &str) -> Result<()> {
    let path = status_path(status_dir, sandbox_id);
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SandboxError::Internal(anyhow::anyhow!("failed to delete status file: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockhold_core::{PhaseState, PHASE_DOCKER_RUN};

    #[tokio::test]
    async fn round_trips_status() {
        let dir = std::env::temp_dir().join(format!("rockhold-status-test-{}", uuid::Uuid::new_v4()));
        let mut status = ServiceStatus::default();
        status.set_phase(PHASE_DOCKER_RUN, PhaseState::Success, "ok");

        write_status(&dir, "sbx-1", &status).await.unwrap();
        let read_back = read_status(&dir, "sbx-1").await.unwrap();
        assert_eq!(read_back.get_phase(PHASE_DOCKER_RUN).unwrap().status, PhaseState::Success);

        delete_status(&dir, "sbx-1").await.unwrap();
        assert!(read_status(&dir, "sbx-1").await.is_err());

        let _ = fs::remove_dir_all(&dir).await;
    }
}
