//! Named persistent shell sessions inside a sandbox. Command submission and
//! output retrieval against one session are strictly ordered by holding that
//! session's lock across the full submit-then-read round trip, not merely by
//! enqueuing — two concurrent callers against the same session serialize,
//! callers against different sessions never block each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rockhold_core::{Result, SandboxError, SessionState};
use tokio::sync::{Mutex, RwLock};

struct SessionEntry {
    state: SessionState,
}

#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionEntry>>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, name: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionEntry { state: SessionState::Alive })));
        Ok(())
    }

    pub async fn close(&self, name: &str) -> Result<()> {
        let removed = self.sessions.write().await.remove(name);
        if removed.is_none() {
            return Err(SandboxError::NotFound(format!("session {name}")));
        }
        Ok(())
    }

    pub async fn mark_dead(&self, name: &str) {
        if let Some(entry) = self.sessions.read().await.get(name).cloned() {
            entry.lock().await.state = SessionState::Dead;
        }
    }

    pub async fn state(&self, name: &str) -> Option<SessionState> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(name)?.clone();
        drop(sessions);
        let state = entry.lock().await.state;
        Some(state)
    }

    pub async fn names(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Runs `f` with this session's lock held for the full call, failing with
    /// `NOT_FOUND` if the session doesn't exist or `SESSION_GONE` if its
    /// underlying shell has already died.
    pub async fn with_session<F, Fut, T>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let entry = {
            let sessions = self.sessions.read().await;
            sessions
                .get(name)
                .cloned()
                .ok_or_else(|| SandboxError::NotFound(format!("session {name}")))?
        };

        let mut guard = entry.lock().await;
        if guard.state == SessionState::Dead {
            return Err(SandboxError::SessionGone(name.to_string()));
        }

        match f().await {
            Ok(value) => Ok(value),
            Err(SandboxError::SessionGone(s)) => {
                guard.state = SessionState::Dead;
                Err(SandboxError::SessionGone(s))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_close_round_trips() {
        let table = SessionTable::new();
        table.create("s1").await.unwrap();
        assert_eq!(table.state("s1").await, Some(SessionState::Alive));
        table.close("s1").await.unwrap();
        assert_eq!(table.state("s1").await, None);
    }

    #[tokio::test]
    async fn close_unknown_session_not_found() {
        let table = SessionTable::new();
        assert!(matches!(table.close("missing").await, Err(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn dead_session_rejects_further_ops() {
        let table = SessionTable::new();
        table.create("s1").await.unwrap();
        table.mark_dead("s1").await;
        let result = table.with_session("s1", || async { Ok::<_, SandboxError>(()) }).await;
        assert!(matches!(result, Err(SandboxError::SessionGone(_))));
    }

    #[tokio::test]
    async fn failure_inside_session_marks_it_dead() {
        let table = SessionTable::new();
        table.create("s1").await.unwrap();
        let result: Result<()> = table
            .with_session("s1", || async { Err(SandboxError::SessionGone("s1".to_string())) })
            .await;
        assert!(result.is_err());
        assert_eq!(table.state("s1").await, Some(SessionState::Dead));
    }
}
