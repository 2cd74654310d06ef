//! `sandbox_id → actor handle` registry: per-id non-reentrant locking for
//! mutating operations, lock-free reads, and metadata listing.

use std::collections::HashMap;
use std::sync::Arc;

use rockhold_core::{Result, SandboxError, SandboxLifecycle};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::actor::SandboxActor;

struct Entry {
    actor: Arc<SandboxActor>,
    lock: Arc<Mutex<()>>,
    lifecycle: SandboxLifecycle,
}

#[derive(Clone)]
pub struct SandboxMetadata {
    pub sandbox_id: String,
    pub image: String,
    pub lifecycle: SandboxLifecycle,
}

/// RAII guard for a sandbox's per-id lock, released on every exit path
/// (drop, early return, or panic-unwind) rather than a manually-released
/// mutex.
pub struct SandboxGuard {
    _permit: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub struct SandboxRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: String, actor: Arc<SandboxActor>, lifecycle: SandboxLifecycle) {
        self.entries.write().await.insert(
            id,
            Entry { actor, lock: Arc::new(Mutex::new(())), lifecycle },
        );
    }

    pub async fn set_lifecycle(&self, id: &str, lifecycle: SandboxLifecycle) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| SandboxError::NotFound(format!("sandbox {id}")))?;
        entry.lifecycle = lifecycle;
        Ok(())
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<SandboxActor>> {
        self.entries.read().await.get(id).map(|e| e.actor.clone())
    }

    pub async fn unregister(&self, id: &str) -> Option<Arc<SandboxActor>> {
        self.entries.write().await.remove(id).map(|e| e.actor)
    }

    pub async fn list(&self, image_filter: Option<&str>) -> Vec<SandboxMetadata> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| image_filter.map(|f| f == e.actor.spec.image).unwrap_or(true))
            .map(|(id, e)| SandboxMetadata {
                sandbox_id: id.clone(),
                image: e.actor.spec.image.clone(),
                lifecycle: e.lifecycle,
            })
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Acquires the per-id lock for a mutating operation. Non-reentrant:
    /// holding a `SandboxGuard` and calling this again for the same id will
    /// deadlock, matching the single-owner-per-op contract of the mutating
    /// endpoints.
    pub async fn lock(&self, id: &str) -> Result<SandboxGuard> {
        let lock = {
            let entries = self.entries.read().await;
            entries
                .get(id)
                .map(|e| e.lock.clone())
                .ok_or_else(|| SandboxError::NotFound(format!("sandbox {id}")))?
        };
        let permit = lock.lock_owned().await;
        Ok(SandboxGuard { _permit: permit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDeploymentDriver;
    use rockhold_core::DeploymentSpec;
    use std::collections::HashMap as StdHashMap;

    fn test_actor(id: &str) -> Arc<SandboxActor> {
        let spec = DeploymentSpec {
            image: "python:3.11".to_string(),
            cpus: 1.0,
            memory: "512m".to_string(),
            env: StdHashMap::new(),
            startup_timeout_seconds: 60,
        };
        Arc::new(SandboxActor::new(
            id.to_string(),
            spec,
            Arc::new(MockDeploymentDriver::new()),
            std::env::temp_dir(),
        ))
    }

    #[tokio::test]
    async fn register_lookup_unregister_round_trip() {
        let registry = SandboxRegistry::new();
        let actor = test_actor("sbx-1");
        registry.register("sbx-1".to_string(), actor, SandboxLifecycle::Running).await;

        assert!(registry.lookup("sbx-1").await.is_some());
        registry.unregister("sbx-1").await;
        assert!(registry.lookup("sbx-1").await.is_none());
    }

    #[tokio::test]
    async fn list_filters_by_image() {
        let registry = SandboxRegistry::new();
        registry.register("a".to_string(), test_actor("a"), SandboxLifecycle::Running).await;
        let listed = registry.list(Some("python:3.11")).await;
        assert_eq!(listed.len(), 1);
        assert!(registry.list(Some("node:20")).await.is_empty());
    }

    #[tokio::test]
    async fn lock_unknown_id_not_found() {
        let registry = SandboxRegistry::new();
        assert!(matches!(registry.lock("missing").await, Err(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn lock_serializes_concurrent_mutations() {
        let registry = SandboxRegistry::new();
        registry.register("a".to_string(), test_actor("a"), SandboxLifecycle::Running).await;

        let guard = registry.lock("a").await.unwrap();
        let registry2 = Arc::new(registry);
        let registry3 = registry2.clone();
        let handle = tokio::spawn(async move { registry3.lock("a").await.unwrap() });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(guard);
        handle.await.unwrap();
    }
}
