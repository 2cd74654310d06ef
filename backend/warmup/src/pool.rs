//! Per-`(image, spec-hash)` pool of idle, already-`READY` sandbox actors.
//!
//! Acquisition is O(1) and wait-free when the pool has an idle entry;
//! otherwise it falls back to a synchronous build. A background refill loop
//! per pool reconciles `current_size` toward `target_size`.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rockhold_core::{DeploymentDriver, DeploymentSpec, Result, SandboxLifecycle};
use rockhold_sandbox::{SandboxActor, SandboxRegistry};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::retry::{RetryPolicy, RetryState};

struct IdleEntry {
    actor: Arc<SandboxActor>,
    created_at: Instant,
}

pub struct PoolConfig {
    pub target_size: usize,
    pub burst_headroom: usize,
    pub max_concurrent_builds: usize,
    pub max_idle_seconds: u64,
    pub startup_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_size: 0,
            burst_headroom: 1,
            max_concurrent_builds: 2,
            max_idle_seconds: 600,
            startup_timeout: Duration::from_secs(60),
        }
    }
}

struct ImagePool {
    spec: DeploymentSpec,
    config: PoolConfig,
    idle: VecDeque<IdleEntry>,
    in_flight_refills: usize,
}

impl ImagePool {
    fn current_size(&self) -> usize {
        self.idle.len()
    }
}

pub struct WarmupPool {
    driver: Arc<dyn DeploymentDriver>,
    registry: Arc<SandboxRegistry>,
    status_dir: PathBuf,
    pools: RwLock<HashMap<String, Arc<Mutex<ImagePool>>>>,
    retry_policy: RetryPolicy,
}

impl WarmupPool {
    pub fn new(driver: Arc<dyn DeploymentDriver>, registry: Arc<SandboxRegistry>, status_dir: PathBuf, retry_policy: RetryPolicy) -> Arc<Self> {
        Arc::new(Self {
            driver,
            registry,
            status_dir,
            pools: RwLock::new(HashMap::new()),
            retry_policy,
        })
    }

    /// Declares a pool for `spec` and spawns its refill loop. Calling this
    /// twice for the same `pool_key` updates the config but does not spawn a
    /// second loop (callers configure once at startup).
    pub async fn configure(self: &Arc<Self>, spec: DeploymentSpec, config: PoolConfig) {
        let key = spec.pool_key();
        let mut pools = self.pools.write().await;
        if let Some(existing) = pools.get(&key) {
            existing.lock().await.config = config;
            return;
        }
        let pool = Arc::new(Mutex::new(ImagePool { spec, config, idle: VecDeque::new(), in_flight_refills: 0 }));
        pools.insert(key.clone(), pool);
        drop(pools);

        let this = self.clone();
        tokio::spawn(async move { this.refill_loop(key).await });
    }

    async fn pool_for(&self, key: &str) -> Option<Arc<Mutex<ImagePool>>> {
        self.pools.read().await.get(key).cloned()
    }

    /// Acquires a sandbox for `spec`, tagged with `id`. Pops an idle entry if
    /// one exists (applying `env` via a fresh session rather than rebuilding
    /// the container); otherwise builds synchronously.
    ///
    /// Pool entries are pre-tagged with their own UUID at build time (the
    /// only id available before a caller exists) — acquisition therefore
    /// treats that UUID as the caller-visible `sandbox_id` directly rather
    /// than renaming an already-running container, which bollard has no
    /// atomic primitive for.
    pub async fn acquire(self: &Arc<Self>, spec: &DeploymentSpec) -> Result<Arc<SandboxActor>> {
        let key = spec.pool_key();
        if let Some(pool_lock) = self.pool_for(&key).await {
            let mut pool = pool_lock.lock().await;
            if let Some(entry) = pool.idle.pop_front() {
                drop(pool);
                self.registry
                    .register(entry.actor.id.clone(), entry.actor.clone(), SandboxLifecycle::Running)
                    .await;
                if !spec.env.is_empty() {
                    entry.actor.create_session("default", spec.env.clone()).await.ok();
                }
                info!(sandbox_id = %entry.actor.id, pool = %key, "handed off warm sandbox");
                return Ok(entry.actor);
            }
        }

        info!(pool = %key, "pool empty, building synchronously");
        let startup_timeout = self
            .pool_for(&key)
            .await
            .map(|p| p.try_lock().map(|g| g.config.startup_timeout).unwrap_or(Duration::from_secs(60)))
            .unwrap_or(Duration::from_secs(60));
        let actor = self.build_actor(spec.clone(), startup_timeout).await?;
        self.registry.register(actor.id.clone(), actor.clone(), SandboxLifecycle::Running).await;
        Ok(actor)
    }

    async fn build_actor(&self, spec: DeploymentSpec, startup_timeout: Duration) -> Result<Arc<SandboxActor>> {
        let id = uuid::Uuid::new_v4().to_string();
        let actor = Arc::new(SandboxActor::new(id, spec, self.driver.clone(), self.status_dir.clone()));
        actor.start(startup_timeout).await?;
        Ok(actor)
    }

    async fn refill_loop(self: Arc<Self>, key: String) {
        let mut attempt_seed: u64 = 1;
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let Some(pool_lock) = self.pool_for(&key).await else { break };

            let (spec, buildable) = {
                let mut pool = pool_lock.lock().await;
                let now = Instant::now();
                let before = pool.idle.len();
                let max_idle_seconds = pool.config.max_idle_seconds;
                pool.idle.retain(|e| now.duration_since(e.created_at).as_secs() < max_idle_seconds);
                let retired = before - pool.idle.len();
                if retired > 0 {
                    info!(pool = %key, retired, "retired idle sandboxes past max_idle_seconds");
                }

                let current = pool.idle.len() + pool.in_flight_refills;
                let deficit = pool.config.target_size.saturating_sub(current);
                let buildable = deficit.min(pool.config.max_concurrent_builds.saturating_sub(pool.in_flight_refills));
                pool.in_flight_refills += buildable;
                (pool.spec.clone(), buildable)
            };

            for _ in 0..buildable {
                let this = self.clone();
                let pool_lock = pool_lock.clone();
                let spec = spec.clone();
                attempt_seed = attempt_seed.wrapping_add(0x9E3779B97F4A7C15);
                let seed = attempt_seed;
                let key = key.clone();
                tokio::spawn(async move {
                    let mut retry = RetryState::new(this.retry_policy, seed);
                    loop {
                        match this.build_actor(spec.clone(), startup_timeout_for(&pool_lock).await).await {
                            Ok(actor) => {
                                let mut pool = pool_lock.lock().await;
                                pool.in_flight_refills = pool.in_flight_refills.saturating_sub(1);
                                pool.idle.push_back(IdleEntry { actor, created_at: Instant::now() });
                                return;
                            }
                            Err(e) => {
                                warn!(pool = %key, error = %e, attempt = retry.attempt + 1, "warmup build failed");
                                match retry.next_delay() {
                                    Some(delay) => tokio::time::sleep(delay).await,
                                    None => {
                                        let mut pool = pool_lock.lock().await;
                                        pool.in_flight_refills = pool.in_flight_refills.saturating_sub(1);
                                        return;
                                    }
                                }
                            }
                        }
                    }
                });
            }
        }
    }

    pub async fn idle_count(&self, pool_key: &str) -> usize {
        match self.pool_for(pool_key).await {
            Some(lock) => lock.lock().await.current_size(),
            None => 0,
        }
    }
}

async fn startup_timeout_for(pool: &Arc<Mutex<ImagePool>>) -> Duration {
    pool.lock().await.config.startup_timeout
}

