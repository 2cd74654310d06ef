use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DeploymentSpec, ExecResult, PortMapping};

/// Abstracts over container backends (C1 of the orchestration core).
///
/// The concrete driver shipped here is Docker-backed, reached through the
/// Docker Engine API rather than shelling out to the `docker` CLI, but any
/// backend implementing this trait can be placed behind the same registry
/// and warmup pool.
#[async_trait]
pub trait DeploymentDriver: Send + Sync {
    /// Pulls the image if missing, starts the container with the given
    /// resource limits and env map, and forwards its internal agent port to
    /// a free host port. Phase transitions are persisted before this
    /// returns, on both the success and failure paths.
    async fn start(&self, id: &str, spec: &DeploymentSpec) -> Result<PortMapping>;

    /// Idempotent: releases the host port, removes the container, deletes
    /// the status JSON. Must succeed even if the container is already gone.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Host-side exec into the container. Used only for cluster-level
    /// probes, never for user traffic (which goes through the in-container
    /// agent over the forwarded port).
    async fn exec(&self, id: &str, cmd: &str) -> Result<ExecResult>;

    /// Cheap liveness check of the backend itself (e.g. can we reach the
    /// Docker daemon), distinct from any one sandbox's `is_alive` probe.
    async fn is_available(&self) -> bool;
}
