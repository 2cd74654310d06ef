//! Shared types, error taxonomy, and traits for the sandbox orchestration
//! control plane: the data model of §3, the `DeploymentDriver` trait of
//! §4.1, the memory-size grammar of §6, and request-scoped context for
//! access logging.

pub mod context;
pub mod error;
pub mod memory_size;
pub mod traits;
pub mod types;

pub use context::{current_sandbox_id, current_trace_id, RequestContext};
pub use error::{Result, SandboxError, TransferEnvelope};
pub use memory_size::{parse_memory_size, MemorySizeError};
pub use traits::DeploymentDriver;
pub use types::{
    ActorState, DeploymentSpec, ExecResult, PhaseState, PhaseStatus, PortMapping, ProcessState,
    SandboxLifecycle, SandboxStartResponse, SandboxStatistics, SandboxStatusResponse,
    ServiceStatus, SessionState, PHASE_DOCKER_RUN, PHASE_IMAGE_PULL,
};
