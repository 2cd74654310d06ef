pub mod actor;
pub mod docker;
pub mod mock;
pub mod nohup;
pub mod sandbox_registry;
pub mod session;
pub mod status;

pub use actor::SandboxActor;
pub use docker::{DockerDeploymentDriver, AGENT_INTERNAL_PORT};
pub use mock::MockDeploymentDriver;
pub use nohup::{CommandChannel, NohupHandle, NohupLaunchOutcome, NohupResult, OutputMode};
pub use sandbox_registry::{SandboxGuard, SandboxMetadata, SandboxRegistry};
pub use session::SessionTable;
