//! Dual write/read-role HTTP control plane for the sandbox orchestration
//! system (C5): lifecycle, session, file, and detached-process endpoints
//! proxied to the in-container agent via `SandboxActor`.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, start_server};
pub use state::{GatewayRole, GatewayState};
