//! Remote client for the sandbox orchestration control plane.
//!
//! Wraps the gateway's HTTP surface behind the same method shapes the
//! in-process sandbox actor exposes, so a caller can swap between driving a
//! sandbox locally and driving one over the network without changing call
//! sites.

pub mod client;
pub mod error;

pub use client::{CommandResponse, FileContent, NohupResult, Observation, RockholdClient, StartOptions};
pub use error::{ClientError, RemoteException};
