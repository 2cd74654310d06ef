//! Control plane configuration schema.
//!
//! Typed for serde YAML/JSON deserialization, mirroring the environment
//! variables the control plane consumes directly (`ROCK_ADMIN_ROLE`,
//! `ROCK_SERVICE_STATUS_DIR`, `ROCK_BASE_URL`, ...).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RockholdConfig {
    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub warmup: WarmupConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which role this process serves and which admin environment it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Write,
    Read,
}

impl Default for AdminRole {
    fn default() -> Self {
        AdminRole::Write
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    #[serde(default)]
    pub role: AdminRole,

    /// Logical deployment environment name (e.g. "staging", "prod"); opaque
    /// to this crate, forwarded into log context and `host_name`-adjacent
    /// response fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub status_dir: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            status_dir: default_status_dir(),
            base_url: None,
            port: default_port(),
            host: default_host(),
        }
    }
}

fn default_status_dir() -> String {
    ".rockhold/status".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    /// Unix socket or `tcp://` endpoint; `None` means bollard's own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    #[serde(default = "default_startup_timeout")]
    pub default_startup_timeout_seconds: u64,

    /// Extra env forwarded into every container this process starts,
    /// merged under the per-sandbox `env` map (sandbox values win).
    #[serde(default)]
    pub default_env: HashMap<String, String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            socket_path: None,
            default_startup_timeout_seconds: default_startup_timeout(),
            default_env: HashMap::new(),
        }
    }
}

fn default_startup_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupConfig {
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    #[serde(default = "default_burst_headroom")]
    pub burst_headroom: usize,

    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,

    #[serde(default = "default_max_idle_seconds")]
    pub max_idle_seconds: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        WarmupConfig {
            target_size: default_target_size(),
            burst_headroom: default_burst_headroom(),
            max_concurrent_builds: default_max_concurrent_builds(),
            max_idle_seconds: default_max_idle_seconds(),
        }
    }
}

fn default_target_size() -> usize {
    1
}
fn default_burst_headroom() -> usize {
    1
}
fn default_max_concurrent_builds() -> usize {
    2
}
fn default_max_idle_seconds() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), dir: default_log_dir() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> String {
    ".rockhold/logs".to_string()
}
