//! `rockhold-config` — control plane configuration management.
//!
//! Provides:
//! - Typed config schema (admin role, service, Docker, warmup pool, logging)
//! - YAML read/write with atomic backup rotation
//! - `${ENV_VAR}` substitution
//! - Config redaction for safe logging/display
//! - Default value application
//! - Deep schema validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    collect_referenced_vars, contains_env_var_reference, resolve_env_vars, resolve_env_vars_with,
    MissingEnvVarError,
};
pub use io::{apply_merge_patch, config_dir, config_file_path, load_config, write_config};
pub use redact::{collect_redacted_paths, redact};
pub use schema::{AdminConfig, AdminRole, DockerConfig, LoggingConfig, RockholdConfig, ServiceConfig, WarmupConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Load, apply env substitution, and apply defaults to a config file.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_and_prepare(path: &Path) -> Result<RockholdConfig> {
    let raw_config = load_config(path).await?;

    let value: Value =
        serde_json::to_value(&raw_config).context("Failed to serialize config for processing")?;
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;

    let config: RockholdConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "config error");
    }

    Ok(config)
}
