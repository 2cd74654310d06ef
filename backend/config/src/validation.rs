//! Config validation: deep schema checks with user-friendly error messages.

use crate::schema::RockholdConfig;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &RockholdConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_service(config, &mut report);
    validate_docker(config, &mut report);
    validate_warmup(config, &mut report);
    report
}

fn validate_service(config: &RockholdConfig, report: &mut ValidationReport) {
    if config.service.status_dir.trim().is_empty() {
        report.error("service.statusDir", "statusDir must not be empty");
    }
    if config.service.port == 0 {
        report.error("service.port", "port must be >= 1");
    }
    if let Some(url) = &config.service.base_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            report.error("service.baseUrl", "baseUrl must start with http:// or https://");
        }
    }
}

fn validate_docker(config: &RockholdConfig, report: &mut ValidationReport) {
    if config.docker.default_startup_timeout_seconds == 0 {
        report.error(
            "docker.defaultStartupTimeoutSeconds",
            "defaultStartupTimeoutSeconds must be >= 1",
        );
    }
}

fn validate_warmup(config: &RockholdConfig, report: &mut ValidationReport) {
    let w = &config.warmup;
    if w.max_concurrent_builds == 0 {
        report.error("warmup.maxConcurrentBuilds", "maxConcurrentBuilds must be >= 1");
    }
    if w.target_size == 0 && w.burst_headroom == 0 {
        report.warn(
            "warmup.burstHeadroom",
            "target_size and burst_headroom are both 0; every allocation will block on a synchronous build",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let report = validate(&RockholdConfig::default());
        assert!(report.is_valid(), "errors: {:?}", report.errors);
    }

    #[test]
    fn empty_status_dir_is_error() {
        let mut cfg = RockholdConfig::default();
        cfg.service.status_dir = "".to_string();
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert!(report.errors[0].path.contains("statusDir"));
    }

    #[test]
    fn bad_base_url_scheme_is_error() {
        let mut cfg = RockholdConfig::default();
        cfg.service.base_url = Some("ftp://example.com".to_string());
        let report = validate(&cfg);
        assert!(!report.is_valid());
    }

    #[test]
    fn zero_pool_and_headroom_is_warning_not_error() {
        let mut cfg = RockholdConfig::default();
        cfg.warmup.target_size = 0;
        cfg.warmup.burst_headroom = 0;
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }
}
