//! Config defaults: applies sensible default values to parsed config.
//!
//! Most fields already carry a `#[serde(default = ...)]`; this pass handles
//! defaults that depend on more than one field, which serde's per-field
//! defaulting can't express.

use crate::schema::RockholdConfig;

/// Minimum warmup pool size the pool loop will actually try to maintain.
pub const MIN_WARMUP_TARGET_SIZE: usize = 0;

/// Apply all cross-field defaults to a freshly loaded config.
pub fn apply_all_defaults(config: RockholdConfig) -> RockholdConfig {
    apply_warmup_defaults(config)
}

/// `burst_headroom` below 1 would make every burst allocation fall back to a
/// synchronous build; that's a valid choice but only if made on purpose, so
/// only auto-correct the genuinely degenerate case of target_size 0.
fn apply_warmup_defaults(mut config: RockholdConfig) -> RockholdConfig {
    if config.warmup.target_size == 0 && config.warmup.burst_headroom == 0 {
        config.warmup.burst_headroom = 1;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gives_zero_pool_at_least_burst_headroom_one() {
        let mut cfg = RockholdConfig::default();
        cfg.warmup.target_size = 0;
        cfg.warmup.burst_headroom = 0;
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.warmup.burst_headroom, 1);
    }

    #[test]
    fn does_not_override_explicit_headroom() {
        let mut cfg = RockholdConfig::default();
        cfg.warmup.target_size = 0;
        cfg.warmup.burst_headroom = 3;
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.warmup.burst_headroom, 3);
    }
}
