//! Layered engine configuration (ambient stack, carried regardless of
//! Non-goals excluding a configuration *service*; this is the in-process
//! `config`-crate-backed settings struct, loaded from a base TOML file plus
//! `VORTEX_`-prefixed environment overrides).

use serde::{Deserialize, Serialize};

/// Engine-wide runtime tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub edges: EdgeConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            edges: EdgeConfig::default(),
            backoff: BackoffConfig::default(),
            alerting: AlertingConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgeConfig {
    /// Bounded capacity for every edge, unless a node overrides it (§4.1).
    #[serde(default = "default_edge_capacity")]
    pub default_capacity: usize,
}

fn default_edge_capacity() -> usize {
    crate::edge::DEFAULT_EDGE_CAPACITY
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            default_capacity: default_edge_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_cap_ms")]
    pub cap_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_factor() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.20
}
fn default_cap_ms() -> u64 {
    60_000
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_backoff_ms(),
            factor: default_factor(),
            jitter: default_jitter(),
            cap_ms: default_cap_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl From<BackoffConfig> for crate::resilience::RetryPolicy {
    fn from(cfg: BackoffConfig) -> Self {
        crate::resilience::RetryPolicy {
            initial: std::time::Duration::from_millis(cfg.initial_ms),
            factor: cfg.factor,
            jitter: cfg.jitter,
            cap: std::time::Duration::from_millis(cfg.cap_ms),
            max_attempts: cfg.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertingConfig {
    /// Bounded per-subscriber buffer on the topic bus (§5).
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_subscriber_buffer() -> usize {
    256
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_interval_secs")]
    pub interval_secs: u64,
}

fn default_snapshot_interval_secs() -> u64 {
    60
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_snapshot_interval_secs(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional base TOML file, then apply
    /// `VORTEX_`-prefixed environment variable overrides (e.g.
    /// `VORTEX_BACKOFF__MAX_ATTEMPTS=10`).
    pub fn load(base_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = base_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("VORTEX")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_backoff_policy() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.backoff.initial_ms, 1000);
        assert_eq!(cfg.backoff.factor, 2.0);
        assert_eq!(cfg.backoff.jitter, 0.20);
        assert_eq!(cfg.backoff.cap_ms, 60_000);
    }

    #[test]
    fn edge_default_capacity_matches_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.edges.default_capacity, 1000);
    }

    #[test]
    fn load_with_no_base_path_returns_defaults() {
        let cfg = EngineConfig::load(None).unwrap();
        assert_eq!(cfg.backoff.max_attempts, 5);
    }

    #[test]
    fn backoff_config_converts_to_retry_policy() {
        let cfg = BackoffConfig::default();
        let policy: crate::resilience::RetryPolicy = cfg.into();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.cap, std::time::Duration::from_secs(60));
    }
}
