//! Configuration types and loading
//!
//! Values resolve in this order: built-in defaults, then a YAML config file
//! (explicit `--config` path, else `.metricwatch.yml`, else
//! `~/.config/metricwatch/metricwatch.yml`), then environment variables,
//! which always win. The raw config is validated early and resolved into the
//! canonical [`ThresholdPolicy`] before the monitor ever sees it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::threshold::{ThresholdLevel, ThresholdOperator, ThresholdPolicy};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Monitored metric and backend
    pub metric: MetricConfig,

    /// Threshold tiers
    pub thresholds: ThresholdsConfig,

    /// Polling cadence
    pub polling: PollingConfig,

    /// What to substitute when the backend has no value
    #[serde(rename = "missing-value")]
    pub missing_value: MissingValueMode,

    /// Leader election
    pub leadership: LeadershipConfig,

    /// Settings consumed by the built-in actions
    pub actions: ActionSettings,
}

/// Metric and query backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Metric name to query (required)
    pub name: String,

    /// Optional label filters, e.g. `mount="/data",job="node"`
    #[serde(rename = "label-filters")]
    pub label_filters: String,

    /// Prometheus-compatible query endpoint
    pub endpoint: String,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            label_filters: String::new(),
            endpoint: "http://prometheus:9090".to_string(),
        }
    }
}

/// The two optional severity tiers plus the shared operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Comparison direction: `greater_than` or `less_than`
    pub operator: String,

    pub soft: Option<TierConfig>,
    pub hard: Option<TierConfig>,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            operator: "greater_than".to_string(),
            soft: None,
            hard: None,
        }
    }
}

/// One severity tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Trigger value
    pub value: f64,

    /// Name of the built-in action to fire
    pub action: String,

    /// Minimum continuous violation before the tier activates
    #[serde(rename = "sustain-secs")]
    pub sustain_secs: u64,

    /// Minimum time between successful actions for this tier
    #[serde(rename = "cooldown-secs")]
    pub cooldown_secs: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            value: 0.0,
            action: "log".to_string(),
            sustain_secs: 0,
            cooldown_secs: 0,
        }
    }
}

/// Polling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between ticks in milliseconds
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Per-tick sample timeout in milliseconds; a slow query abandons the
    /// tick rather than delaying evaluation indefinitely
    #[serde(rename = "sample-timeout-ms")]
    pub sample_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            sample_timeout_ms: 10_000,
        }
    }
}

/// Substitution policy when a tick produces no value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValueMode {
    /// Reuse the most recent real observation; skip the tick if none exists
    LastValue,
    /// Substitute zero
    #[default]
    Zero,
    /// Treat the missing value as a breach and advance the machine one step
    AssumeBreached,
}

impl std::str::FromStr for MissingValueMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_value" => Ok(Self::LastValue),
            "zero" => Ok(Self::Zero),
            "assume_breached" => Ok(Self::AssumeBreached),
            _ => Err(format!(
                "Unknown missing-value mode: {}. Use: last_value, zero, or assume_breached",
                s
            )),
        }
    }
}

/// Leader election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadershipConfig {
    /// When false, every replica executes actions (single-instance mode)
    pub enabled: bool,

    /// Lock identity shared by all replicas of one deployment
    #[serde(rename = "lock-name")]
    pub lock_name: String,

    /// Directory holding the lease record; must be on storage shared by all
    /// replicas for coordination to mean anything
    #[serde(rename = "lock-dir")]
    pub lock_dir: PathBuf,
}

impl Default for LeadershipConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_name: "metricwatch-leader".to_string(),
            lock_dir: std::env::temp_dir().join("metricwatch"),
        }
    }
}

/// Settings for the built-in actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    /// Output directory for the `file` action
    #[serde(rename = "file-dir")]
    pub file_dir: PathBuf,

    /// File size in bytes for the `file` action
    #[serde(rename = "file-size-bytes")]
    pub file_size_bytes: u64,

    /// Target URL for the `webhook` action
    #[serde(rename = "webhook-url")]
    pub webhook_url: String,

    /// Request timeout for the `webhook` action in milliseconds
    #[serde(rename = "webhook-timeout-ms")]
    pub webhook_timeout_ms: u64,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            file_dir: PathBuf::from("/tmp/metric-files"),
            file_size_bytes: 1024 * 1024,
            webhook_url: String::new(),
            webhook_timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Load configuration with the fallback chain, then apply environment
    /// variable overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".metricwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("metricwatch").join("metricwatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::debug!("No config file found, using environment variables and defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Environment variables override file values, matching the env surface
    /// the sidecar exposes in container deployments
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("METRIC_NAME") {
            self.metric.name = v;
        }
        if let Ok(v) = std::env::var("LABEL_FILTERS") {
            self.metric.label_filters = v;
        }
        if let Ok(v) = std::env::var("PROMETHEUS_ENDPOINT") {
            self.metric.endpoint = v;
        }
        if let Ok(v) = std::env::var("THRESHOLD_OPERATOR") {
            self.thresholds.operator = v;
        }

        Self::apply_tier_env(&mut self.thresholds.soft, "SOFT")?;
        Self::apply_tier_env(&mut self.thresholds.hard, "HARD")?;

        if let Ok(v) = std::env::var("POLLING_INTERVAL_MS") {
            self.polling.interval_ms = parse_env("POLLING_INTERVAL_MS", &v)?;
        }
        if let Ok(v) = std::env::var("SAMPLE_TIMEOUT_MS") {
            self.polling.sample_timeout_ms = parse_env("SAMPLE_TIMEOUT_MS", &v)?;
        }
        if let Ok(v) = std::env::var("MISSING_VALUE_MODE") {
            self.missing_value = v
                .parse()
                .map_err(|e: String| eyre::eyre!("invalid MISSING_VALUE_MODE: {}", e))?;
        }
        if let Ok(v) = std::env::var("LEADER_ELECTION_ENABLED") {
            self.leadership.enabled = parse_env("LEADER_ELECTION_ENABLED", &v)?;
        }
        if let Ok(v) = std::env::var("LEADER_ELECTION_LOCK_NAME") {
            self.leadership.lock_name = v;
        }
        if let Ok(v) = std::env::var("LEADER_ELECTION_LOCK_DIR") {
            self.leadership.lock_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FILE_ACTION_DIR") {
            self.actions.file_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FILE_ACTION_SIZE") {
            self.actions.file_size_bytes = parse_env("FILE_ACTION_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("WEBHOOK_URL") {
            self.actions.webhook_url = v;
        }

        Ok(())
    }

    /// `<PREFIX>_THRESHOLD` creates or overrides a tier; the remaining tier
    /// variables only apply when the tier exists
    fn apply_tier_env(tier: &mut Option<TierConfig>, prefix: &str) -> Result<()> {
        let threshold_var = format!("{}_THRESHOLD", prefix);
        if let Ok(v) = std::env::var(&threshold_var) {
            let value: f64 = parse_env(&threshold_var, &v)?;
            tier.get_or_insert_with(TierConfig::default).value = value;
        }

        let Some(tier) = tier.as_mut() else {
            return Ok(());
        };

        if let Ok(v) = std::env::var(format!("{}_THRESHOLD_ACTION", prefix)) {
            tier.action = v;
        }
        let sustain_var = format!("{}_SUSTAIN_SECS", prefix);
        if let Ok(v) = std::env::var(&sustain_var) {
            tier.sustain_secs = parse_env(&sustain_var, &v)?;
        }
        let cooldown_var = format!("{}_COOLDOWN_SECS", prefix);
        if let Ok(v) = std::env::var(&cooldown_var) {
            tier.cooldown_secs = parse_env(&cooldown_var, &v)?;
        }

        Ok(())
    }

    /// Fail fast with messages naming the offending setting
    pub fn validate(&self) -> Result<()> {
        if self.metric.name.is_empty() {
            return Err(eyre::eyre!(
                "metric name is required. Set metric.name or the METRIC_NAME environment variable."
            ));
        }

        self.thresholds
            .operator
            .parse::<ThresholdOperator>()
            .map_err(|e| eyre::eyre!("invalid thresholds.operator: {}", e))?;

        if self.thresholds.soft.is_none() && self.thresholds.hard.is_none() {
            return Err(eyre::eyre!(
                "no threshold tier configured. Set thresholds.soft and/or thresholds.hard."
            ));
        }

        for (name, tier) in [("soft", &self.thresholds.soft), ("hard", &self.thresholds.hard)] {
            if let Some(tier) = tier {
                if tier.action.is_empty() {
                    return Err(eyre::eyre!("thresholds.{}.action must name an action", name));
                }
            }
        }

        if self.polling.interval_ms == 0 {
            return Err(eyre::eyre!("polling.interval-ms must be greater than zero"));
        }

        Ok(())
    }

    /// Action names referenced by the configured tiers, in tier order
    pub fn required_actions(&self) -> Vec<&str> {
        [&self.thresholds.soft, &self.thresholds.hard]
            .into_iter()
            .flatten()
            .map(|t| t.action.as_str())
            .collect()
    }

    /// Resolve the raw tiers into the canonical policy the state machine
    /// consumes, binding each tier to its validated action
    pub fn build_policy(&self, registry: &HashMap<String, Arc<dyn Action>>) -> Result<ThresholdPolicy> {
        let operator: ThresholdOperator = self
            .thresholds
            .operator
            .parse()
            .map_err(|e| eyre::eyre!("invalid thresholds.operator: {}", e))?;

        let bind = |name: &'static str, tier: &Option<TierConfig>| -> Result<Option<ThresholdLevel>> {
            let Some(tier) = tier else { return Ok(None) };
            let action = registry
                .get(&tier.action)
                .cloned()
                .ok_or_else(|| eyre::eyre!("thresholds.{}.action references unknown action '{}'", name, tier.action))?;
            Ok(Some(ThresholdLevel {
                trigger: tier.value,
                sustain: Duration::from_secs(tier.sustain_secs),
                cooldown: Duration::from_secs(tier.cooldown_secs),
                action,
            }))
        };

        Ok(ThresholdPolicy {
            operator,
            soft: bind("soft", &self.thresholds.soft)?,
            hard: bind("hard", &self.thresholds.hard)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| eyre::eyre!("invalid {} value {:?}: {}", var, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::build_registry;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "METRIC_NAME",
            "LABEL_FILTERS",
            "PROMETHEUS_ENDPOINT",
            "THRESHOLD_OPERATOR",
            "SOFT_THRESHOLD",
            "SOFT_THRESHOLD_ACTION",
            "SOFT_SUSTAIN_SECS",
            "SOFT_COOLDOWN_SECS",
            "HARD_THRESHOLD",
            "HARD_THRESHOLD_ACTION",
            "HARD_SUSTAIN_SECS",
            "HARD_COOLDOWN_SECS",
            "POLLING_INTERVAL_MS",
            "SAMPLE_TIMEOUT_MS",
            "MISSING_VALUE_MODE",
            "LEADER_ELECTION_ENABLED",
            "LEADER_ELECTION_LOCK_NAME",
            "LEADER_ELECTION_LOCK_DIR",
            "FILE_ACTION_DIR",
            "FILE_ACTION_SIZE",
            "WEBHOOK_URL",
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_env();
        let config = Config::default();

        assert_eq!(config.metric.endpoint, "http://prometheus:9090");
        assert_eq!(config.polling.interval_ms, 1_000);
        assert_eq!(config.polling.sample_timeout_ms, 10_000);
        assert_eq!(config.missing_value, MissingValueMode::Zero);
        assert!(config.leadership.enabled);
    }

    #[test]
    #[serial]
    fn test_deserialize_config() {
        let yaml = r#"
metric:
  name: fs_usage_percent
  label-filters: 'mount="/data"'
  endpoint: http://prom.example:9090

thresholds:
  operator: greater_than
  soft:
    value: 80
    action: log
    sustain-secs: 300
    cooldown-secs: 600
  hard:
    value: 95
    action: webhook
    sustain-secs: 60

polling:
  interval-ms: 15000

missing-value: last_value

leadership:
  enabled: true
  lock-name: fs-watcher-leader
  lock-dir: /mnt/shared/locks
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.metric.name, "fs_usage_percent");
        assert_eq!(config.thresholds.soft.as_ref().unwrap().value, 80.0);
        assert_eq!(config.thresholds.soft.as_ref().unwrap().cooldown_secs, 600);
        assert_eq!(config.thresholds.hard.as_ref().unwrap().action, "webhook");
        // Unspecified tier field falls back to its default
        assert_eq!(config.thresholds.hard.as_ref().unwrap().cooldown_secs, 0);
        assert_eq!(config.polling.interval_ms, 15_000);
        assert_eq!(config.missing_value, MissingValueMode::LastValue);
        assert_eq!(config.leadership.lock_name, "fs-watcher-leader");
    }

    #[test]
    #[serial]
    fn test_env_overrides_create_tier() {
        clear_env();
        unsafe {
            std::env::set_var("METRIC_NAME", "queue_depth");
            std::env::set_var("SOFT_THRESHOLD", "100");
            std::env::set_var("SOFT_SUSTAIN_SECS", "30");
            std::env::set_var("MISSING_VALUE_MODE", "assume_breached");
        }

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        clear_env();

        assert_eq!(config.metric.name, "queue_depth");
        let soft = config.thresholds.soft.unwrap();
        assert_eq!(soft.value, 100.0);
        assert_eq!(soft.sustain_secs, 30);
        assert_eq!(soft.action, "log");
        assert_eq!(config.missing_value, MissingValueMode::AssumeBreached);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_an_error() {
        clear_env();
        unsafe { std::env::set_var("SOFT_THRESHOLD", "lots") };

        let mut config = Config::default();
        let err = config.apply_env_overrides().unwrap_err();
        clear_env();

        assert!(err.to_string().contains("SOFT_THRESHOLD"));
    }

    #[test]
    #[serial]
    fn test_validate_requires_metric_name() {
        clear_env();
        let mut config = Config::default();
        config.thresholds.soft = Some(TierConfig::default());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metric name"));
    }

    #[test]
    #[serial]
    fn test_validate_requires_a_tier() {
        clear_env();
        let mut config = Config::default();
        config.metric.name = "cpu".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no threshold tier"));
    }

    #[test]
    #[serial]
    fn test_validate_rejects_bad_operator() {
        clear_env();
        let mut config = Config::default();
        config.metric.name = "cpu".to_string();
        config.thresholds.operator = "between".to_string();
        config.thresholds.soft = Some(TierConfig::default());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("operator"));
    }

    #[test]
    #[serial]
    fn test_build_policy_binds_actions() {
        clear_env();
        let mut config = Config::default();
        config.metric.name = "cpu".to_string();
        config.thresholds.soft = Some(TierConfig {
            value: 80.0,
            action: "log".to_string(),
            sustain_secs: 300,
            cooldown_secs: 60,
        });

        let registry = build_registry(&config.required_actions(), &config.actions).unwrap();
        let policy = config.build_policy(&registry).unwrap();

        let soft = policy.soft.unwrap();
        assert_eq!(soft.trigger, 80.0);
        assert_eq!(soft.sustain, Duration::from_secs(300));
        assert_eq!(soft.action.name(), "log");
        assert!(policy.hard.is_none());
    }

    #[test]
    #[serial]
    fn test_build_policy_rejects_unbound_action() {
        clear_env();
        let mut config = Config::default();
        config.metric.name = "cpu".to_string();
        config.thresholds.soft = Some(TierConfig {
            action: "missing".to_string(),
            ..TierConfig::default()
        });

        let err = config.build_policy(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown action 'missing'"));
    }

    #[test]
    #[serial]
    fn test_missing_value_mode_parsing() {
        assert_eq!("zero".parse::<MissingValueMode>().unwrap(), MissingValueMode::Zero);
        assert_eq!("last_value".parse::<MissingValueMode>().unwrap(), MissingValueMode::LastValue);
        assert_eq!(
            "assume_breached".parse::<MissingValueMode>().unwrap(),
            MissingValueMode::AssumeBreached
        );
        assert!("panic".parse::<MissingValueMode>().is_err());
    }
}
