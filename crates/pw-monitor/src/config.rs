//! Monitoring engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use pw_data::SimulatedSourceConfig;
use pw_risk::{AlertGeneratorConfig, RiskModelConfig, DEFAULT_ALERT_CAPACITY};
use pw_types::{config_error, PwResult};

/// Environment variable: tick period in milliseconds.
pub const ENV_TICK_MS: &str = "PEGWATCH_TICK_MS";
/// Environment variable: comma separated list of assets to track.
pub const ENV_ASSETS: &str = "PEGWATCH_ASSETS";
/// Environment variable: number of active alerts retained.
pub const ENV_ALERT_CAPACITY: &str = "PEGWATCH_ALERT_CAPACITY";
/// Environment variable: seed for the simulated feed and the alert gate.
pub const ENV_SEED: &str = "PEGWATCH_SEED";

/// Configuration for the monitoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period between ticks.
    pub tick_interval_ms: u64,
    /// Run the first tick as soon as monitoring starts instead of after one
    /// full period.
    pub immediate_first_tick: bool,
    /// Assets tracked by [`crate::MonitoringEngine::start_default`].
    pub default_assets: Vec<String>,
    pub alert_capacity: usize,
    /// Per-asset fetch budget; a slower fetch counts as a failure.
    pub source_timeout_ms: u64,
    /// How long a tick waits for subscribers before moving on.
    pub publish_timeout_ms: u64,
    pub model: RiskModelConfig,
    pub alerts: AlertGeneratorConfig,
    /// Used when the engine builds its own simulated source.
    pub source: SimulatedSourceConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3_000,
            immediate_first_tick: false,
            default_assets: ["USDT", "USDC", "DAI", "FRAX"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            source_timeout_ms: 1_000,
            publish_timeout_ms: 500,
            model: RiskModelConfig::default(),
            alerts: AlertGeneratorConfig::default(),
            source: SimulatedSourceConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PwResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "loaded monitor config");
        Ok(config)
    }

    /// Apply `PEGWATCH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> PwResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> PwResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TICK_MS) {
            self.tick_interval_ms = raw
                .trim()
                .parse()
                .map_err(|e| config_error!("{ENV_TICK_MS}={raw}: {e}"))?;
        }

        if let Some(raw) = lookup(ENV_ASSETS) {
            self.default_assets = parse_asset_list(&raw);
        }

        if let Some(raw) = lookup(ENV_ALERT_CAPACITY) {
            self.alert_capacity = raw
                .trim()
                .parse()
                .map_err(|e| config_error!("{ENV_ALERT_CAPACITY}={raw}: {e}"))?;
        }

        if let Some(raw) = lookup(ENV_SEED) {
            let seed: u64 = raw
                .trim()
                .parse()
                .map_err(|e| config_error!("{ENV_SEED}={raw}: {e}"))?;
            self.source.seed = Some(seed);
            self.alerts.seed = Some(seed);
        }

        self.validate()
    }

    pub fn validate(&self) -> PwResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(config_error!("tick_interval_ms must be greater than zero"));
        }
        if self.alert_capacity == 0 {
            return Err(config_error!("alert_capacity must be greater than zero"));
        }
        if self.source_timeout_ms == 0 {
            return Err(config_error!("source_timeout_ms must be greater than zero"));
        }
        if self.publish_timeout_ms == 0 {
            return Err(config_error!("publish_timeout_ms must be greater than zero"));
        }
        if self.default_assets.is_empty() {
            return Err(config_error!("default_assets must name at least one asset"));
        }
        if self.default_assets.iter().any(|a| a.trim().is_empty()) {
            return Err(config_error!("asset names must not be blank"));
        }

        self.model.validate()?;
        self.alerts.validate()?;
        self.source.validate()?;
        Ok(())
    }
}

/// Split a comma separated list, dropping blanks and repeats.
pub fn parse_asset_list(raw: &str) -> Vec<String> {
    let mut assets: Vec<String> = Vec::new();
    for asset in raw.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        if !assets.iter().any(|a| a == asset) {
            assets.push(asset.to_string());
        }
    }
    assets
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_risk::AlertGate;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_three_second_cadence() {
        let config = MonitorConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(3));
        assert_eq!(config.alert_capacity, 10);
        assert_eq!(config.default_assets, ["USDT", "USDC", "DAI", "FRAX"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_are_applied() {
        let mut config = MonitorConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_TICK_MS, "250"),
                (ENV_ASSETS, "usdt, PYUSD,,usdt "),
                (ENV_ALERT_CAPACITY, "25"),
                (ENV_SEED, "7"),
            ]))
            .unwrap();

        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.default_assets, ["usdt", "PYUSD"]);
        assert_eq!(config.alert_capacity, 25);
        assert_eq!(config.source.seed, Some(7));
        assert_eq!(config.alerts.seed, Some(7));
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut config = MonitorConfig::default();
        assert!(config
            .apply_overrides(lookup(&[(ENV_TICK_MS, "soon")]))
            .is_err());

        let mut config = MonitorConfig::default();
        assert!(config
            .apply_overrides(lookup(&[(ENV_ALERT_CAPACITY, "0")]))
            .is_err());

        let mut config = MonitorConfig::default();
        assert!(config.apply_overrides(lookup(&[(ENV_ASSETS, " , ")])).is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "tick_interval_ms": 1000,
            "default_assets": ["USDT"],
            "alerts": {"gate": {"mode": "always"}}
        }"#;
        let config: MonitorConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.default_assets, ["USDT"]);
        assert_eq!(config.alerts.gate, AlertGate::Always);
        assert_eq!(config.alert_capacity, DEFAULT_ALERT_CAPACITY);
        assert_eq!(config.model, RiskModelConfig::default());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pegwatch.json");
        std::fs::write(&path, r#"{"alert_capacity": 4}"#).unwrap();

        let config = MonitorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.alert_capacity, 4);

        std::fs::write(&path, r#"{"alert_capacity": 0}"#).unwrap();
        assert!(MonitorConfig::from_json_file(&path).is_err());

        assert!(MonitorConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
