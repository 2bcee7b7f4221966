//! Alert generation: turns a scored analysis into at most one alert.
//!
//! Rules are checked in priority order and the first one that fires wins:
//!
//! 1. Critical level: always a `critical` alert.
//! 2. High level: a `warning` alert, subject to the [`AlertGate`].
//! 3. Elevated on-chain volume: an `info` alert, subject to the [`AlertGate`].
//!
//! A gated rule that is suppressed falls through to the next rule.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use pw_types::{config_error, Alert, AlertId, AlertType, Analysis, PwResult, RiskLevel};

/// Noise suppression applied to the non-critical rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AlertGate {
    /// Each qualifying evaluation fires with a fixed probability.
    Probabilistic {
        high_risk_probability: f64,
        high_volume_probability: f64,
    },
    /// A rule fires for an asset at most once every `ticks` evaluations of
    /// that asset.
    Cooldown { ticks: u64 },
    /// Every qualifying evaluation fires.
    Always,
}

impl Default for AlertGate {
    fn default() -> Self {
        AlertGate::Probabilistic {
            high_risk_probability: 0.3,
            high_volume_probability: 0.2,
        }
    }
}

impl AlertGate {
    pub fn validate(&self) -> PwResult<()> {
        match self {
            AlertGate::Probabilistic {
                high_risk_probability,
                high_volume_probability,
            } => {
                for (name, p) in [
                    ("high_risk_probability", high_risk_probability),
                    ("high_volume_probability", high_volume_probability),
                ] {
                    // Zero would silence the rule entirely.
                    if !(*p > 0.0 && *p <= 1.0) {
                        return Err(config_error!("{name} must be within (0, 1], got {p}"));
                    }
                }
                Ok(())
            }
            AlertGate::Cooldown { ticks } if *ticks == 0 => {
                Err(config_error!("cooldown must be at least one tick"))
            }
            AlertGate::Cooldown { .. } | AlertGate::Always => Ok(()),
        }
    }
}

/// Gated alert rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertRule {
    HighRisk,
    HighVolume,
}

/// Configuration for the alert generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertGeneratorConfig {
    /// On-chain volume above this raises an informational alert.
    pub elevated_volume_threshold: f64,
    pub gate: AlertGate,
    /// Fixed RNG seed for the probabilistic gate. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for AlertGeneratorConfig {
    fn default() -> Self {
        Self {
            elevated_volume_threshold: 1.8e6,
            gate: AlertGate::default(),
            seed: None,
        }
    }
}

impl AlertGeneratorConfig {
    pub fn validate(&self) -> PwResult<()> {
        if !self.elevated_volume_threshold.is_finite() || self.elevated_volume_threshold < 0.0 {
            return Err(config_error!(
                "elevated_volume_threshold must be finite and non-negative"
            ));
        }
        self.gate.validate()
    }
}

/// Per-asset evaluation history used by the cooldown gate.
#[derive(Debug, Default)]
struct AssetHistory {
    evaluations: u64,
    last_fired: HashMap<AlertRule, u64>,
}

/// Produces alerts from analyses and hands out alert ids.
///
/// Ids start at 1, increase by one per alert and are never reused by the same
/// generator.
#[derive(Debug)]
pub struct AlertGenerator {
    config: AlertGeneratorConfig,
    rng: ChaCha8Rng,
    next_id: AlertId,
    history: HashMap<String, AssetHistory>,
}

impl AlertGenerator {
    pub fn new(config: AlertGeneratorConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 1,
            history: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AlertGeneratorConfig {
        &self.config
    }

    /// Id the next alert will receive.
    pub fn peek_next_id(&self) -> AlertId {
        self.next_id
    }

    /// Evaluate one analysis. Returns at most one alert.
    pub fn generate(&mut self, analysis: &Analysis) -> Option<Alert> {
        let coin = analysis.asset().to_string();
        let evaluation = {
            let history = self.history.entry(coin.clone()).or_default();
            history.evaluations += 1;
            history.evaluations
        };

        let data = &analysis.data;
        let risk = &analysis.risk;

        if risk.level == RiskLevel::Critical {
            let alert = self.issue(
                AlertType::Critical,
                &coin,
                format!("{coin} Critical Risk Detected"),
                format!(
                    "Risk score: {:.2} - Immediate attention required",
                    risk.score
                ),
            );
            warn!(coin = %coin, score = risk.score, id = alert.id, "critical alert raised");
            return Some(alert);
        }

        if risk.level == RiskLevel::High && self.pass_gate(AlertRule::HighRisk, &coin, evaluation) {
            let alert = self.issue(
                AlertType::Warning,
                &coin,
                format!("{coin} High Risk Alert"),
                format!("Price deviation: {:.3}%", data.peg_deviation_pct()),
            );
            warn!(coin = %coin, score = risk.score, id = alert.id, "high risk alert raised");
            return Some(alert);
        }

        if data.on_chain_volume > self.config.elevated_volume_threshold
            && self.pass_gate(AlertRule::HighVolume, &coin, evaluation)
        {
            let alert = self.issue(
                AlertType::Info,
                &coin,
                format!("{coin} High Volume Activity"),
                format!(
                    "Unusual on-chain volume detected: {:.2}M",
                    data.on_chain_volume / 1e6
                ),
            );
            info!(coin = %coin, volume = data.on_chain_volume, id = alert.id, "volume alert raised");
            return Some(alert);
        }

        None
    }

    /// Forget per-asset history (cooldowns restart). Ids keep increasing.
    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    fn pass_gate(&mut self, rule: AlertRule, coin: &str, evaluation: u64) -> bool {
        let passed = match self.config.gate {
            AlertGate::Always => true,
            AlertGate::Probabilistic {
                high_risk_probability,
                high_volume_probability,
            } => {
                let p = match rule {
                    AlertRule::HighRisk => high_risk_probability,
                    AlertRule::HighVolume => high_volume_probability,
                };
                self.rng.gen_bool(p.clamp(0.0, 1.0))
            }
            AlertGate::Cooldown { ticks } => {
                let history = self.history.entry(coin.to_string()).or_default();
                let ready = history
                    .last_fired
                    .get(&rule)
                    .map_or(true, |last| evaluation - last >= ticks);
                if ready {
                    history.last_fired.insert(rule, evaluation);
                }
                ready
            }
        };

        if !passed {
            debug!(coin, rule = ?rule, "alert suppressed by gate");
        }
        passed
    }

    fn issue(&mut self, alert_type: AlertType, coin: &str, title: String, message: String) -> Alert {
        let id = self.next_id;
        self.next_id += 1;
        Alert::new(id, alert_type, coin, title, message)
    }
}
