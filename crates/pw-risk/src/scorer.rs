//! Multi-factor depeg risk model.
//!
//! [`RiskScorer`] maps an [`Observation`] to a [`RiskScore`]. Each factor is an
//! independent threshold check that adds a fixed weight when it fires; the
//! total is then classified into a [`RiskLevel`] band.

use serde::{Deserialize, Serialize};
use std::fmt;

use pw_types::{config_error, Observation, PwResult, RiskLevel, RiskScore};

/// Explanation attached to every score produced by the default model.
pub const DEFAULT_REASON: &str = "Calculated based on multi-factor model";

/// Thresholds and weights of the risk model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskModelConfig {
    /// Price below this is a depeg.
    pub peg_lower: f64,
    /// Price above this is a depeg.
    pub peg_upper: f64,
    pub depeg_weight: f64,

    pub volume_threshold: f64,
    pub volume_weight: f64,

    pub concentration_threshold: f64,
    pub concentration_weight: f64,

    pub volatility_threshold: f64,
    pub volatility_weight: f64,

    /// Sentiment strictly below this floor adds risk.
    pub sentiment_floor: f64,
    pub sentiment_weight: f64,

    // Level bands; a score must be strictly greater to enter a band.
    pub medium_above: f64,
    pub high_above: f64,
    pub critical_above: f64,
}

impl Default for RiskModelConfig {
    fn default() -> Self {
        Self {
            peg_lower: 0.98,
            peg_upper: 1.02,
            depeg_weight: 2.0,
            volume_threshold: 1.5e6,
            volume_weight: 1.5,
            concentration_threshold: 0.08,
            concentration_weight: 1.0,
            volatility_threshold: 0.04,
            volatility_weight: 1.0,
            sentiment_floor: 40.0,
            sentiment_weight: 0.5,
            medium_above: 3.0,
            high_above: 5.0,
            critical_above: 6.5,
        }
    }
}

impl RiskModelConfig {
    /// Largest score the model can produce (every factor firing).
    pub fn max_score(&self) -> f64 {
        self.depeg_weight
            + self.volume_weight
            + self.concentration_weight
            + self.volatility_weight
            + self.sentiment_weight
    }

    pub fn validate(&self) -> PwResult<()> {
        if self.peg_lower >= self.peg_upper {
            return Err(config_error!(
                "peg band is empty: lower {} >= upper {}",
                self.peg_lower,
                self.peg_upper
            ));
        }

        let weights = [
            self.depeg_weight,
            self.volume_weight,
            self.concentration_weight,
            self.volatility_weight,
            self.sentiment_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(config_error!("factor weights must be finite and non-negative"));
        }

        if !(self.medium_above <= self.high_above && self.high_above <= self.critical_above) {
            return Err(config_error!(
                "level bands must be ascending: medium {} / high {} / critical {}",
                self.medium_above,
                self.high_above,
                self.critical_above
            ));
        }

        Ok(())
    }
}

/// Individual risk factors of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactor {
    /// Price outside the peg band.
    Depeg,
    /// On-chain volume above the high-activity threshold.
    HighVolume,
    /// Supply concentrated in few wallets.
    WalletConcentration,
    /// Market volatility above threshold.
    Volatility,
    /// Social sentiment below the floor.
    NegativeSentiment,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskFactor::Depeg => "price off peg",
            RiskFactor::HighVolume => "high on-chain volume",
            RiskFactor::WalletConcentration => "wallet concentration",
            RiskFactor::Volatility => "market volatility",
            RiskFactor::NegativeSentiment => "negative sentiment",
        };
        write!(f, "{}", s)
    }
}

/// A factor that fired, with what it added to the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub factor: RiskFactor,
    pub observed: f64,
    pub weight: f64,
}

/// Stateless scorer for the additive risk model.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    config: RiskModelConfig,
}

impl RiskScorer {
    pub fn new(config: RiskModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskModelConfig {
        &self.config
    }

    /// Score an observation. Pure and deterministic.
    pub fn score(&self, observation: &Observation) -> RiskScore {
        let score = self
            .breakdown(observation)
            .iter()
            .fold(0.0, |acc, c| acc + c.weight);

        RiskScore {
            score,
            level: self.level_for(score),
            reason: DEFAULT_REASON.to_string(),
        }
    }

    /// Factors that fire for `observation`, in model order.
    pub fn breakdown(&self, observation: &Observation) -> Vec<FactorContribution> {
        let c = &self.config;
        let checks = [
            (
                RiskFactor::Depeg,
                observation.price,
                observation.price < c.peg_lower || observation.price > c.peg_upper,
                c.depeg_weight,
            ),
            (
                RiskFactor::HighVolume,
                observation.on_chain_volume,
                observation.on_chain_volume > c.volume_threshold,
                c.volume_weight,
            ),
            (
                RiskFactor::WalletConcentration,
                observation.wallet_concentration,
                observation.wallet_concentration > c.concentration_threshold,
                c.concentration_weight,
            ),
            (
                RiskFactor::Volatility,
                observation.market_volatility,
                observation.market_volatility > c.volatility_threshold,
                c.volatility_weight,
            ),
            (
                RiskFactor::NegativeSentiment,
                observation.social_sentiment,
                observation.social_sentiment < c.sentiment_floor,
                c.sentiment_weight,
            ),
        ];

        checks
            .into_iter()
            .filter(|(_, _, fired, _)| *fired)
            .map(|(factor, observed, _, weight)| FactorContribution {
                factor,
                observed,
                weight,
            })
            .collect()
    }

    /// Classify a score. Bands are applied in ascending order and a later
    /// match overrides an earlier one, so the highest band reached wins.
    pub fn level_for(&self, score: f64) -> RiskLevel {
        let mut level = RiskLevel::Low;
        if score > self.config.medium_above {
            level = RiskLevel::Medium;
        }
        if score > self.config.high_above {
            level = RiskLevel::High;
        }
        if score > self.config.critical_above {
            level = RiskLevel::Critical;
        }
        level
    }

    /// Human-readable list of the factors behind a score, e.g.
    /// "price off peg (+2.0), negative sentiment (+0.5)".
    pub fn explain(&self, observation: &Observation) -> String {
        let parts: Vec<String> = self
            .breakdown(observation)
            .iter()
            .map(|c| format!("{} (+{:.1})", c.factor, c.weight))
            .collect();

        if parts.is_empty() {
            "no risk factors".to_string()
        } else {
            parts.join(", ")
        }
    }
}
