use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use pw_types::{config_error, PwResult};

/// Closed sampling interval for one simulated field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRange {
    pub min: f64,
    pub max: f64,
}

impl SampleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn as_range(&self) -> RangeInclusive<f64> {
        self.min..=self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        self.as_range().contains(&value)
    }
}

/// Sampling ranges for the simulated market feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedSourceConfig {
    pub price: SampleRange,
    pub on_chain_volume: SampleRange,
    pub wallet_concentration: SampleRange,
    pub market_volatility: SampleRange,
    pub social_sentiment: SampleRange,
    /// Fixed seed for reproducible runs. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulatedSourceConfig {
    fn default() -> Self {
        Self {
            price: SampleRange::new(0.95, 1.05),
            on_chain_volume: SampleRange::new(800_000.0, 2_000_000.0),
            wallet_concentration: SampleRange::new(0.05, 0.12),
            market_volatility: SampleRange::new(0.02, 0.08),
            social_sentiment: SampleRange::new(20.0, 100.0),
            seed: None,
        }
    }
}

impl SimulatedSourceConfig {
    /// A calm market: every sample lands inside the no-risk band.
    pub fn calm() -> Self {
        Self {
            price: SampleRange::new(0.99, 1.01),
            on_chain_volume: SampleRange::new(500_000.0, 1_000_000.0),
            wallet_concentration: SampleRange::new(0.02, 0.06),
            market_volatility: SampleRange::new(0.005, 0.03),
            social_sentiment: SampleRange::new(60.0, 95.0),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> PwResult<()> {
        let ranges = [
            ("price", self.price, f64::MIN_POSITIVE, f64::MAX),
            ("on_chain_volume", self.on_chain_volume, 0.0, f64::MAX),
            ("wallet_concentration", self.wallet_concentration, 0.0, 1.0),
            ("market_volatility", self.market_volatility, 0.0, f64::MAX),
            ("social_sentiment", self.social_sentiment, 0.0, 100.0),
        ];

        for (field, range, lower, upper) in ranges {
            if !range.min.is_finite() || !range.max.is_finite() {
                return Err(config_error!("{field} range must be finite"));
            }
            if range.min > range.max {
                return Err(config_error!(
                    "{field} range is inverted: {} > {}",
                    range.min,
                    range.max
                ));
            }
            if range.min < lower || range.max > upper {
                return Err(config_error!(
                    "{field} range [{}, {}] falls outside [{lower}, {upper}]",
                    range.min,
                    range.max
                ));
            }
        }

        Ok(())
    }
}
