use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::DataError;

/// Price every tracked stablecoin is pegged to.
pub const PEG_PRICE: f64 = 1.0;

/// Raw market sample for one asset, taken once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub name: String,
    pub price: f64,
    pub on_chain_volume: f64,
    /// Share of supply held by the largest wallets, 0..=1.
    pub wallet_concentration: f64,
    pub market_volatility: f64,
    /// Aggregate social sentiment, 0..=100.
    pub social_sentiment: f64,
}

impl Observation {
    pub fn new(
        name: &str,
        price: f64,
        on_chain_volume: f64,
        wallet_concentration: f64,
        market_volatility: f64,
        social_sentiment: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            price,
            on_chain_volume,
            wallet_concentration,
            market_volatility,
            social_sentiment,
        }
    }

    /// An observation sitting exactly on the peg with calm market conditions.
    pub fn at_peg(name: &str) -> Self {
        Self::new(name, PEG_PRICE, 1_000_000.0, 0.05, 0.02, 75.0)
    }

    /// Signed deviation from the peg as a percentage (1.012 -> 1.2).
    pub fn peg_deviation_pct(&self) -> f64 {
        (self.price - PEG_PRICE) * 100.0
    }

    /// Check that every field is finite and inside its documented domain.
    pub fn validate(&self) -> Result<(), DataError> {
        let fields = [
            ("price", self.price),
            ("onChainVolume", self.on_chain_volume),
            ("walletConcentration", self.wallet_concentration),
            ("marketVolatility", self.market_volatility),
            ("socialSentiment", self.social_sentiment),
        ];
        if let Some((field, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(self.invalid(format!("{field} is not finite ({value})")));
        }

        if self.price <= 0.0 {
            return Err(self.invalid(format!("price must be positive, got {}", self.price)));
        }
        if self.on_chain_volume < 0.0 {
            return Err(self.invalid(format!(
                "onChainVolume must be non-negative, got {}",
                self.on_chain_volume
            )));
        }
        if !(0.0..=1.0).contains(&self.wallet_concentration) {
            return Err(self.invalid(format!(
                "walletConcentration must be within [0, 1], got {}",
                self.wallet_concentration
            )));
        }
        if self.market_volatility < 0.0 {
            return Err(self.invalid(format!(
                "marketVolatility must be non-negative, got {}",
                self.market_volatility
            )));
        }
        if !(0.0..=100.0).contains(&self.social_sentiment) {
            return Err(self.invalid(format!(
                "socialSentiment must be within [0, 100], got {}",
                self.social_sentiment
            )));
        }

        Ok(())
    }

    fn invalid(&self, message: String) -> DataError {
        DataError::InvalidObservation {
            asset: self.name.clone(),
            message,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} price={:.4} volume={:.2}M concentration={:.3} volatility={:.3} sentiment={:.1}",
            self.name,
            self.price,
            self.on_chain_volume / 1e6,
            self.wallet_concentration,
            self.market_volatility,
            self.social_sentiment,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peg_deviation() {
        let mut obs = Observation::at_peg("USDT");
        assert_eq!(obs.peg_deviation_pct(), 0.0);

        obs.price = 0.97;
        assert!((obs.peg_deviation_pct() + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_accepts_domain_edges() {
        let obs = Observation::new("DAI", 1.0, 0.0, 1.0, 0.0, 100.0);
        assert!(obs.validate().is_ok());

        let obs = Observation::new("DAI", 0.0001, 0.0, 0.0, 0.0, 0.0);
        assert!(obs.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_domain() {
        let bad = [
            Observation::new("X", 0.0, 1.0, 0.1, 0.01, 50.0),
            Observation::new("X", 1.0, -1.0, 0.1, 0.01, 50.0),
            Observation::new("X", 1.0, 1.0, 1.5, 0.01, 50.0),
            Observation::new("X", 1.0, 1.0, 0.1, -0.01, 50.0),
            Observation::new("X", 1.0, 1.0, 0.1, 0.01, 101.0),
            Observation::new("X", f64::NAN, 1.0, 0.1, 0.01, 50.0),
            Observation::new("X", 1.0, f64::INFINITY, 0.1, 0.01, 50.0),
        ];

        for obs in bad {
            match obs.validate() {
                Err(DataError::InvalidObservation { asset, .. }) => assert_eq!(asset, "X"),
                other => panic!("expected invalid observation for {obs:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_serializes_with_camel_case_fields() {
        let obs = Observation::new("USDC", 1.001, 1_200_000.0, 0.07, 0.03, 64.0);
        let json = serde_json::to_value(&obs).unwrap();

        assert_eq!(json["name"], "USDC");
        assert_eq!(json["onChainVolume"], 1_200_000.0);
        assert_eq!(json["walletConcentration"], 0.07);
        assert_eq!(json["marketVolatility"], 0.03);
        assert_eq!(json["socialSentiment"], 64.0);
    }
}
