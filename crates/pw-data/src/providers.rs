use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use pw_types::{DataError, Observation, PwResult};

use crate::sources::SimulatedSourceConfig;

/// Trait for market data sources (simulators, exchange APIs, indexers, etc.)
///
/// A source produces one [`Observation`] for one asset on demand. Failures are
/// per asset: returning an error for one asset must not affect the others.
#[async_trait]
pub trait DataSource: Send + Sync + std::fmt::Debug {
    /// Produce the current observation for `asset`.
    async fn fetch(&self, asset: &str) -> Result<Observation, DataError>;

    /// Get source name
    fn name(&self) -> &str;
}

/// Default source: uniformly random values inside configured bounds.
#[derive(Debug)]
pub struct SimulatedSource {
    config: SimulatedSourceConfig,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedSource {
    pub fn new(config: SimulatedSourceConfig) -> PwResult<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(Self {
            config,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: SimulatedSourceConfig::default(),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(rand::random())),
        }
    }

    pub fn config(&self) -> &SimulatedSourceConfig {
        &self.config
    }

    fn sample(&self, asset: &str) -> Observation {
        let mut rng = self.rng.lock();
        Observation {
            name: asset.to_string(),
            price: rng.gen_range(self.config.price.as_range()),
            on_chain_volume: rng.gen_range(self.config.on_chain_volume.as_range()),
            wallet_concentration: rng.gen_range(self.config.wallet_concentration.as_range()),
            market_volatility: rng.gen_range(self.config.market_volatility.as_range()),
            social_sentiment: rng.gen_range(self.config.social_sentiment.as_range()),
        }
    }
}

#[async_trait]
impl DataSource for SimulatedSource {
    async fn fetch(&self, asset: &str) -> Result<Observation, DataError> {
        let observation = self.sample(asset);
        debug!(asset, price = observation.price, "simulated observation");
        Ok(observation)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Serves scripted observations.
///
/// Observations, failures and artificial latency can be changed between
/// ticks, which makes this the source to inject when a run has to be
/// reproducible. Assets without a scripted observation fail with
/// [`DataError::AssetNotFound`].
#[derive(Debug, Default)]
pub struct FixedSource {
    observations: RwLock<HashMap<String, Observation>>,
    failures: RwLock<HashMap<String, String>>,
    delays: RwLock<HashMap<String, Duration>>,
}

impl FixedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let source = Self::new();
        for observation in observations {
            source.set_observation(observation);
        }
        source
    }

    pub fn with_observation(self, observation: Observation) -> Self {
        self.set_observation(observation);
        self
    }

    /// Replace the observation served for `observation.name`.
    pub fn set_observation(&self, observation: Observation) {
        self.observations
            .write()
            .insert(observation.name.clone(), observation);
    }

    /// Make every fetch of `asset` fail until [`FixedSource::clear_failure`].
    pub fn fail_asset(&self, asset: &str, message: &str) {
        self.failures
            .write()
            .insert(asset.to_string(), message.to_string());
    }

    pub fn clear_failure(&self, asset: &str) {
        self.failures.write().remove(asset);
    }

    /// Delay every fetch of `asset` by `delay`.
    pub fn set_delay(&self, asset: &str, delay: Duration) {
        self.delays.write().insert(asset.to_string(), delay);
    }
}

#[async_trait]
impl DataSource for FixedSource {
    async fn fetch(&self, asset: &str) -> Result<Observation, DataError> {
        let delay = self.delays.read().get(asset).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failures.read().get(asset) {
            return Err(DataError::FetchFailed {
                asset: asset.to_string(),
                message: message.clone(),
            });
        }

        self.observations
            .read()
            .get(asset)
            .cloned()
            .ok_or_else(|| DataError::AssetNotFound {
                asset: asset.to_string(),
            })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_source_stays_within_bounds() {
        let config = SimulatedSourceConfig::default().with_seed(7);
        let source = SimulatedSource::new(config.clone()).unwrap();

        for _ in 0..500 {
            let obs = source.fetch("USDT").await.unwrap();
            assert_eq!(obs.name, "USDT");
            assert!(config.price.contains(obs.price));
            assert!(config.on_chain_volume.contains(obs.on_chain_volume));
            assert!(config.wallet_concentration.contains(obs.wallet_concentration));
            assert!(config.market_volatility.contains(obs.market_volatility));
            assert!(config.social_sentiment.contains(obs.social_sentiment));
            assert!(obs.validate().is_ok());
        }
    }

    #[tokio::test]
    async fn simulated_source_is_reproducible_with_seed() {
        let a = SimulatedSource::new(SimulatedSourceConfig::default().with_seed(99)).unwrap();
        let b = SimulatedSource::new(SimulatedSourceConfig::default().with_seed(99)).unwrap();

        for asset in ["USDT", "USDC", "DAI", "FRAX"] {
            assert_eq!(a.fetch(asset).await.unwrap(), b.fetch(asset).await.unwrap());
        }
    }

    #[test]
    fn simulated_source_rejects_invalid_config() {
        let mut config = SimulatedSourceConfig::default();
        config.social_sentiment = crate::sources::SampleRange::new(50.0, 150.0);
        assert!(SimulatedSource::new(config).is_err());
    }

    #[tokio::test]
    async fn fixed_source_serves_and_fails_per_asset() {
        let source = FixedSource::new()
            .with_observation(Observation::at_peg("USDT"))
            .with_observation(Observation::at_peg("USDC"));

        assert_eq!(source.fetch("USDT").await.unwrap().price, 1.0);
        assert_eq!(
            source.fetch("DAI").await,
            Err(DataError::AssetNotFound {
                asset: "DAI".into()
            })
        );

        source.fail_asset("USDC", "feed offline");
        assert!(matches!(
            source.fetch("USDC").await,
            Err(DataError::FetchFailed { .. })
        ));
        assert!(source.fetch("USDT").await.is_ok());

        source.clear_failure("USDC");
        assert!(source.fetch("USDC").await.is_ok());
    }

    #[tokio::test]
    async fn fixed_source_updates_between_fetches() {
        let source = FixedSource::from_observations([Observation::at_peg("FRAX")]);

        let mut depegged = Observation::at_peg("FRAX");
        depegged.price = 0.93;
        source.set_observation(depegged);

        assert_eq!(source.fetch("FRAX").await.unwrap().price, 0.93);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_source_applies_delay() {
        let source = FixedSource::from_observations([Observation::at_peg("DAI")]);
        source.set_delay("DAI", Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        source.fetch("DAI").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
