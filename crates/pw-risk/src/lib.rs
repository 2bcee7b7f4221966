//! Risk scoring and alerting for PegWatch.
//!
//! Provides:
//! - An additive multi-factor depeg risk model with level bands
//! - Alert generation with configurable noise suppression
//! - A bounded, newest-first store of active alerts

pub mod alerts;
pub mod scorer;
pub mod store;

pub use alerts::{AlertGate, AlertGenerator, AlertGeneratorConfig, AlertRule};
pub use scorer::{FactorContribution, RiskFactor, RiskModelConfig, RiskScorer};
pub use store::{AlertStore, DEFAULT_ALERT_CAPACITY};
