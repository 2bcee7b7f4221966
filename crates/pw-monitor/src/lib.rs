//! PegWatch monitoring engine.
//!
//! [`MonitoringEngine`] refreshes a set of stablecoins on a fixed cadence:
//! every tick fetches one [`pw_types::Observation`] per asset, scores it,
//! raises alerts and publishes the new snapshot and alert list to
//! subscribers. A failing asset never takes down the tick.
//!
//! ```no_run
//! use pw_monitor::{MonitorConfig, MonitoringEngine};
//!
//! # async fn run() -> pw_types::PwResult<()> {
//! let engine = MonitoringEngine::with_simulated_source(MonitorConfig::default())?;
//! let _sub = engine.subscribe_alerts(|alerts| println!("{} active alerts", alerts.len()));
//! engine.start_default()?;
//! # engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod subscribers;

pub use config::{parse_asset_list, MonitorConfig};
pub use engine::{EngineBuilder, EngineState, MonitoringEngine};
pub use logging::init_tracing;
pub use metrics::PerformanceSimulator;
pub use subscribers::{PublishReport, Subscription, SubscriptionId, SubscriptionKind};
