use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of an upstream data feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Healthy,
    Warning,
}

/// One row of the data source health table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceHealth {
    pub name: String,
    pub status: SourceStatus,
    /// Display string such as "99.9%".
    pub uptime: String,
}

impl DataSourceHealth {
    pub fn new(name: &str, status: SourceStatus, uptime: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            uptime: uptime.to_string(),
        }
    }
}

/// Headline performance figures shown on the dashboard.
///
/// These are illustrative values produced by a simulator, not measurements of
/// the pipeline. See [`EngineStats`] for measured counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Points processed per second.
    pub data_processing_speed: f64,
    /// Milliseconds from detection to alert.
    pub alert_latency: f64,
    /// Percent.
    pub prediction_accuracy: f64,
    pub data_sources: Vec<DataSourceHealth>,
}

/// Counters measured by the monitoring engine itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub ticks_completed: u64,
    pub assets_refreshed: u64,
    pub asset_failures: u64,
    pub alerts_raised: u64,
    pub subscriber_failures: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}
