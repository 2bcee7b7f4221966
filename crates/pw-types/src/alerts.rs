//! Alert types shared by the generator, the store and subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an alert; unique and increasing within one engine.
pub type AlertId = u64;

/// Severity class of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// Unusual but not dangerous activity.
    Info,
    /// Elevated risk; worth a look.
    Warning,
    /// Depeg risk; immediate attention required.
    Critical,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertType::Info => "info",
            AlertType::Warning => "warning",
            AlertType::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// A single alert raised for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub coin: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(id: AlertId, alert_type: AlertType, coin: &str, title: String, message: String) -> Self {
        Self {
            id,
            alert_type,
            title,
            message,
            coin: coin.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_ordering() {
        assert!(AlertType::Info < AlertType::Warning);
        assert!(AlertType::Warning < AlertType::Critical);
    }

    #[test]
    fn alert_json_uses_type_field() {
        let alert = Alert::new(
            7,
            AlertType::Critical,
            "USDT",
            "USDT Critical Risk Detected".into(),
            "Risk score: 7.00 - Immediate attention required".into(),
        );
        let json = serde_json::to_value(&alert).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "critical");
        assert_eq!(json["coin"], "USDT");
        // RFC 3339 string, e.g. 2024-01-01T00:00:00.000Z
        assert!(json["timestamp"].as_str().unwrap().contains('T'));

        let back: Alert = serde_json::from_value(json).unwrap();
        assert_eq!(back, alert);
    }
}
