use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::market::Observation;

/// Risk classification, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of scoring one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: f64,
    pub level: RiskLevel,
    pub reason: String,
}

/// A scored observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub data: Observation,
    pub risk: RiskScore,
    pub timestamp: DateTime<Utc>,
}

impl Analysis {
    pub fn new(data: Observation, risk: RiskScore) -> Self {
        Self {
            data,
            risk,
            timestamp: Utc::now(),
        }
    }

    pub fn asset(&self) -> &str {
        &self.data.name
    }
}

/// Latest analysis per asset.
///
/// Keys are unique. Iteration follows the order in which assets first
/// appeared, which is the order a dashboard displays them in. Serializes as a
/// JSON object keyed by asset name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSnapshot {
    entries: Vec<Analysis>,
}

impl AnalysisSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, asset: &str) -> Option<&Analysis> {
        self.entries.iter().find(|a| a.asset() == asset)
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.get(asset).is_some()
    }

    /// Insert or overwrite the analysis for its asset, keeping its position.
    pub fn upsert(&mut self, analysis: Analysis) {
        match self.entries.iter_mut().find(|a| a.asset() == analysis.asset()) {
            Some(slot) => *slot = analysis,
            None => self.entries.push(analysis),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Analysis> {
        self.entries.iter()
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|a| a.asset())
    }

    /// Highest risk level currently present, if any asset is tracked.
    pub fn max_level(&self) -> Option<RiskLevel> {
        self.entries.iter().map(|a| a.risk.level).max()
    }

    pub fn into_vec(self) -> Vec<Analysis> {
        self.entries
    }
}

impl FromIterator<Analysis> for AnalysisSnapshot {
    fn from_iter<I: IntoIterator<Item = Analysis>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for analysis in iter {
            snapshot.upsert(analysis);
        }
        snapshot
    }
}

impl Serialize for AnalysisSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for analysis in &self.entries {
            map.serialize_entry(analysis.asset(), analysis)?;
        }
        map.end()
    }
}
