//! Anomaly scoring over daily business metric streams.

pub mod analyzer;
pub mod anomaly;
pub mod incident;
pub mod series;

pub use analyzer::AnomalyAnalyzer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("insufficient baseline data: need {needed} samples, have {have}")]
    InsufficientBaseline { needed: usize, have: usize },
}

/// Score of one metric stream against its own history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub stream_id: String,
    pub latest_value: f64,
    pub baseline_mean: f64,
    pub percent_change: f64,
    pub z_score: f64,
    pub is_anomaly: bool,
    pub sample_count: usize,
}

impl AnomalyResult {
    /// A quiet result for a stream that has no observations at all.
    pub fn empty(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            latest_value: 0.0,
            baseline_mean: 0.0,
            percent_change: 0.0,
            z_score: 0.0,
            is_anomaly: false,
            sample_count: 0,
        }
    }
}

/// Everything the analyzer learned in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub sales: AnomalyResult,
    pub marketing: AnomalyResult,
    pub support: AnomalyResult,
    pub summary: String,
}

impl Insights {
    pub fn streams(&self) -> [&AnomalyResult; 3] {
        [&self.sales, &self.marketing, &self.support]
    }

    pub fn any_anomaly(&self) -> bool {
        self.streams().iter().any(|s| s.is_anomaly)
    }

    /// Human-readable summary line, e.g. "Sales anomaly detected | Support spike anomaly detected".
    pub fn summarize(sales: &AnomalyResult, marketing: &AnomalyResult, support: &AnomalyResult) -> String {
        let mut parts = Vec::new();
        if sales.is_anomaly {
            parts.push("Sales anomaly detected");
        }
        if marketing.is_anomaly {
            parts.push("Marketing anomaly detected");
        }
        if support.is_anomaly {
            parts.push("Support spike anomaly detected");
        }
        if parts.is_empty() {
            "No major anomalies".to_string()
        } else {
            parts.join(" | ")
        }
    }
}
