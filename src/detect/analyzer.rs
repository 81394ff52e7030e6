use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::datasource::Datasets;
use crate::detect::anomaly::score_series;
use crate::detect::series::{self, MetricSnapshot};
use crate::detect::{AnomalyResult, Insights};

pub const SALES_STREAM: &str = "sales_conversion_rate";
pub const MARKETING_STREAM: &str = "marketing_conversion_rate";
pub const SUPPORT_STREAM: &str = "support_ticket_volume";

/// Turns datasets into per-stream anomaly scores.
#[derive(Debug, Clone)]
pub struct AnomalyAnalyzer {
    lookback_days: u32,
    min_samples: usize,
    z_threshold: f64,
}

impl Default for AnomalyAnalyzer {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl AnomalyAnalyzer {
    pub fn from_config(cfg: &AnalysisConfig) -> Self {
        Self {
            lookback_days: cfg.lookback_days,
            min_samples: cfg.min_samples,
            z_threshold: cfg.z_threshold,
        }
    }

    /// Score an already-windowed series.
    pub fn score(&self, stream_id: &str, values: &[f64]) -> AnomalyResult {
        score_series(stream_id, values, self.min_samples, self.z_threshold)
    }

    pub fn score_snapshot(&self, snapshot: MetricSnapshot) -> AnomalyResult {
        let windowed = snapshot.window(self.lookback_days);
        debug!(stream = %windowed.stream_id, days = windowed.len(), "scoring stream");
        self.score(&windowed.stream_id, &windowed.values())
    }

    pub fn analyze(&self, data: &Datasets) -> Insights {
        let sales = self.score_snapshot(series::daily_ratio(SALES_STREAM, data.sales_days()));
        let marketing = self.score_snapshot(series::daily_mean(MARKETING_STREAM, data.marketing_days()));
        let support = self.score_snapshot(series::daily_count(SUPPORT_STREAM, data.support_days()));

        let summary = Insights::summarize(&sales, &marketing, &support);
        info!(%summary, "analysis complete");

        Insights {
            sales,
            marketing,
            support,
            summary,
        }
    }
}
