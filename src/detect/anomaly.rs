use crate::detect::{AnomalyResult, DetectError};

/// Minimum observations before a stream is scored at all.
pub const MIN_SAMPLES: usize = 5;
/// |z| above this marks the latest observation anomalous.
pub const Z_THRESHOLD: f64 = 2.5;
/// Keeps percent change finite on a zero-mean baseline.
pub const EPSILON: f64 = 1e-9;

/// A simple time series for statistical analysis.
pub struct TimeSeries {
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance (ddof = 0).
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Z = (value - mean) / std_dev over the whole series.
    ///
    /// A constant series has no spread; every value scores 0 there so the
    /// result stays finite and serializable.
    pub fn z_score(&self, value: f64, min_samples: usize) -> Result<f64, DetectError> {
        if self.values.len() < min_samples {
            return Err(DetectError::InsufficientBaseline {
                needed: min_samples,
                have: self.values.len(),
            });
        }
        let std = self.std_dev();
        if std == 0.0 {
            return Ok(0.0);
        }
        Ok((value - self.mean()) / std)
    }

    /// (latest - mean) / (mean + EPSILON)
    pub fn percent_change(&self) -> f64 {
        match self.latest() {
            Some(latest) => {
                let mean = self.mean();
                (latest - mean) / (mean + EPSILON)
            }
            None => 0.0,
        }
    }
}

/// Score the latest observation of `values` against the full series.
///
/// Fewer than `min_samples` observations yields a non-anomalous result with a
/// zero z-score rather than an error.
pub fn score_series(
    stream_id: &str,
    values: &[f64],
    min_samples: usize,
    z_threshold: f64,
) -> AnomalyResult {
    let ts = TimeSeries::new(values.to_vec());
    let Some(latest) = ts.latest() else {
        return AnomalyResult::empty(stream_id);
    };

    let z_score = ts.z_score(latest, min_samples).unwrap_or(0.0);

    AnomalyResult {
        stream_id: stream_id.to_string(),
        latest_value: latest,
        baseline_mean: ts.mean(),
        percent_change: ts.percent_change(),
        z_score,
        is_anomaly: z_score.abs() > z_threshold,
        sample_count: ts.len(),
    }
}
