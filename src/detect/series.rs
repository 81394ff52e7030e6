//! Daily metric streams derived from raw records.
//!
//! Three shapes are supported: a ratio of matching rows per calendar day, a
//! mean of a pre-aggregated value per day, and a plain count per day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One named daily series, ordered by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub stream_id: String,
    pub points: Vec<(NaiveDate, f64)>,
}

impl MetricSnapshot {
    pub fn new(stream_id: impl Into<String>, points: Vec<(NaiveDate, f64)>) -> Self {
        Self {
            stream_id: stream_id.into(),
            points,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keep only the last `days` calendar days, counted back from the newest point.
    pub fn window(mut self, days: u32) -> Self {
        if let Some(&(last, _)) = self.points.last() {
            let start = last - chrono::Duration::days(i64::from(days.saturating_sub(1)));
            self.points.retain(|(d, _)| *d >= start);
        }
        self
    }
}

/// Share of rows per day for which `hit` is true. The denominator is at least 1.
pub fn daily_ratio<I>(stream_id: &str, rows: I) -> MetricSnapshot
where
    I: IntoIterator<Item = (NaiveDate, bool)>,
{
    let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
    for (day, hit) in rows {
        let entry = days.entry(day).or_default();
        entry.1 += 1;
        if hit {
            entry.0 += 1;
        }
    }
    let points = days
        .into_iter()
        .map(|(d, (hits, total))| (d, hits as f64 / total.max(1) as f64))
        .collect();
    MetricSnapshot::new(stream_id, points)
}

/// Mean of the values reported for each day.
pub fn daily_mean<I>(stream_id: &str, rows: I) -> MetricSnapshot
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut days: BTreeMap<NaiveDate, (f64, u64)> = BTreeMap::new();
    for (day, value) in rows {
        let entry = days.entry(day).or_default();
        entry.0 += value;
        entry.1 += 1;
    }
    let points = days
        .into_iter()
        .map(|(d, (sum, n))| (d, sum / n as f64))
        .collect();
    MetricSnapshot::new(stream_id, points)
}

/// Number of rows per day.
pub fn daily_count<I>(stream_id: &str, days: I) -> MetricSnapshot
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for day in days {
        *counts.entry(day).or_default() += 1;
    }
    let points = counts.into_iter().map(|(d, n)| (d, n as f64)).collect();
    MetricSnapshot::new(stream_id, points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_daily_ratio() {
        let rows = vec![
            (day(2), true),
            (day(1), true),
            (day(1), false),
            (day(2), false),
            (day(2), false),
            (day(2), true),
        ];
        let s = daily_ratio("sales", rows);
        assert_eq!(s.points, vec![(day(1), 0.5), (day(2), 0.5)]);
    }

    #[test]
    fn test_daily_mean() {
        let s = daily_mean("mkt", vec![(day(1), 0.2), (day(1), 0.4), (day(3), 0.1)]);
        assert_eq!(s.len(), 2);
        assert!((s.points[0].1 - 0.3).abs() < 1e-12);
        assert_eq!(s.points[1], (day(3), 0.1));
    }

    #[test]
    fn test_daily_count_sorted_by_date() {
        let s = daily_count("support", vec![day(5), day(2), day(5), day(5)]);
        assert_eq!(s.values(), vec![1.0, 3.0]);
        assert_eq!(s.points[0].0, day(2));
    }

    #[test]
    fn test_window_keeps_last_days() {
        let s = daily_count("support", (1..=20).map(day));
        let w = s.window(14);
        assert_eq!(w.len(), 14);
        assert_eq!(w.points[0].0, day(7));
        assert_eq!(w.points[13].0, day(20));
    }
}
