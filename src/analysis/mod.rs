//! Root-cause correlation over anomaly insights.

pub mod correlation;

pub use correlation::{Correlation, IncidentHistory, Reason, ReasonKind, RootCauseCorrelator, Signals};
