use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::detect::Insights;
use crate::integrations::{KnowledgeStore, SimilarIncident};
use crate::storage::StoreError;

/// Known root-cause codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    LowCampaignConversion,
    SupportEscalations,
    RecurrentIssue,
    ProductBugOrDegradation,
    CampaignPerformanceIssue,
    SimilarPastIncident,
    #[serde(other)]
    Unknown,
}

impl ReasonKind {
    /// Fixed confidence attached to each code.
    pub fn confidence(self) -> f64 {
        match self {
            ReasonKind::LowCampaignConversion => 0.8,
            ReasonKind::SupportEscalations => 0.75,
            ReasonKind::RecurrentIssue => 0.5,
            ReasonKind::ProductBugOrDegradation => 0.7,
            ReasonKind::CampaignPerformanceIssue => 0.75,
            ReasonKind::SimilarPastIncident => 0.6,
            ReasonKind::Unknown => 0.2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReasonKind::LowCampaignConversion => "low_campaign_conversion",
            ReasonKind::SupportEscalations => "support_escalations",
            ReasonKind::RecurrentIssue => "recurrent_issue",
            ReasonKind::ProductBugOrDegradation => "product_bug_or_degradation",
            ReasonKind::CampaignPerformanceIssue => "campaign_performance_issue",
            ReasonKind::SimilarPastIncident => "similar_past_incident",
            ReasonKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate root cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    #[serde(alias = "reason")]
    pub kind: ReasonKind,
    pub confidence: f64,
    pub detail: String,
}

impl Reason {
    /// A reason carrying its code's fixed confidence.
    pub fn new(kind: ReasonKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            confidence: kind.confidence(),
            detail: detail.into(),
        }
    }
}

/// Stable sort by confidence, highest first. Ties keep emission order.
pub fn rank(reasons: &mut [Reason]) {
    reasons.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Boolean flags extracted from one cycle's insights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub sales_drop: bool,
    pub marketing_drop: bool,
    pub support_spike: bool,
    pub sales_change: f64,
    pub marketing_change: f64,
    pub support_change: f64,
}

impl Signals {
    pub fn from_insights(insights: &Insights, cfg: &AnalysisConfig) -> Self {
        let sales = &insights.sales;
        let marketing = &insights.marketing;
        let support = &insights.support;

        Self {
            sales_drop: sales.percent_change < cfg.sales_drop_threshold,
            marketing_drop: (marketing.is_anomaly && marketing.percent_change < 0.0)
                || marketing.percent_change < cfg.marketing_drop_threshold,
            support_spike: (support.is_anomaly && support.percent_change > 0.0)
                || support.percent_change > cfg.support_spike_threshold,
            sales_change: sales.percent_change,
            marketing_change: marketing.percent_change,
            support_change: support.percent_change,
        }
    }

    pub fn any(&self) -> bool {
        self.sales_drop || self.marketing_drop || self.support_spike
    }
}

/// Lookup of previously persisted incidents.
pub trait IncidentHistory: Send + Sync {
    fn prior_incident_count(&self) -> Result<usize, StoreError>;
}

/// Reasons plus the knowledge-store matches that produced some of them.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub reasons: Vec<Reason>,
    pub similar: Vec<SimilarIncident>,
}

/// Rule table mapping anomaly flags and history to candidate reasons.
#[derive(Debug, Clone)]
pub struct RootCauseCorrelator {
    cfg: AnalysisConfig,
}

impl Default for RootCauseCorrelator {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl RootCauseCorrelator {
    pub fn new(cfg: AnalysisConfig) -> Self {
        Self { cfg }
    }

    /// Candidate reasons in emission order. Never empty.
    pub async fn correlate(
        &self,
        insights: &Insights,
        history: &dyn IncidentHistory,
        knowledge: Option<&dyn KnowledgeStore>,
    ) -> Vec<Reason> {
        self.correlate_detailed(insights, history, knowledge)
            .await
            .reasons
    }

    pub async fn correlate_detailed(
        &self,
        insights: &Insights,
        history: &dyn IncidentHistory,
        knowledge: Option<&dyn KnowledgeStore>,
    ) -> Correlation {
        let signals = Signals::from_insights(insights, &self.cfg);
        debug!(?signals, "correlating");

        let mut reasons = Vec::new();

        if signals.sales_drop {
            if signals.marketing_drop {
                reasons.push(Reason::new(
                    ReasonKind::LowCampaignConversion,
                    format!("marketing_pct_change={:.4}", signals.marketing_change),
                ));
            }
            if signals.support_spike {
                reasons.push(Reason::new(
                    ReasonKind::SupportEscalations,
                    format!("support_increase_pct={:.4}", signals.support_change),
                ));
            }
            match history.prior_incident_count() {
                Ok(0) => {}
                Ok(n) => reasons.push(Reason::new(
                    ReasonKind::RecurrentIssue,
                    format!("past_count={}", n),
                )),
                Err(e) => warn!(error = %e, "incident history unavailable, skipping recurrence check"),
            }
        } else {
            if signals.support_spike {
                reasons.push(Reason::new(
                    ReasonKind::ProductBugOrDegradation,
                    "support spike without sales drop",
                ));
            }
            if signals.marketing_drop {
                reasons.push(Reason::new(
                    ReasonKind::CampaignPerformanceIssue,
                    "marketing conversion decreased",
                ));
            }
        }

        let mut similar = Vec::new();
        if let (true, Some(store)) = (signals.any(), knowledge) {
            match store.search(&insights.summary, self.cfg.similar_top_n).await {
                Ok(matches) => {
                    for m in &matches {
                        reasons.push(Reason::new(
                            ReasonKind::SimilarPastIncident,
                            format!("{}: {}", m.id, m.summary),
                        ));
                    }
                    similar = matches;
                }
                Err(e) => warn!(error = %e, "similarity search failed, continuing without it"),
            }
        }

        if reasons.is_empty() {
            reasons.push(Reason::new(ReasonKind::Unknown, "no strong correlations found"));
        }

        info!(count = reasons.len(), "root causes correlated");
        Correlation { reasons, similar }
    }
}
