//! Remediation plans: the static rule table and the optional refinement step.

pub mod builder;
pub mod refiner;

pub use builder::PlanBuilder;
pub use refiner::{PlanRefiner, Reasoner, RefineError};

use serde::{Deserialize, Serialize};

use crate::analysis::ReasonKind;

/// Substrings that mark a free-text action name as high risk.
pub const HIGH_RISK_KEYWORDS: &[&str] = &["restart", "reboot", "shutdown", "delete", "rollback"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Routine,
    /// Requires human approval before it runs.
    High,
}

impl RiskLevel {
    /// Legacy classifier for action names that arrive without a risk tag.
    pub fn classify(action: &str) -> Self {
        let lower = action.to_lowercase();
        if HIGH_RISK_KEYWORDS.iter().any(|k| lower.contains(k)) {
            RiskLevel::High
        } else {
            RiskLevel::Routine
        }
    }

    /// Interpret a refiner's free-text risk assessment ("High: may drop sessions").
    pub fn from_assessment(text: &str) -> Option<Self> {
        let first = text
            .trim_start()
            .split(|c: char| !c.is_alphanumeric())
            .next()?
            .to_lowercase();
        match first.as_str() {
            "high" | "critical" => Some(RiskLevel::High),
            "low" | "medium" | "none" => Some(RiskLevel::Routine),
            _ => None,
        }
    }
}

fn default_kind() -> ReasonKind {
    ReasonKind::Unknown
}

fn default_owner() -> String {
    "unassigned".to_string()
}

fn default_confidence() -> f64 {
    0.5
}

/// One step of a remediation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    #[serde(default = "default_kind", alias = "reason")]
    pub reason_kind: ReasonKind,
    pub action: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl PlanItem {
    pub fn new(kind: ReasonKind, action: &str, owner: &str, note: &str, impact: &str, confidence: f64) -> Self {
        Self {
            reason_kind: kind,
            action: action.to_string(),
            owner: owner.to_string(),
            note: note.to_string(),
            impact: impact.to_string(),
            confidence,
            risk: RiskLevel::classify(action),
            target: None,
            priority: None,
            risk_assessment: None,
            reasoning: None,
        }
    }

    /// Tagged high risk, or an action name from the high-risk vocabulary.
    pub fn is_high_risk(&self) -> bool {
        self.risk == RiskLevel::High || RiskLevel::classify(&self.action) == RiskLevel::High
    }

    /// Text used as the "reason" in notifications.
    pub fn rationale(&self) -> &str {
        match self.reasoning.as_deref() {
            Some(r) if !r.is_empty() => r,
            _ => &self.note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_case_insensitive_substring() {
        assert_eq!(RiskLevel::classify("Rollback_Release"), RiskLevel::High);
        assert_eq!(RiskLevel::classify("restart_server"), RiskLevel::High);
        assert_eq!(RiskLevel::classify("open_bug"), RiskLevel::Routine);
    }

    #[test]
    fn test_from_assessment() {
        assert_eq!(RiskLevel::from_assessment("High - may drop sessions"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::from_assessment("low"), Some(RiskLevel::Routine));
        assert_eq!(RiskLevel::from_assessment("depends on traffic"), None);
        assert_eq!(RiskLevel::from_assessment(""), None);
    }

    #[test]
    fn test_minimal_item_decodes_with_defaults() {
        let item: PlanItem = serde_json::from_str(r#"{"action": "Scale Up Database"}"#).unwrap();
        assert_eq!(item.reason_kind, ReasonKind::Unknown);
        assert_eq!(item.owner, "unassigned");
        assert_eq!(item.confidence, 0.5);
        assert_eq!(item.risk, RiskLevel::Routine);
    }

    #[test]
    fn test_legacy_reason_field_accepted() {
        let item: PlanItem = serde_json::from_str(
            r#"{"reason": "recurrent_issue", "action": "create_postmortem", "owner": "ops_lead"}"#,
        )
        .unwrap();
        assert_eq!(item.reason_kind, ReasonKind::RecurrentIssue);
    }

    #[test]
    fn test_untagged_rollback_still_high_risk() {
        let mut item = PlanItem::new(ReasonKind::Unknown, "rollback_release", "ops", "", "", 0.9);
        item.risk = RiskLevel::Routine;
        assert!(item.is_high_risk());
    }
}
