//! Optional plan refinement through an external reasoning backend.
//!
//! Refinement is fail-open: any backend, decode or shape problem leaves the
//! incoming plan untouched.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::{PlanItem, RiskLevel};
use crate::analysis::{Reason, ReasonKind};
use crate::detect::Insights;
use crate::integrations::SimilarIncident;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("reasoning backend unavailable: {0}")]
    Backend(String),
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("refined plan is empty")]
    EmptyPlan,
}

/// Text-completion backend.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, RefineError>;
}

/// One step as returned by the backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RefinedStep {
    action: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    risk_assessment: Option<String>,
}

pub struct PlanRefiner {
    reasoner: Arc<dyn Reasoner>,
}

impl PlanRefiner {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Refined plan, or `plan` unchanged if anything goes wrong.
    pub async fn refine(
        &self,
        plan: &[PlanItem],
        insights: &Insights,
        reasons: &[Reason],
        similar: &[SimilarIncident],
    ) -> Vec<PlanItem> {
        match self.try_refine(plan, insights, reasons, similar).await {
            Ok(refined) => {
                info!(before = plan.len(), after = refined.len(), "plan refined");
                refined
            }
            Err(e) => {
                warn!(error = %e, "plan refinement failed, keeping original plan");
                plan.to_vec()
            }
        }
    }

    pub async fn try_refine(
        &self,
        plan: &[PlanItem],
        insights: &Insights,
        reasons: &[Reason],
        similar: &[SimilarIncident],
    ) -> Result<Vec<PlanItem>, RefineError> {
        let prompt = build_prompt(plan, insights, reasons, similar)?;
        let response = self.reasoner.complete(&prompt).await?;
        let steps = decode_plan(&response)?;
        Ok(merge(plan, steps))
    }
}

pub fn build_prompt(
    plan: &[PlanItem],
    insights: &Insights,
    reasons: &[Reason],
    similar: &[SimilarIncident],
) -> Result<String, RefineError> {
    let mut prompt = String::from(
        "You are an operations assistant. Refine the initial remediation plan \
         using the insights and root causes below.\n\n",
    );
    prompt.push_str("### Insights\n");
    prompt.push_str(&serde_json::to_string_pretty(insights)?);
    prompt.push_str("\n\n### Root causes\n");
    prompt.push_str(&serde_json::to_string_pretty(reasons)?);
    if !similar.is_empty() {
        prompt.push_str("\n\n### Similar past incidents\n");
        prompt.push_str(&serde_json::to_string_pretty(similar)?);
    }
    prompt.push_str("\n\n### Initial plan\n");
    prompt.push_str(&serde_json::to_string_pretty(plan)?);
    prompt.push_str(
        "\n\n### Instructions\n\
         1. Reorder steps so the most critical root causes are addressed first.\n\
         2. Add a target, reasoning, priority and risk assessment to each step.\n\
         3. Keep action names unchanged unless a step must be replaced.\n\
         4. Return only a JSON array of objects with the keys \
         \"action\", \"target\", \"reasoning\", \"priority\" (High/Medium/Low) \
         and \"risk_assessment\".\n",
    );
    Ok(prompt)
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

fn decode_plan(text: &str) -> Result<Vec<RefinedStep>, RefineError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            let key = if obj.contains_key("plan") {
                Some("plan".to_string())
            } else if obj.len() == 1 {
                obj.keys().next().cloned()
            } else {
                None
            };
            match key.and_then(|k| obj.remove(&k)) {
                Some(Value::Array(items)) => items,
                _ => return Err(RefineError::Shape("object without a plan list".into())),
            }
        }
        other => return Err(RefineError::Shape(format!("expected a list, got {}", other))),
    };
    if items.is_empty() {
        return Err(RefineError::EmptyPlan);
    }
    items
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(RefineError::from))
        .collect()
}

/// Overlay refined steps onto the original items with the same action.
///
/// The n-th step with a given action pairs with the n-th original row of that
/// action; extra repeats fall back to the first such row.
fn merge(original: &[PlanItem], steps: Vec<RefinedStep>) -> Vec<PlanItem> {
    let mut used = vec![false; original.len()];
    steps
        .into_iter()
        .map(|step| {
            let same = |i: &usize| original[*i].action == step.action;
            let matched = (0..original.len())
                .filter(same)
                .find(|&i| !used[i])
                .or_else(|| (0..original.len()).find(same));
            if let Some(i) = matched {
                used[i] = true;
            }
            let mut item = matched
                .map(|i| original[i].clone())
                .unwrap_or_else(|| {
                    let owner = step.owner.as_deref().unwrap_or("unassigned");
                    let mut fresh = PlanItem::new(ReasonKind::Unknown, &step.action, owner, "", "", 0.5);
                    fresh.note = step.reasoning.clone().unwrap_or_default();
                    fresh
                });
            if let Some(owner) = step.owner {
                item.owner = owner;
            }
            item.target = step.target.or(item.target);
            item.reasoning = step.reasoning.or(item.reasoning);
            item.priority = step.priority.or(item.priority);
            if let Some(assessment) = step.risk_assessment {
                if RiskLevel::from_assessment(&assessment) == Some(RiskLevel::High) {
                    item.risk = RiskLevel::High;
                }
                item.risk_assessment = Some(assessment);
            }
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::AnomalyResult;
    use crate::plan::PlanBuilder;

    struct Canned(String);

    #[async_trait]
    impl Reasoner for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String, RefineError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl Reasoner for Failing {
        async fn complete(&self, _prompt: &str) -> Result<String, RefineError> {
            Err(RefineError::Backend("connection refused".into()))
        }
    }

    fn insights() -> Insights {
        Insights {
            sales: AnomalyResult::empty("sales"),
            marketing: AnomalyResult::empty("marketing"),
            support: AnomalyResult::empty("support"),
            summary: "No major anomalies".into(),
        }
    }

    fn base_plan() -> (Vec<Reason>, Vec<PlanItem>) {
        let reasons = vec![
            Reason::new(ReasonKind::LowCampaignConversion, ""),
            Reason::new(ReasonKind::SupportEscalations, ""),
        ];
        let plan = PlanBuilder::new().build(&reasons);
        (reasons, plan)
    }

    #[tokio::test]
    async fn test_failing_backend_returns_original_plan() {
        let (reasons, plan) = base_plan();
        let refiner = PlanRefiner::new(Arc::new(Failing));
        let out = refiner.refine(&plan, &insights(), &reasons, &[]).await;
        assert_eq!(out, plan);
    }

    #[tokio::test]
    async fn test_garbage_response_returns_original_plan() {
        let (reasons, plan) = base_plan();
        let refiner = PlanRefiner::new(Arc::new(Canned("I think you should panic".into())));
        assert_eq!(refiner.refine(&plan, &insights(), &reasons, &[]).await, plan);

        let refiner = PlanRefiner::new(Arc::new(Canned("[]".into())));
        assert_eq!(refiner.refine(&plan, &insights(), &reasons, &[]).await, plan);
    }

    #[tokio::test]
    async fn test_fenced_wrapped_response_reorders_and_annotates() {
        let (reasons, plan) = base_plan();
        let response = r#"```json
{"plan": [
  {"action": "open_bug", "target": "checkout-service", "reasoning": "errors spiked",
   "priority": "High", "risk_assessment": "Low"},
  {"action": "pause_campaign", "target": "spring-promo", "priority": "Medium"}
]}
```"#;
        let refiner = PlanRefiner::new(Arc::new(Canned(response.into())));
        let out = refiner.refine(&plan, &insights(), &reasons, &[]).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].action, "open_bug");
        assert_eq!(out[0].owner, "engineering_lead");
        assert_eq!(out[0].target.as_deref(), Some("checkout-service"));
        assert_eq!(out[0].priority.as_deref(), Some("High"));
        assert_eq!(out[0].confidence, 0.75);
        assert_eq!(out[1].action, "pause_campaign");
        assert_eq!(out[1].reason_kind, ReasonKind::LowCampaignConversion);
    }

    #[tokio::test]
    async fn test_repeated_action_keeps_each_row_reason() {
        let plan = vec![
            PlanItem::new(ReasonKind::SupportEscalations, "notify_team", "support_lead", "", "", 0.75),
            PlanItem::new(ReasonKind::RecurrentIssue, "notify_team", "ops", "", "", 0.5),
            PlanItem::new(ReasonKind::ProductBugOrDegradation, "open_bug", "engineering_lead", "", "", 0.7),
        ];
        let response = r##"[
  {"action": "open_bug", "priority": "High"},
  {"action": "notify_team", "target": "#support"},
  {"action": "notify_team", "target": "#ops"}
]"##;
        let refiner = PlanRefiner::new(Arc::new(Canned(response.into())));
        let out = refiner.refine(&plan, &insights(), &[], &[]).await;

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].reason_kind, ReasonKind::ProductBugOrDegradation);
        assert_eq!(out[1].reason_kind, ReasonKind::SupportEscalations);
        assert_eq!(out[1].target.as_deref(), Some("#support"));
        assert_eq!(out[2].reason_kind, ReasonKind::RecurrentIssue);
        assert_eq!(out[2].owner, "ops");
        assert_eq!(out[2].confidence, 0.5);
    }

    #[tokio::test]
    async fn test_new_high_risk_step_is_tagged() {
        let (reasons, plan) = base_plan();
        let response = r#"[{"action": "drain_traffic", "risk_assessment": "High: customer impact"}]"#;
        let refiner = PlanRefiner::new(Arc::new(Canned(response.into())));
        let out = refiner.refine(&plan, &insights(), &reasons, &[]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].owner, "unassigned");
        assert!(out[0].is_high_risk());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n[1]```"), "[1]");
        assert_eq!(strip_code_fence("  [1] "), "[1]");
    }

    #[test]
    fn test_single_key_wrapper_unwrapped() {
        let steps = decode_plan(r#"{"steps": [{"action": "a"}]}"#).unwrap();
        assert_eq!(steps[0].action, "a");
        assert!(matches!(
            decode_plan(r#"{"a": [], "b": []}"#),
            Err(RefineError::Shape(_))
        ));
    }

    #[test]
    fn test_prompt_mentions_similar_incidents_only_when_present() {
        let (reasons, plan) = base_plan();
        let without = build_prompt(&plan, &insights(), &reasons, &[]).unwrap();
        assert!(!without.contains("Similar past incidents"));
        assert!(without.contains("pause_campaign"));

        let similar = vec![SimilarIncident {
            id: "INC-7".into(),
            summary: "Sales anomaly detected".into(),
            score: 0.9,
            resolution: vec!["pause_campaign".into()],
            root_cause: vec!["low_campaign_conversion".into()],
        }];
        let with = build_prompt(&plan, &insights(), &reasons, &similar).unwrap();
        assert!(with.contains("INC-7"));
    }
}
