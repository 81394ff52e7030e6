use tracing::debug;

use super::PlanItem;
use crate::analysis::{Reason, ReasonKind};

/// Static mapping from reason codes to remediation templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBuilder;

struct Template {
    action: &'static str,
    owner: &'static str,
    note: &'static str,
    impact: &'static str,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self
    }

    fn template(kind: ReasonKind) -> Template {
        let (action, owner, note, impact) = match kind {
            ReasonKind::LowCampaignConversion => (
                "pause_campaign",
                "marketing_lead",
                "Investigate targeting and creatives",
                "reduce wasted spend",
            ),
            ReasonKind::SupportEscalations => (
                "open_bug",
                "engineering_lead",
                "Inspect error logs and release",
                "fix revenue leakage",
            ),
            ReasonKind::ProductBugOrDegradation => (
                "open_bug",
                "engineering_lead",
                "Investigate recent release",
                "restore UX",
            ),
            ReasonKind::CampaignPerformanceIssue => (
                "audit_campaign",
                "marketing_lead",
                "Check audiences and landing pages",
                "improve conversions",
            ),
            ReasonKind::RecurrentIssue => (
                "create_postmortem",
                "ops_lead",
                "Deep dive recurring incidents",
                "long term stability",
            ),
            ReasonKind::SimilarPastIncident | ReasonKind::Unknown => (
                "human_investigate",
                "ops_lead",
                "Manual triage required",
                "unknown",
            ),
        };
        Template {
            action,
            owner,
            note,
            impact,
        }
    }

    /// One item per reason, in input order.
    pub fn build(&self, reasons: &[Reason]) -> Vec<PlanItem> {
        let plan: Vec<PlanItem> = reasons
            .iter()
            .map(|r| {
                let t = Self::template(r.kind);
                PlanItem::new(r.kind, t.action, t.owner, t.note, t.impact, r.confidence)
            })
            .collect();
        debug!(items = plan.len(), "plan built");
        plan
    }
}
