use std::path::PathBuf;

use askama::Template;
use chrono::{SecondsFormat, Utc};
use tracing::info;

use super::{IntegrationError, ReportGenerator};
use crate::analysis::Reason;
use crate::detect::Insights;
use crate::dispatch::ActionOutcome;
use crate::plan::PlanItem;

/// Everything a report is rendered from.
pub struct ReportInput<'a> {
    pub trace_id: &'a str,
    pub insights: &'a Insights,
    pub reasons: &'a [Reason],
    pub plan: &'a [PlanItem],
    pub results: &'a [ActionOutcome],
}

#[derive(Template)]
#[template(path = "report.txt")]
struct ReportTemplate<'a> {
    trace_id: &'a str,
    generated_at: String,
    insights: &'a Insights,
    reasons: &'a [Reason],
    plan: &'a [PlanItem],
    results: &'a [ActionOutcome],
}

/// Plain-text report written to a fixed path, replaced on every run.
pub struct TextReportGenerator {
    path: PathBuf,
}

impl TextReportGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn render(input: &ReportInput<'_>) -> Result<String, IntegrationError> {
        ReportTemplate {
            trace_id: input.trace_id,
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            insights: input.insights,
            reasons: input.reasons,
            plan: input.plan,
            results: input.results,
        }
        .render()
        .map_err(|e| IntegrationError::Render(e.to_string()))
    }
}

impl ReportGenerator for TextReportGenerator {
    fn generate(&self, input: &ReportInput<'_>) -> Result<PathBuf, IntegrationError> {
        let text = Self::render(input)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| IntegrationError::Render(e.to_string()))?;
        }
        std::fs::write(&self.path, text).map_err(|e| IntegrationError::Render(e.to_string()))?;
        info!(path = %self.path.display(), trace_id = input.trace_id, "report written");
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ReasonKind;
    use crate::detect::AnomalyResult;
    use crate::dispatch::OutcomeStatus;
    use crate::integrations::Tier;
    use crate::plan::PlanBuilder;
    use serde_json::json;

    fn insights() -> Insights {
        let mut support = AnomalyResult::empty("support_ticket_volume");
        support.is_anomaly = true;
        support.percent_change = 1.2;
        Insights {
            sales: AnomalyResult::empty("sales_conversion_rate"),
            marketing: AnomalyResult::empty("marketing_conversion_rate"),
            support,
            summary: "Support spike anomaly detected".into(),
        }
    }

    #[test]
    fn test_render_contains_sections() {
        let insights = insights();
        let reasons = vec![Reason::new(ReasonKind::ProductBugOrDegradation, "support spike without sales drop")];
        let plan = PlanBuilder::new().build(&reasons);
        let results = vec![ActionOutcome {
            action: "open_bug".into(),
            owner: "engineering_lead".into(),
            status: OutcomeStatus::TaskCreated,
            tier: Some(Tier::Local),
            integration_result: json!({"ok": true}),
            error: None,
        }];

        let text = TextReportGenerator::render(&ReportInput {
            trace_id: "t-1",
            insights: &insights,
            reasons: &reasons,
            plan: &plan,
            results: &results,
        })
        .unwrap();

        assert!(text.contains("Trace:     t-1"));
        assert!(text.contains("support_ticket_volume"));
        assert!(text.contains("ANOMALY"));
        assert!(text.contains("product_bug_or_degradation (0.70)"));
        assert!(text.contains("1. open_bug -> engineering_lead"));
        assert!(text.contains("open_bug: task_created via local"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let generator = TextReportGenerator::new(dir.path().join("out/report.txt"));
        let insights = insights();

        let path = generator
            .generate(&ReportInput {
                trace_id: "t-2",
                insights: &insights,
                reasons: &[],
                plan: &[],
                results: &[],
            })
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("t-2"));
    }
}
