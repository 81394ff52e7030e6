//! Executes plan items through the tiered integrations.
//!
//! Items are handled independently and in plan order. Classification is fixed:
//! task actions, human escalation, high-risk (approval only), demo actions,
//! everything else as unknown.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::analysis::Reason;
use crate::config::IntegrationsConfig;
use crate::detect::Insights;
use crate::integrations::{
    IntegrationError, Mailer, NotificationChannel, ReportGenerator, ReportInput, TaskRef, TaskTracker, Tier,
    TierResult, Tiered,
};
use crate::plan::PlanItem;
use crate::storage::{EventRecord, EventRepository};

pub const TASK_ACTIONS: &[&str] = &["pause_campaign", "audit_campaign", "open_bug", "create_postmortem"];
pub const HUMAN_ESCALATION: &str = "human_investigate";
pub const DEMO_ACTIONS: &[&str] = &["Scale Up Database", "Clear Redis Cache"];

const EMAIL_SUBJECT: &str = "AIOCC Action Required";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    TaskCreated,
    EmailSent,
    ApprovalRequested,
    Executed,
    UnknownAction,
    /// The side-effecting call failed on every available tier.
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutcomeStatus::TaskCreated => "task_created",
            OutcomeStatus::EmailSent => "email_sent",
            OutcomeStatus::ApprovalRequested => "approval_requested",
            OutcomeStatus::Executed => "executed",
            OutcomeStatus::UnknownAction => "unknown_action",
            OutcomeStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: String,
    pub owner: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub integration_result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    fn new(item: &PlanItem, status: OutcomeStatus) -> Self {
        Self {
            action: item.action.clone(),
            owner: item.owner.clone(),
            status,
            tier: None,
            integration_result: Value::Null,
            error: None,
        }
    }

    fn failed(item: &PlanItem, e: &IntegrationError) -> Self {
        Self {
            error: Some(e.to_string()),
            ..Self::new(item, OutcomeStatus::Failed)
        }
    }

    fn note_error(&mut self, what: &str, e: &IntegrationError) {
        self.error = Some(format!("{}: {}", what, e));
    }

    pub fn tier_label(&self) -> String {
        self.tier.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

/// How a plan item will be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    Task,
    HumanEscalation,
    HighRisk,
    Demo,
    Unknown,
}

pub fn classify(item: &PlanItem) -> ActionClass {
    let action = item.action.as_str();
    if TASK_ACTIONS.contains(&action) {
        ActionClass::Task
    } else if action == HUMAN_ESCALATION {
        ActionClass::HumanEscalation
    } else if item.is_high_risk() {
        ActionClass::HighRisk
    } else if DEMO_ACTIONS.contains(&action) {
        ActionClass::Demo
    } else {
        ActionClass::Unknown
    }
}

pub struct ActionDispatcher {
    notifier: Tiered<dyn NotificationChannel>,
    tasks: Tiered<dyn TaskTracker>,
    mailer: Tiered<dyn Mailer>,
    events: Arc<dyn EventRepository>,
    report: Option<Arc<dyn ReportGenerator>>,
    email_domain: String,
    ops_channel: String,
}

impl ActionDispatcher {
    pub fn new(
        notifier: Tiered<dyn NotificationChannel>,
        tasks: Tiered<dyn TaskTracker>,
        mailer: Tiered<dyn Mailer>,
        events: Arc<dyn EventRepository>,
        cfg: &IntegrationsConfig,
    ) -> Self {
        Self {
            notifier,
            tasks,
            mailer,
            events,
            report: None,
            email_domain: cfg.email_domain.clone(),
            ops_channel: cfg.ops_channel.clone(),
        }
    }

    pub fn with_report(mut self, report: Arc<dyn ReportGenerator>) -> Self {
        self.report = Some(report);
        self
    }

    /// Dispatch every item, then write the run report (best-effort).
    pub async fn execute(
        &self,
        trace_id: &str,
        insights: &Insights,
        reasons: &[Reason],
        plan: &[PlanItem],
    ) -> Vec<ActionOutcome> {
        let results = self.dispatch(trace_id, plan).await;

        if let Some(report) = &self.report {
            let input = ReportInput {
                trace_id,
                insights,
                reasons,
                plan,
                results: &results,
            };
            if let Err(e) = report.generate(&input) {
                error!(trace_id, error = %e, "failed to generate report");
            }
        }
        results
    }

    pub async fn dispatch(&self, trace_id: &str, plan: &[PlanItem]) -> Vec<ActionOutcome> {
        let mut results = Vec::with_capacity(plan.len());
        for item in plan {
            let outcome = self.dispatch_one(trace_id, item).await;

            let record = EventRecord::ActionExecuted {
                trace_id: Some(trace_id.to_string()),
                action: item.clone(),
                summary: outcome.clone(),
            };
            if let Err(e) = self.events.append_record(&record) {
                error!(trace_id, action = %item.action, error = %e, "failed to record action outcome");
            }

            info!(
                trace_id,
                action = %outcome.action,
                status = %outcome.status,
                tier = %outcome.tier_label(),
                "action dispatched"
            );
            results.push(outcome);
        }
        results
    }

    async fn dispatch_one(&self, trace_id: &str, item: &PlanItem) -> ActionOutcome {
        match classify(item) {
            ActionClass::Task => self.create_task(item).await,
            ActionClass::HumanEscalation => self.escalate(item).await,
            ActionClass::HighRisk => self.request_approval(trace_id, item).await,
            ActionClass::Demo => {
                let text = format!("[AIOCC] Executing demo action: {}", item.action);
                self.notify_only(item, OutcomeStatus::Executed, &text).await
            }
            ActionClass::Unknown => {
                let text = format!("[AIOCC] Unknown action: {}", item.action);
                self.notify_only(item, OutcomeStatus::UnknownAction, &text).await
            }
        }
    }

    async fn post(&self, channel: &str, text: &str) -> Result<TierResult, IntegrationError> {
        self.notifier.call("post", |n| n.post(channel, text)).await
    }

    async fn create_task(&self, item: &PlanItem) -> ActionOutcome {
        let title = format!("Action: {}", item.action);
        let task = match self
            .tasks
            .call("create_task", |t| t.create(&title, &item.note, &item.owner))
            .await
        {
            Ok(task) => task,
            Err(e) => {
                warn!(action = %item.action, error = %e, "task creation failed");
                return ActionOutcome::failed(item, &e);
            }
        };

        let id = TaskRef::from_response(&task.value)
            .map(|t| t.id)
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let channel = if item.owner.is_empty() {
            self.ops_channel.as_str()
        } else {
            item.owner.as_str()
        };
        let text = format!("[AIOCC] Task created for {}: {}", item.action, id);

        let mut outcome = ActionOutcome::new(item, OutcomeStatus::TaskCreated);
        outcome.tier = Some(task.tier);
        let notification = match self.post(channel, &text).await {
            Ok(r) => r.value,
            Err(e) => {
                outcome.note_error("notification failed", &e);
                Value::Null
            }
        };
        outcome.integration_result = json!({ "task": task.value, "task_id": id, "notification": notification });
        outcome
    }

    async fn escalate(&self, item: &PlanItem) -> ActionOutcome {
        let to = format!("{}@{}", item.owner, self.email_domain);
        let email = match self
            .mailer
            .call("send_email", |m| m.send(&to, EMAIL_SUBJECT, &item.note))
            .await
        {
            Ok(email) => email,
            Err(e) => {
                warn!(action = %item.action, error = %e, "escalation email failed");
                return ActionOutcome::failed(item, &e);
            }
        };

        let text = format!("[AIOCC] Manual triage requested. Email sent to {}", to);
        let mut outcome = ActionOutcome::new(item, OutcomeStatus::EmailSent);
        outcome.tier = Some(email.tier);
        let notification = match self.post(&self.ops_channel, &text).await {
            Ok(r) => r.value,
            Err(e) => {
                outcome.note_error("notification failed", &e);
                Value::Null
            }
        };
        outcome.integration_result = json!({ "email": email.value, "to": to, "notification": notification });
        outcome
    }

    /// High-risk actions are never executed here; they only request approval.
    async fn request_approval(&self, trace_id: &str, item: &PlanItem) -> ActionOutcome {
        let text = format!(
            "Approval Required: Action `{}` requested by {}.\nReason: {}",
            item.action,
            item.owner,
            item.reason_kind
        );
        let text = match item.rationale() {
            "" => text,
            rationale => format!("{} ({})", text, rationale),
        };
        let action_id = format!("{}_{}", item.action, trace_id);

        let mut outcome = ActionOutcome::new(item, OutcomeStatus::ApprovalRequested);
        match self
            .notifier
            .call("request_approval", |n| {
                n.request_approval(&self.ops_channel, &text, &action_id)
            })
            .await
        {
            Ok(r) => {
                outcome.tier = Some(r.tier);
                outcome.integration_result = json!({ "approval": r.value, "action_id": action_id });
            }
            Err(e) => {
                warn!(action = %item.action, error = %e, "approval request could not be delivered");
                outcome.note_error("approval request failed", &e);
                outcome.integration_result = json!({ "action_id": action_id });
            }
        }
        outcome
    }

    async fn notify_only(&self, item: &PlanItem, status: OutcomeStatus, text: &str) -> ActionOutcome {
        let mut outcome = ActionOutcome::new(item, status);
        match self.post(&self.ops_channel, text).await {
            Ok(r) => {
                outcome.tier = Some(r.tier);
                outcome.integration_result = r.value;
            }
            Err(e) => outcome.note_error("notification failed", &e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ReasonKind;
    use crate::integrations::{LocalMailer, LocalNotifier, LocalTaskTracker};
    use crate::plan::RiskLevel;
    use crate::storage::EventStore;
    use async_trait::async_trait;

    struct Harness {
        _dir: tempfile::TempDir,
        events: Arc<EventStore>,
        notifier: Arc<LocalNotifier>,
        tasks: Arc<LocalTaskTracker>,
        mailer: Arc<LocalMailer>,
        dispatcher: ActionDispatcher,
    }

    fn harness() -> Harness {
        let dir = tempfile::TempDir::new().unwrap();
        let events = Arc::new(EventStore::open(dir.path().join("memory.json")).unwrap());
        let notifier = Arc::new(LocalNotifier::open(dir.path().join("notifications.json")).unwrap());
        let tasks = Arc::new(LocalTaskTracker::open(dir.path().join("tasks.json")).unwrap());
        let mailer = Arc::new(LocalMailer::open(dir.path().join("emails.json")).unwrap());

        let n: Arc<dyn NotificationChannel> = notifier.clone();
        let t: Arc<dyn TaskTracker> = tasks.clone();
        let m: Arc<dyn Mailer> = mailer.clone();
        let dispatcher = ActionDispatcher::new(
            Tiered::new(None, Some(n)),
            Tiered::new(None, Some(t)),
            Tiered::new(None, Some(m)),
            events.clone(),
            &IntegrationsConfig::default(),
        );
        Harness {
            _dir: dir,
            events,
            notifier,
            tasks,
            mailer,
            dispatcher,
        }
    }

    fn item(action: &str, owner: &str) -> PlanItem {
        PlanItem::new(ReasonKind::Unknown, action, owner, "some note", "", 0.5)
    }

    #[test]
    fn test_classification_priority() {
        assert_eq!(classify(&item("open_bug", "x")), ActionClass::Task);
        assert_eq!(classify(&item("human_investigate", "x")), ActionClass::HumanEscalation);
        assert_eq!(classify(&item("Rollback_Release", "x")), ActionClass::HighRisk);
        assert_eq!(classify(&item("Scale Up Database", "x")), ActionClass::Demo);
        assert_eq!(classify(&item("make_coffee", "x")), ActionClass::Unknown);

        let mut tagged = item("drain_traffic", "x");
        tagged.risk = RiskLevel::High;
        assert_eq!(classify(&tagged), ActionClass::HighRisk);
    }

    #[tokio::test]
    async fn test_task_action_creates_task_and_notifies_owner() {
        let h = harness();
        let out = h.dispatcher.dispatch("t-1", &[item("open_bug", "engineering_lead")]).await;

        assert_eq!(out[0].status, OutcomeStatus::TaskCreated);
        assert_eq!(out[0].tier, Some(Tier::Local));
        let task_id = out[0].integration_result["task_id"].as_str().unwrap().to_string();
        assert!(task_id.starts_with("TASK-"));

        let tasks = h.tasks.entries().unwrap();
        assert_eq!(tasks[0].message, "Action: open_bug");
        assert_eq!(tasks[0].target, "engineering_lead");

        let posts = h.notifier.entries().unwrap();
        assert_eq!(posts[0].target, "engineering_lead");
        assert_eq!(posts[0].message, format!("[AIOCC] Task created for open_bug: {}", task_id));
    }

    #[tokio::test]
    async fn test_human_escalation_sends_email() {
        let h = harness();
        let out = h.dispatcher.dispatch("t-1", &[item("human_investigate", "ops_lead")]).await;

        assert_eq!(out[0].status, OutcomeStatus::EmailSent);
        let mails = h.mailer.entries().unwrap();
        assert_eq!(mails[0].target, "ops_lead@example.com");
        assert_eq!(mails[0].message, "AIOCC Action Required");

        let posts = h.notifier.entries().unwrap();
        assert_eq!(posts[0].target, "ops");
        assert!(posts[0].message.contains("ops_lead@example.com"));
    }

    #[tokio::test]
    async fn test_rollback_requests_approval_never_executes() {
        let h = harness();
        let mut risky = item("rollback_release", "sre");
        risky.risk = RiskLevel::Routine;
        let out = h.dispatcher.dispatch("t-42", &[risky]).await;

        assert_eq!(out[0].status, OutcomeStatus::ApprovalRequested);
        assert_eq!(out[0].integration_result["action_id"], "rollback_release_t-42");

        let posts = h.notifier.entries().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].message.starts_with("Approval Required: Action `rollback_release` requested by sre."));
        assert_eq!(posts[0].result["approval"], "pending");
    }

    #[tokio::test]
    async fn test_approval_text_carries_reason_code() {
        let h = harness();
        let risky = PlanItem::new(
            ReasonKind::ProductBugOrDegradation,
            "rollback_release",
            "sre",
            "error rate doubled after deploy",
            "",
            0.7,
        );
        h.dispatcher.dispatch("t-7", &[risky]).await;

        let posts = h.notifier.entries().unwrap();
        assert!(posts[0]
            .message
            .ends_with("Reason: product_bug_or_degradation (error rate doubled after deploy)"));
    }

    #[tokio::test]
    async fn test_demo_and_unknown_actions() {
        let h = harness();
        let out = h
            .dispatcher
            .dispatch("t-1", &[item("Clear Redis Cache", "ops"), item("make_coffee", "ops")])
            .await;
        assert_eq!(out[0].status, OutcomeStatus::Executed);
        assert_eq!(out[1].status, OutcomeStatus::UnknownAction);

        let posts = h.notifier.entries().unwrap();
        assert_eq!(posts[0].message, "[AIOCC] Executing demo action: Clear Redis Cache");
        assert_eq!(posts[1].message, "[AIOCC] Unknown action: make_coffee");
    }

    #[tokio::test]
    async fn test_every_outcome_is_recorded() {
        let h = harness();
        let plan = vec![
            item("open_bug", "eng"),
            item("human_investigate", "ops_lead"),
            item("reboot_host", "sre"),
        ];
        h.dispatcher.dispatch("t-7", &plan).await;

        let recorded = h.events.find_by_type("action_executed").unwrap();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[2]["summary"]["status"], "approval_requested");
        assert_eq!(recorded[0]["trace_id"], "t-7");
    }

    #[tokio::test]
    async fn test_no_integrations_yields_mock_results() {
        let dir = tempfile::TempDir::new().unwrap();
        let events = Arc::new(EventStore::open(dir.path().join("memory.json")).unwrap());
        let dispatcher = ActionDispatcher::new(
            Tiered::mock_only(),
            Tiered::mock_only(),
            Tiered::mock_only(),
            events,
            &IntegrationsConfig::default(),
        );

        let out = dispatcher
            .dispatch("t-1", &[item("pause_campaign", "marketing_lead"), item("human_investigate", "ops")])
            .await;
        assert_eq!(out[0].status, OutcomeStatus::TaskCreated);
        assert_eq!(out[0].tier, Some(Tier::Mock));
        assert_eq!(out[0].integration_result["task_id"], "UNKNOWN");
        assert_eq!(out[1].status, OutcomeStatus::EmailSent);
    }

    struct DownTracker;

    #[async_trait]
    impl TaskTracker for DownTracker {
        async fn create(&self, _: &str, _: &str, _: &str) -> Result<Value, IntegrationError> {
            Err(IntegrationError::Unavailable("tracker down".into()))
        }
    }

    #[tokio::test]
    async fn test_failing_item_does_not_block_the_rest() {
        let dir = tempfile::TempDir::new().unwrap();
        let events = Arc::new(EventStore::open(dir.path().join("memory.json")).unwrap());
        let down: Arc<dyn TaskTracker> = Arc::new(DownTracker);
        let dispatcher = ActionDispatcher::new(
            Tiered::mock_only(),
            Tiered::new(Some(down), None),
            Tiered::mock_only(),
            events,
            &IntegrationsConfig::default(),
        );

        let out = dispatcher
            .dispatch("t-1", &[item("open_bug", "eng"), item("Scale Up Database", "ops")])
            .await;
        assert_eq!(out[0].status, OutcomeStatus::Failed);
        assert!(out[0].error.as_deref().unwrap().contains("tracker down"));
        assert_eq!(out[1].status, OutcomeStatus::Executed);
    }
}
