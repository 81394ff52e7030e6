//! Shared fixtures for the black-box tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use aiocc::analysis::RootCauseCorrelator;
use aiocc::config::{AnalysisConfig, IntegrationsConfig};
use aiocc::datasource::{DataCollector, RawDatasets, StaticSource};
use aiocc::detect::incident::IncidentManager;
use aiocc::detect::AnomalyAnalyzer;
use aiocc::dispatch::ActionDispatcher;
use aiocc::integrations::{
    LocalMailer, LocalNotifier, LocalTaskTracker, Mailer, NotificationChannel, TaskTracker, Tiered,
};
use aiocc::pipeline::Orchestrator;
use aiocc::storage::{EventRepository, EventStore};
use serde_json::{json, Map, Value};

fn obj(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => unreachable!(),
    }
}

/// Fourteen quiet days, then one day where all three streams degrade.
pub fn degraded_snapshot() -> RawDatasets {
    let mut raw = RawDatasets::default();
    for d in 1..=14u32 {
        let date = format!("2024-03-{:02}", d);
        let last = d == 14;
        let sql = if last { 4 } else { 5 };
        for i in 0..10 {
            raw.sales.push(obj(json!({
                "date": date, "lead_id": format!("L{}-{}", d, i),
                "stage": if i < sql { "SQL" } else { "MQL" },
                "owner": "ana", "amount": 100.0, "source": "web"
            })));
        }
        raw.marketing.push(obj(json!({
            "date": date, "campaign": "spring", "channel": "search",
            "spend": 100.0, "impressions": 1000, "clicks": 100, "conversions": 10,
            "conversion_rate": if last { 0.05 } else { 0.1 }
        })));
        let tickets = if last { 30 } else { 10 };
        for i in 0..tickets {
            raw.support.push(obj(json!({
                "ticket_id": format!("T{}-{}", d, i), "created_at": date,
                "priority": "Low", "status": "New", "subject": "login", "escalated": false
            })));
        }
    }
    raw
}

/// Dispatcher backed by the file-based local tools under `dir`.
pub fn local_dispatcher(dir: &Path, events: Arc<dyn EventRepository>) -> ActionDispatcher {
    let notifier: Arc<dyn NotificationChannel> =
        Arc::new(LocalNotifier::open(dir.join("notifications.json")).unwrap());
    let tasks: Arc<dyn TaskTracker> = Arc::new(LocalTaskTracker::open(dir.join("tasks.json")).unwrap());
    let mailer: Arc<dyn Mailer> = Arc::new(LocalMailer::open(dir.join("emails.json")).unwrap());
    ActionDispatcher::new(
        Tiered::new(None, Some(notifier)),
        Tiered::new(None, Some(tasks)),
        Tiered::new(None, Some(mailer)),
        events,
        &IntegrationsConfig::default(),
    )
}

pub fn orchestrator(dir: &Path, events: Arc<EventStore>, raw: RawDatasets) -> Orchestrator {
    let repo: Arc<dyn EventRepository> = events;
    Orchestrator::new(
        DataCollector::new(Arc::new(StaticSource::new(raw))),
        AnomalyAnalyzer::default(),
        RootCauseCorrelator::new(AnalysisConfig::default()),
        local_dispatcher(dir, repo.clone()),
        IncidentManager::new(repo),
    )
}
