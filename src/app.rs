//! Wiring: turns a [`Config`] into a ready-to-run supervisor.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::analysis::RootCauseCorrelator;
use crate::config::Config;
use crate::datasource::{DataCollector, JsonFileSource};
use crate::detect::incident::IncidentManager;
use crate::detect::AnomalyAnalyzer;
use crate::dispatch::ActionDispatcher;
use crate::integrations::{
    HttpReasoner, KeywordKnowledgeStore, LocalMailer, LocalNotifier, LocalTaskTracker, Mailer,
    NotificationChannel, RemoteTools, TaskTracker, TextReportGenerator, Tiered,
};
use crate::pipeline::{Orchestrator, SessionSupervisor};
use crate::plan::PlanRefiner;
use crate::session::SessionStore;
use crate::storage::{EventRepository, EventStore};

/// Long-lived handles shared by the CLI, the scheduler and the API.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub events: Arc<EventStore>,
    pub supervisor: Arc<SessionSupervisor>,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = &config.storage;
        let events = Arc::new(
            EventStore::open(&storage.events_path)
                .with_context(|| format!("failed to open event log {}", storage.events_path.display()))?,
        );
        let sessions = Arc::new(
            SessionStore::open(&storage.sessions_path)
                .with_context(|| format!("failed to open sessions {}", storage.sessions_path.display()))?,
        );

        let repo: Arc<dyn EventRepository> = events.clone();
        let dispatcher = build_dispatcher(&config, repo.clone())?;

        let collector = DataCollector::new(Arc::new(JsonFileSource::new(&storage.snapshot_path)))
            .with_demo_mode(config.demo_mode);

        let mut orchestrator = Orchestrator::new(
            collector,
            AnomalyAnalyzer::from_config(&config.analysis),
            RootCauseCorrelator::new(config.analysis.clone()),
            dispatcher,
            IncidentManager::new(repo),
        );

        if let Some(path) = &storage.knowledge_path {
            let store = KeywordKnowledgeStore::open(path)
                .with_context(|| format!("failed to open knowledge store {}", path.display()))?;
            orchestrator = orchestrator.with_knowledge(Arc::new(store));
        }

        if let Some(reasoner) = HttpReasoner::from_config(&config.refiner)? {
            info!(model = %config.refiner.model, "plan refinement enabled");
            orchestrator = orchestrator.with_refiner(PlanRefiner::new(Arc::new(reasoner)));
        }

        if let Some(ttl) = config.approval.ttl_secs {
            orchestrator = orchestrator.with_approval_ttl(Duration::from_secs(ttl));
        }

        let supervisor = Arc::new(SessionSupervisor::new(Arc::new(orchestrator), sessions));
        Ok(Self {
            config: Arc::new(config),
            events,
            supervisor,
        })
    }
}

fn build_dispatcher(config: &Config, events: Arc<dyn EventRepository>) -> Result<ActionDispatcher> {
    let cfg = &config.integrations;
    let storage = &config.storage;

    let remote = RemoteTools::from_config(cfg)?.map(Arc::new);
    if remote.is_some() {
        debug!("remote tools configured");
    }

    let (notify_local, task_local, mail_local) = if cfg.local_tools {
        (
            Some(Arc::new(LocalNotifier::open(&storage.notifications_log)?) as Arc<dyn NotificationChannel>),
            Some(Arc::new(LocalTaskTracker::open(&storage.tasks_log)?) as Arc<dyn TaskTracker>),
            Some(Arc::new(LocalMailer::open(&storage.emails_log)?) as Arc<dyn Mailer>),
        )
    } else {
        (None, None, None)
    };

    let notifier = Tiered::new(
        remote.clone().map(|r| r as Arc<dyn NotificationChannel>),
        notify_local,
    );
    let tasks = Tiered::new(remote.clone().map(|r| r as Arc<dyn TaskTracker>), task_local);
    let mailer = Tiered::new(remote.map(|r| r as Arc<dyn Mailer>), mail_local);

    Ok(
        ActionDispatcher::new(notifier, tasks, mailer, events, cfg)
            .with_report(Arc::new(TextReportGenerator::new(&storage.report_path))),
    )
}
