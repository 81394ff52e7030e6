//! The incident pipeline: collect, analyze, correlate, plan, refine, approve, execute.
//!
//! Suspendable mode is an explicit state machine over [`Checkpoint`] values:
//! [`Orchestrator::advance`] moves a checkpoint one stage forward and
//! [`Orchestrator::resume`] applies the reviewer's decision at
//! `awaiting_approval`. Atomic mode drives the same machine to completion.

pub mod checkpoint;
pub mod supervisor;

pub use checkpoint::{ApprovalDecision, Checkpoint, Stage, StageSignal};
pub use supervisor::{CycleOutcome, SessionSupervisor, SkipRecord, StepOutcome};

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::{correlation, RootCauseCorrelator};
use crate::datasource::{CollectError, DataCollector};
use crate::detect::incident::{Incident, IncidentManager, IncidentStatus};
use crate::detect::AnomalyAnalyzer;
use crate::dispatch::ActionDispatcher;
use crate::integrations::{KnowledgeEntry, KnowledgeStore};
use crate::plan::{PlanBuilder, PlanItem, PlanRefiner};
use crate::session::SessionError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cycle {trace_id} is at {found}, expected {expected}")]
    InvalidStage {
        trace_id: String,
        expected: Stage,
        found: Stage,
    },
    #[error("cycle {trace_id} cannot advance past {stage}")]
    CannotAdvance { trace_id: String, stage: Stage },
    #[error("checkpoint {trace_id} is missing {what}")]
    MissingState { trace_id: String, what: &'static str },
}

pub struct Orchestrator {
    collector: DataCollector,
    analyzer: AnomalyAnalyzer,
    correlator: RootCauseCorrelator,
    builder: PlanBuilder,
    refiner: Option<PlanRefiner>,
    dispatcher: ActionDispatcher,
    incidents: IncidentManager,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    approval_ttl: Option<chrono::Duration>,
}

impl Orchestrator {
    pub fn new(
        collector: DataCollector,
        analyzer: AnomalyAnalyzer,
        correlator: RootCauseCorrelator,
        dispatcher: ActionDispatcher,
        incidents: IncidentManager,
    ) -> Self {
        Self {
            collector,
            analyzer,
            correlator,
            builder: PlanBuilder::new(),
            refiner: None,
            dispatcher,
            incidents,
            knowledge: None,
            approval_ttl: None,
        }
    }

    pub fn with_refiner(mut self, refiner: PlanRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Pending approvals older than `ttl` are rejected when resumed.
    /// A zero TTL disables expiry.
    pub fn with_approval_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.approval_ttl = Some(ttl)
            .filter(|t| !t.is_zero())
            .and_then(|t| chrono::Duration::from_std(t).ok());
        self
    }

    pub fn incidents(&self) -> &IncidentManager {
        &self.incidents
    }

    /// Run every stage to completion and persist the incident. The approval
    /// gate is passed immediately, so the TTL never applies here.
    pub async fn run_cycle(&self, session_id: Option<String>) -> Result<Incident, PipelineError> {
        let (checkpoint, _) = self.run_step_by_step(session_id).await?;
        let plan = checkpoint.plan.clone();
        self.execute_plan(checkpoint, plan).await
    }

    /// Advance a new cycle up to the approval checkpoint.
    pub async fn run_step_by_step(
        &self,
        session_id: Option<String>,
    ) -> Result<(Checkpoint, Vec<StageSignal>), PipelineError> {
        let mut checkpoint = Checkpoint::new(session_id);
        info!(trace_id = %checkpoint.trace_id, "cycle started");
        let mut signals = Vec::new();
        while checkpoint.stage != Stage::AwaitingApproval {
            let (next, signal) = self.advance(checkpoint).await?;
            signals.push(signal);
            checkpoint = next;
        }
        Ok((checkpoint, signals))
    }

    /// Run exactly one stage.
    pub async fn advance(&self, mut cp: Checkpoint) -> Result<(Checkpoint, StageSignal), PipelineError> {
        let message = match cp.stage {
            Stage::Idle => {
                let data = self.collector.collect().await?;
                let msg = format!("collected {} records", data.record_count());
                cp.datasets = Some(data);
                cp.stage = Stage::Collecting;
                msg
            }
            Stage::Collecting => {
                let data = require(&cp, cp.datasets.as_ref(), "datasets")?;
                let insights = self.analyzer.analyze(data);
                let msg = insights.summary.clone();
                cp.insights = Some(insights);
                cp.stage = Stage::Analyzing;
                msg
            }
            Stage::Analyzing => {
                let insights = require(&cp, cp.insights.as_ref(), "insights")?;
                let knowledge = self.knowledge.as_deref();
                let mut out = self
                    .correlator
                    .correlate_detailed(insights, &self.incidents, knowledge)
                    .await;
                correlation::rank(&mut out.reasons);
                let msg = format!("{} candidate reasons", out.reasons.len());
                cp.reasons = out.reasons;
                cp.similar = out.similar;
                cp.stage = Stage::Correlating;
                msg
            }
            Stage::Correlating => {
                cp.plan = self.builder.build(&cp.reasons);
                cp.stage = Stage::Planning;
                format!("{} plan items", cp.plan.len())
            }
            Stage::Planning => match &self.refiner {
                Some(refiner) => {
                    let insights = require(&cp, cp.insights.as_ref(), "insights")?;
                    let refined = refiner.refine(&cp.plan, insights, &cp.reasons, &cp.similar).await;
                    let msg = format!("{} plan items after refinement", refined.len());
                    cp.plan = refined;
                    cp.stage = Stage::Refining;
                    msg
                }
                None => await_approval(&mut cp),
            },
            Stage::Refining => await_approval(&mut cp),
            stage => {
                return Err(PipelineError::CannotAdvance {
                    trace_id: cp.trace_id.clone(),
                    stage,
                })
            }
        };

        debug!(trace_id = %cp.trace_id, stage = %cp.stage, %message, "stage complete");
        let signal = StageSignal {
            trace_id: cp.trace_id.clone(),
            stage: cp.stage,
            message,
        };
        Ok((cp, signal))
    }

    /// Apply the reviewer's decision to a checkpoint waiting for approval.
    pub async fn resume(&self, cp: Checkpoint, decision: ApprovalDecision) -> Result<Incident, PipelineError> {
        if cp.stage != Stage::AwaitingApproval {
            return Err(PipelineError::InvalidStage {
                trace_id: cp.trace_id.clone(),
                expected: Stage::AwaitingApproval,
                found: cp.stage,
            });
        }

        let decision = match (self.expired(&cp), decision) {
            (Some(waited), ApprovalDecision::Approve { .. }) => {
                warn!(trace_id = %cp.trace_id, waited_secs = waited, "approval expired, rejecting");
                ApprovalDecision::Reject {
                    reason: format!("approval expired after {}s", waited),
                }
            }
            (_, d) => d,
        };

        match decision {
            ApprovalDecision::Approve { plan } => {
                let plan = plan.unwrap_or_else(|| cp.plan.clone());
                self.execute_plan(cp, plan).await
            }
            ApprovalDecision::Reject { reason } => self.reject(cp, reason),
        }
    }

    /// Dispatch `plan` (possibly edited) for a checkpoint and persist the incident.
    pub async fn execute_plan(
        &self,
        cp: Checkpoint,
        plan: Vec<PlanItem>,
    ) -> Result<Incident, PipelineError> {
        let insights = require(&cp, cp.insights.as_ref(), "insights")?.clone();
        info!(trace_id = %cp.trace_id, stage = %Stage::Executing, items = plan.len(), "executing plan");

        let results = self
            .dispatcher
            .execute(&cp.trace_id, &insights, &cp.reasons, &plan)
            .await;

        let incident = Incident {
            trace_id: cp.trace_id,
            session_id: cp.session_id,
            status: IncidentStatus::Completed,
            start_ts: cp.started_at,
            end_ts: Utc::now(),
            insights,
            reasons: cp.reasons,
            plan,
            results,
            rejection_reason: None,
        };
        self.incidents.record_incident(&incident)?;
        self.capture_knowledge(&incident).await;

        info!(trace_id = %incident.trace_id, stage = %Stage::Completed, "cycle completed");
        Ok(incident)
    }

    /// Close a checkpoint without remediation.
    pub fn reject(&self, cp: Checkpoint, reason: String) -> Result<Incident, PipelineError> {
        let insights = require(&cp, cp.insights.as_ref(), "insights")?.clone();
        let incident = Incident {
            trace_id: cp.trace_id,
            session_id: cp.session_id,
            status: IncidentStatus::Rejected,
            start_ts: cp.started_at,
            end_ts: Utc::now(),
            insights,
            reasons: cp.reasons,
            plan: cp.plan,
            results: Vec::new(),
            rejection_reason: Some(reason),
        };
        self.incidents.record_incident(&incident)?;
        info!(trace_id = %incident.trace_id, stage = %Stage::Rejected, "cycle rejected");
        Ok(incident)
    }

    fn expired(&self, cp: &Checkpoint) -> Option<i64> {
        let ttl = self.approval_ttl?;
        let since = cp.awaiting_since?;
        let waited = Utc::now() - since;
        (waited > ttl).then(|| waited.num_seconds())
    }

    async fn capture_knowledge(&self, incident: &Incident) {
        let Some(store) = &self.knowledge else {
            return;
        };
        let entry = KnowledgeEntry {
            id: incident.trace_id.clone(),
            summary: incident.insights.summary.clone(),
            resolution: incident.plan.iter().map(|p| p.action.clone()).collect(),
            root_cause: incident.reasons.iter().map(|r| r.kind.to_string()).collect(),
        };
        if let Err(e) = store.add(entry).await {
            warn!(trace_id = %incident.trace_id, error = %e, "failed to store incident in knowledge base");
        }
    }
}

fn await_approval(cp: &mut Checkpoint) -> String {
    cp.awaiting_since = Some(Utc::now());
    cp.stage = Stage::AwaitingApproval;
    "approval required".to_string()
}

fn require<'a, T>(cp: &Checkpoint, value: Option<&'a T>, what: &'static str) -> Result<&'a T, PipelineError> {
    value.ok_or_else(|| PipelineError::MissingState {
        trace_id: cp.trace_id.clone(),
        what,
    })
}
