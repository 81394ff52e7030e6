//! Session-scoped cycle execution.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Map;
use tracing::info;

use super::{ApprovalDecision, Checkpoint, Orchestrator, PipelineError, StageSignal};
use crate::detect::incident::Incident;
use crate::session::{Session, SessionState, SessionStore, DEFAULT_SESSION_NAME};

/// Returned instead of running a cycle against a paused session.
#[derive(Debug, Clone, Serialize)]
pub struct SkipRecord {
    pub skipped: bool,
    pub reason: String,
    pub session: Session,
}

impl SkipRecord {
    fn paused(session: Session) -> Self {
        Self {
            skipped: true,
            reason: "paused".to_string(),
            session,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CycleOutcome {
    Completed(Box<Incident>),
    Skipped(SkipRecord),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StepOutcome {
    Suspended {
        checkpoint: Box<Checkpoint>,
        signals: Vec<StageSignal>,
    },
    Skipped(SkipRecord),
}

/// Runs cycles on behalf of sessions and keeps `last_trace_id` current.
#[derive(Clone)]
pub struct SessionSupervisor {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionStore>,
}

impl SessionSupervisor {
    pub fn new(orchestrator: Arc<Orchestrator>, sessions: Arc<SessionStore>) -> Self {
        Self {
            orchestrator,
            sessions,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Explicit id, else the active session, else a new default session.
    pub fn resolve_session(&self, session_id: Option<&str>) -> Result<Session, PipelineError> {
        if let Some(id) = session_id {
            return Ok(self.sessions.get(id)?);
        }
        match self.sessions.get_active()? {
            Some(session) => Ok(session),
            None => Ok(self.sessions.create(DEFAULT_SESSION_NAME, Map::new())?),
        }
    }

    pub async fn run_cycle(&self, session_id: Option<&str>) -> Result<CycleOutcome, PipelineError> {
        let session = self.resolve_session(session_id)?;
        if session.state == SessionState::Paused {
            info!(session_id = %session.session_id, "session paused, skipping cycle");
            return Ok(CycleOutcome::Skipped(SkipRecord::paused(session)));
        }

        info!(session_id = %session.session_id, "session starting cycle");
        let incident = self
            .orchestrator
            .run_cycle(Some(session.session_id.clone()))
            .await?;
        self.sessions
            .set_last_trace(&session.session_id, &incident.trace_id)?;
        info!(session_id = %session.session_id, trace_id = %incident.trace_id, "cycle complete for session");
        Ok(CycleOutcome::Completed(Box::new(incident)))
    }

    /// Start a suspendable cycle and stop at the approval checkpoint.
    pub async fn start_step(&self, session_id: Option<&str>) -> Result<StepOutcome, PipelineError> {
        let session = self.resolve_session(session_id)?;
        if session.state == SessionState::Paused {
            info!(session_id = %session.session_id, "session paused, skipping cycle");
            return Ok(StepOutcome::Skipped(SkipRecord::paused(session)));
        }

        let (checkpoint, signals) = self
            .orchestrator
            .run_step_by_step(Some(session.session_id))
            .await?;
        Ok(StepOutcome::Suspended {
            checkpoint: Box::new(checkpoint),
            signals,
        })
    }

    /// Apply an approval decision and record the trace on the owning session.
    pub async fn resume(&self, checkpoint: Checkpoint, decision: ApprovalDecision) -> Result<Incident, PipelineError> {
        let session_id = checkpoint.session_id.clone();
        let incident = self.orchestrator.resume(checkpoint, decision).await?;
        if let Some(id) = session_id {
            self.sessions.set_last_trace(&id, &incident.trace_id)?;
        }
        Ok(incident)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{degraded_snapshot, Fixture};
    use crate::storage::EventRepository;

    fn supervisor(fx: &Fixture) -> SessionSupervisor {
        let sessions = Arc::new(SessionStore::open(fx.dir.path().join("sessions.json")).unwrap());
        SessionSupervisor::new(Arc::new(fx.orchestrator(degraded_snapshot())), sessions)
    }

    #[tokio::test]
    async fn test_paused_session_skips_without_incident() {
        let fx = Fixture::new();
        let sup = supervisor(&fx);
        let s = sup.sessions().create("ops", Map::new()).unwrap();
        sup.sessions().pause(&s.session_id).unwrap();

        let out = sup.run_cycle(Some(&s.session_id)).await.unwrap();
        match out {
            CycleOutcome::Skipped(skip) => {
                assert!(skip.skipped);
                assert_eq!(skip.reason, "paused");
                assert_eq!(skip.session.session_id, s.session_id);
            }
            other => panic!("expected skip, got {:?}", other),
        }
        assert!(fx.events.find_by_type("incident").unwrap().is_empty());
        assert!(fx.events.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_default_session_created_and_trace_recorded() {
        let fx = Fixture::new();
        let sup = supervisor(&fx);

        let out = sup.run_cycle(None).await.unwrap();
        let CycleOutcome::Completed(incident) = out else {
            panic!("expected a completed cycle");
        };

        let sessions = sup.sessions().list().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, DEFAULT_SESSION_NAME);
        assert_eq!(sessions[0].last_trace_id.as_deref(), Some(incident.trace_id.as_str()));
        assert_eq!(incident.session_id.as_deref(), Some(sessions[0].session_id.as_str()));
    }

    #[tokio::test]
    async fn test_skip_record_wire_form() {
        let fx = Fixture::new();
        let sup = supervisor(&fx);
        let s = sup.sessions().create("ops", Map::new()).unwrap();
        sup.sessions().pause(&s.session_id).unwrap();

        let out = sup.start_step(Some(&s.session_id)).await.unwrap();
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["skipped"], true);
        assert_eq!(v["reason"], "paused");
    }

    #[tokio::test]
    async fn test_step_then_resume_updates_session() {
        let fx = Fixture::new();
        let sup = supervisor(&fx);
        let s = sup.sessions().create("ops", Map::new()).unwrap();

        let StepOutcome::Suspended { checkpoint, .. } = sup.start_step(Some(&s.session_id)).await.unwrap() else {
            panic!("expected suspension");
        };
        let trace_id = checkpoint.trace_id.clone();
        sup.resume(*checkpoint, ApprovalDecision::Approve { plan: None })
            .await
            .unwrap();

        let session = sup.sessions().get(&s.session_id).unwrap();
        assert_eq!(session.last_trace_id.as_deref(), Some(trace_id.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_session_id_is_error() {
        let fx = Fixture::new();
        let sup = supervisor(&fx);
        assert!(matches!(
            sup.run_cycle(Some("missing")).await,
            Err(PipelineError::Session(_))
        ));
    }
}
