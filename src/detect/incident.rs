use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::analysis::correlation::{IncidentHistory, Reason};
use crate::detect::Insights;
use crate::dispatch::ActionOutcome;
use crate::plan::PlanItem;
use crate::storage::{EventRecord, EventRepository, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Completed,
    Rejected,
}

/// One finished cycle. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: IncidentStatus,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub insights: Insights,
    pub reasons: Vec<Reason>,
    pub plan: Vec<PlanItem>,
    #[serde(default)]
    pub results: Vec<ActionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl Incident {
    pub fn is_rejected(&self) -> bool {
        self.status == IncidentStatus::Rejected
    }
}

/// Reads and writes incidents through the shared event log.
#[derive(Clone)]
pub struct IncidentManager {
    events: Arc<dyn EventRepository>,
}

impl IncidentManager {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    pub fn record_incident(&self, incident: &Incident) -> Result<Value, StoreError> {
        debug!(trace_id = %incident.trace_id, status = ?incident.status, "recording incident");
        self.events.append_record(&EventRecord::Incident(incident.clone()))
    }

    /// Newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Incident>, StoreError> {
        let mut incidents: Vec<Incident> = self
            .events
            .find_by_type("incident")?
            .into_iter()
            .filter_map(|event| match serde_json::from_value::<Incident>(event) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable incident event");
                    None
                }
            })
            .collect();
        incidents.reverse();
        incidents.truncate(limit);
        Ok(incidents)
    }

    pub fn find(&self, trace_id: &str) -> Result<Option<Incident>, StoreError> {
        Ok(self
            .events
            .find_by_type("incident")?
            .into_iter()
            .filter(|e| e.get("trace_id").and_then(Value::as_str) == Some(trace_id))
            .find_map(|e| serde_json::from_value(e).ok()))
    }
}

impl IncidentHistory for IncidentManager {
    fn prior_incident_count(&self) -> Result<usize, StoreError> {
        Ok(self.events.find_by_type("incident")?.len())
    }
}
