//! Serializable state of a suspendable cycle.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::Reason;
use crate::datasource::Datasets;
use crate::detect::Insights;
use crate::integrations::SimilarIncident;
use crate::plan::PlanItem;
use crate::storage::{self, StoreError};

/// Where a cycle stands. Each value names the last stage that ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Collecting,
    Analyzing,
    Correlating,
    Planning,
    Refining,
    AwaitingApproval,
    Executing,
    Completed,
    Rejected,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Rejected)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::Collecting => "collecting",
            Stage::Analyzing => "analyzing",
            Stage::Correlating => "correlating",
            Stage::Planning => "planning",
            Stage::Refining => "refining",
            Stage::AwaitingApproval => "awaiting_approval",
            Stage::Executing => "executing",
            Stage::Completed => "completed",
            Stage::Rejected => "rejected",
        })
    }
}

/// Everything needed to resume a cycle, possibly in another process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub trace_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub awaiting_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub datasets: Option<Datasets>,
    #[serde(default)]
    pub insights: Option<Insights>,
    #[serde(default)]
    pub reasons: Vec<Reason>,
    #[serde(default)]
    pub similar: Vec<SimilarIncident>,
    #[serde(default)]
    pub plan: Vec<PlanItem>,
}

impl Checkpoint {
    /// A fresh cycle with a new trace id.
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            session_id,
            stage: Stage::Idle,
            started_at: Utc::now(),
            awaiting_since: None,
            datasets: None,
            insights: None,
            reasons: Vec::new(),
            similar: Vec::new(),
            plan: Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        storage::write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        storage::read_json(path)
    }

    pub fn clear(path: &Path) -> Result<(), StoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Emitted after each stage completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSignal {
    pub trace_id: String,
    pub stage: Stage,
    pub message: String,
}

/// External input at the approval checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Run the checkpoint's plan, or a replacement edited by the reviewer.
    Approve {
        #[serde(default)]
        plan: Option<Vec<PlanItem>>,
    },
    Reject {
        #[serde(default)]
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        assert!(Checkpoint::load(&path).unwrap().is_none());

        let mut cp = Checkpoint::new(Some("s-1".into()));
        cp.stage = Stage::AwaitingApproval;
        cp.save(&path).unwrap();

        let back = Checkpoint::load(&path).unwrap().unwrap();
        assert_eq!(back, cp);

        Checkpoint::clear(&path).unwrap();
        assert!(!path.exists());
        Checkpoint::clear(&path).unwrap();
    }

    #[test]
    fn test_trace_ids_unique() {
        assert_ne!(Checkpoint::new(None).trace_id, Checkpoint::new(None).trace_id);
    }

    #[test]
    fn test_decision_wire_form() {
        let d: ApprovalDecision = serde_json::from_str(r#"{"decision": "approve"}"#).unwrap();
        assert_eq!(d, ApprovalDecision::Approve { plan: None });

        let d: ApprovalDecision =
            serde_json::from_str(r#"{"decision": "reject", "reason": "too risky"}"#).unwrap();
        assert_eq!(
            d,
            ApprovalDecision::Reject {
                reason: "too risky".into()
            }
        );
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Rejected.is_terminal());
        assert!(!Stage::AwaitingApproval.is_terminal());
    }
}
