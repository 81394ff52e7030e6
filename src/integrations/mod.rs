//! Side-effecting collaborators used by the dispatcher and orchestrator.
//!
//! Every call goes through a [`Tiered`] chain: the remote tools API when
//! configured, else (or on remote failure) the file-backed local tool, else a
//! clearly marked mock result.

pub mod knowledge;
pub mod local;
pub mod reasoner;
pub mod remote;
pub mod report;

pub use knowledge::KeywordKnowledgeStore;
pub use local::{LocalLogEntry, LocalMailer, LocalNotifier, LocalTaskTracker};
pub use reasoner::HttpReasoner;
pub use remote::RemoteTools;
pub use report::{ReportInput, TextReportGenerator};

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("integration unavailable: {0}")]
    Unavailable(String),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("report rendering failed: {0}")]
    Render(String),
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn post(&self, channel: &str, text: &str) -> Result<Value, IntegrationError>;

    /// Post an interactive approval request identified by `action_id`.
    async fn request_approval(
        &self,
        channel: &str,
        text: &str,
        action_id: &str,
    ) -> Result<Value, IntegrationError>;
}

#[async_trait]
pub trait TaskTracker: Send + Sync {
    async fn create(&self, title: &str, body: &str, assignee: &str) -> Result<Value, IntegrationError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<Value, IntegrationError>;
}

/// Renders a run's artifact; callers treat failures as best-effort.
pub trait ReportGenerator: Send + Sync {
    fn generate(&self, input: &ReportInput<'_>) -> Result<PathBuf, IntegrationError>;
}

/// A past incident as stored in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub summary: String,
    /// Actions taken.
    pub resolution: Vec<String>,
    /// Reason codes found.
    pub root_cause: Vec<String>,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub id: String,
    pub summary: String,
    pub score: f64,
    #[serde(default)]
    pub resolution: Vec<String>,
    #[serde(default)]
    pub root_cause: Vec<String>,
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn add(&self, entry: KnowledgeEntry) -> Result<(), IntegrationError>;
    async fn search(&self, query: &str, top_n: usize) -> Result<Vec<SimilarIncident>, IntegrationError>;
}

/// Which implementation served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Remote,
    Local,
    Mock,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Tier::Remote => "remote",
            Tier::Local => "local",
            Tier::Mock => "mock",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierResult {
    pub tier: Tier,
    pub value: Value,
}

/// Remote-then-local-then-mock chain over one collaborator kind.
pub struct Tiered<T: ?Sized> {
    remote: Option<Arc<T>>,
    local: Option<Arc<T>>,
}

impl<T: ?Sized> Clone for Tiered<T> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            local: self.local.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync> Tiered<T> {
    pub fn new(remote: Option<Arc<T>>, local: Option<Arc<T>>) -> Self {
        Self { remote, local }
    }

    /// Neither tier configured; every call returns a mock result.
    pub fn mock_only() -> Self {
        Self::new(None, None)
    }

    pub async fn call<'a, F, Fut>(&'a self, op: &'static str, f: F) -> Result<TierResult, IntegrationError>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<Value, IntegrationError>>,
    {
        if let Some(remote) = self.remote.as_deref() {
            match f(remote).await {
                Ok(value) => {
                    return Ok(TierResult {
                        tier: Tier::Remote,
                        value,
                    })
                }
                Err(e) if self.local.is_some() => {
                    warn!(op, error = %e, "remote integration failed, falling back to local tool");
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(local) = self.local.as_deref() {
            let value = f(local).await?;
            return Ok(TierResult {
                tier: Tier::Local,
                value,
            });
        }

        debug!(op, "no integration configured, returning mock result");
        Ok(TierResult {
            tier: Tier::Mock,
            value: json!({ "ok": true, "mock": true, "op": op }),
        })
    }
}

/// A created task, normalized from the shapes different trackers return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl TaskRef {
    /// Accepts `{"ok": true, "task": {...}}`, `{"card": {...}}` or a bare task object.
    pub fn from_response(value: &Value) -> Option<Self> {
        let inner = match (value.get("ok").and_then(Value::as_bool), value.get("task"), value.get("card")) {
            (Some(true), Some(task), _) => task,
            (_, _, Some(card)) => card,
            _ => value,
        };
        let obj = inner.as_object()?;

        let id = match obj.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let mut fields = obj.clone();
        fields.remove("id");
        Some(Self { id, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for Counter {
        async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<Value, IntegrationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(IntegrationError::Unavailable("smtp down".into()))
            } else {
                Ok(json!({"ok": true, "to": to}))
            }
        }
    }

    fn counter(fail: bool) -> Arc<Counter> {
        Arc::new(Counter {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_remote_preferred() {
        let remote = counter(false);
        let local = counter(false);
        let tiered: Tiered<dyn Mailer> = Tiered::new(Some(remote.clone()), Some(local.clone()));

        let out = tiered.call("send_email", |m| m.send("a@b", "s", "b")).await.unwrap();
        assert_eq!(out.tier, Tier::Remote);
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let remote = counter(true);
        let local = counter(false);
        let tiered: Tiered<dyn Mailer> = Tiered::new(Some(remote.clone()), Some(local.clone()));

        let out = tiered.call("send_email", |m| m.send("a@b", "s", "b")).await.unwrap();
        assert_eq!(out.tier, Tier::Local);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_without_local_is_error() {
        let tiered: Tiered<dyn Mailer> = Tiered::new(Some(counter(true)), None);
        assert!(tiered.call("send_email", |m| m.send("a@b", "s", "b")).await.is_err());
    }

    #[tokio::test]
    async fn test_nothing_configured_is_mock() {
        let tiered: Tiered<dyn Mailer> = Tiered::mock_only();
        let out = tiered.call("send_email", |m| m.send("a@b", "s", "b")).await.unwrap();
        assert_eq!(out.tier, Tier::Mock);
        assert_eq!(out.value["mock"], true);
        assert_eq!(out.value["op"], "send_email");
    }

    #[test]
    fn test_task_ref_shapes() {
        let wrapped = json!({"ok": true, "task": {"id": "TASK-1", "title": "t"}});
        assert_eq!(TaskRef::from_response(&wrapped).unwrap().id, "TASK-1");

        let card = json!({"ok": true, "method": "trello", "card": {"id": 42, "name": "x"}});
        let r = TaskRef::from_response(&card).unwrap();
        assert_eq!(r.id, "42");
        assert_eq!(r.fields["name"], "x");

        let bare = json!({"id": "abc"});
        assert_eq!(TaskRef::from_response(&bare).unwrap().id, "abc");

        assert!(TaskRef::from_response(&json!({"ok": true, "mock": true})).is_none());
        assert!(TaskRef::from_response(&json!("TASK-1")).is_none());
    }
}
