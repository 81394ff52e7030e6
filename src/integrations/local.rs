//! File-backed stand-ins for the notification, task and email integrations.
//!
//! Each tool appends `{timestamp, target, message, result}` entries to its own
//! JSON array log using the atomic-replace discipline from [`crate::storage`].

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{IntegrationError, Mailer, NotificationChannel, TaskTracker};
use crate::storage::JsonArrayFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalLogEntry {
    pub timestamp: DateTime<Utc>,
    /// Channel, assignee or recipient.
    pub target: String,
    pub message: String,
    pub result: Value,
}

impl LocalLogEntry {
    fn new(target: &str, message: &str, result: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            target: target.to_string(),
            message: message.to_string(),
            result,
        }
    }
}

fn open_log(path: impl Into<PathBuf>) -> Result<JsonArrayFile<LocalLogEntry>, IntegrationError> {
    let log = JsonArrayFile::new(path);
    log.ensure()?;
    Ok(log)
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

pub struct LocalNotifier {
    log: JsonArrayFile<LocalLogEntry>,
}

impl LocalNotifier {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IntegrationError> {
        Ok(Self { log: open_log(path)? })
    }

    pub fn entries(&self) -> Result<Vec<LocalLogEntry>, IntegrationError> {
        Ok(self.log.load()?)
    }
}

#[async_trait]
impl NotificationChannel for LocalNotifier {
    async fn post(&self, channel: &str, text: &str) -> Result<Value, IntegrationError> {
        let result = json!({ "ok": true, "channel": channel });
        let entry = LocalLogEntry::new(channel, text, result.clone());
        self.log.update(|log| log.push(entry))?;
        info!(channel, "local notification posted");
        Ok(result)
    }

    async fn request_approval(
        &self,
        channel: &str,
        text: &str,
        action_id: &str,
    ) -> Result<Value, IntegrationError> {
        let result = json!({
            "ok": true,
            "channel": channel,
            "action_id": action_id,
            "approval": "pending",
        });
        let entry = LocalLogEntry::new(channel, text, result.clone());
        self.log.update(|log| log.push(entry))?;
        info!(channel, action_id, "local approval request posted");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Task tracker
// ---------------------------------------------------------------------------

pub struct LocalTaskTracker {
    log: JsonArrayFile<LocalLogEntry>,
}

impl LocalTaskTracker {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IntegrationError> {
        Ok(Self { log: open_log(path)? })
    }

    pub fn entries(&self) -> Result<Vec<LocalLogEntry>, IntegrationError> {
        Ok(self.log.load()?)
    }
}

#[async_trait]
impl TaskTracker for LocalTaskTracker {
    async fn create(&self, title: &str, body: &str, assignee: &str) -> Result<Value, IntegrationError> {
        let task = self.log.update(|log| {
            let now = Utc::now();
            let task = json!({
                "id": format!("TASK-{}-{}", now.timestamp(), log.len() + 1),
                "title": title,
                "body": body,
                "assignee": assignee,
                "timestamp": now,
            });
            log.push(LocalLogEntry {
                timestamp: now,
                target: assignee.to_string(),
                message: title.to_string(),
                result: task.clone(),
            });
            task
        })?;
        info!(id = %task["id"], assignee, "local task created");
        Ok(json!({ "ok": true, "task": task }))
    }
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

pub struct LocalMailer {
    log: JsonArrayFile<LocalLogEntry>,
}

impl LocalMailer {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IntegrationError> {
        Ok(Self { log: open_log(path)? })
    }

    pub fn entries(&self) -> Result<Vec<LocalLogEntry>, IntegrationError> {
        Ok(self.log.load()?)
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<Value, IntegrationError> {
        let result = json!({ "ok": true, "to": to, "subject": subject, "body": body });
        let entry = LocalLogEntry::new(to, subject, result.clone());
        self.log.update(|log| log.push(entry))?;
        info!(to, subject, "local email recorded");
        Ok(result)
    }
}
