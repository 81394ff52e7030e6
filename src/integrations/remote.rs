use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{IntegrationError, Mailer, NotificationChannel, TaskTracker};
use crate::config::IntegrationsConfig;

/// Client for the remote tools API (`POST {base}/openapi/...`).
pub struct RemoteTools {
    client: Client,
    base: String,
    from_email: String,
}

impl RemoteTools {
    pub fn new(base: &str, cfg: &IntegrationsConfig) -> Result<Self, IntegrationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|source| IntegrationError::Http {
                url: base.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            from_email: cfg.from_email.clone(),
        })
    }

    /// `None` when no base URL is configured.
    pub fn from_config(cfg: &IntegrationsConfig) -> Result<Option<Self>, IntegrationError> {
        match cfg.tools_base_url.as_deref() {
            Some(base) if !base.trim().is_empty() => Self::new(base, cfg).map(Some),
            _ => Ok(None),
        }
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, IntegrationError> {
        let url = format!("{}/openapi/{}", self.base, path);
        debug!(%url, "calling remote tool");
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| IntegrationError::Http {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                url,
                status: status.as_u16(),
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|source| IntegrationError::Http { url, source })
    }
}

#[async_trait]
impl NotificationChannel for RemoteTools {
    async fn post(&self, channel: &str, text: &str) -> Result<Value, IntegrationError> {
        self.post_json("slack", &json!({ "channel": channel, "text": text }))
            .await
    }

    async fn request_approval(
        &self,
        channel: &str,
        text: &str,
        action_id: &str,
    ) -> Result<Value, IntegrationError> {
        self.post_json(
            "approval",
            &json!({ "channel": channel, "text": text, "action_id": action_id }),
        )
        .await
    }
}

#[async_trait]
impl TaskTracker for RemoteTools {
    async fn create(&self, title: &str, body: &str, assignee: &str) -> Result<Value, IntegrationError> {
        self.post_json(
            "task",
            &json!({ "title": title, "body": body, "assignee": assignee }),
        )
        .await
    }
}

#[async_trait]
impl Mailer for RemoteTools {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<Value, IntegrationError> {
        self.post_json(
            "email",
            &json!({
                "to": to,
                "subject": subject,
                "body": body,
                "from_email": self.from_email,
            }),
        )
        .await
    }
}
