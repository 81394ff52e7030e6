use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RefinerConfig;
use crate::plan::{Reasoner, RefineError};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    text: String,
}

/// Completion backend reached over HTTP: `{model, prompt, temperature}` in, `{text}` out.
pub struct HttpReasoner {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl HttpReasoner {
    pub fn new(endpoint: &str, cfg: &RefinerConfig) -> Result<Self, RefineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| RefineError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        })
    }

    /// `None` when no endpoint is configured.
    pub fn from_config(cfg: &RefinerConfig) -> Result<Option<Self>, RefineError> {
        match cfg.endpoint.as_deref() {
            Some(ep) if !ep.trim().is_empty() => Self::new(ep, cfg).map(Some),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn complete(&self, prompt: &str) -> Result<String, RefineError> {
        debug!(endpoint = %self.endpoint, model = %self.model, "requesting completion");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&CompletionRequest {
                model: &self.model,
                prompt,
                temperature: self.temperature,
            })
            .send()
            .await
            .map_err(|e| RefineError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RefineError::Backend(format!(
                "{} returned {}",
                self.endpoint,
                resp.status()
            )));
        }

        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| RefineError::Backend(e.to_string()))?;
        Ok(body.text)
    }
}
