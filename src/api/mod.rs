//! API gateway facade for the siren-net backend.
//!
//! The only component permitted to construct outbound HTTP requests to the
//! data endpoints. Centralizes bearer-header attachment and error-to-empty
//! normalization: list operations degrade to `[]` on any transport failure,
//! non-2xx status, or non-JSON body, logging a diagnostic with a truncated
//! excerpt. Action operations (completion, image generation) surface a typed
//! error instead. Nothing returned here can panic a caller, and no response
//! is cached; every call is a fresh round trip.

pub mod types;

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::session::SessionStore;
use types::{Agent, Client as ClientRecord, ConversationMessage, ImageBatch, LlmAnswer, Transaction};

/// Max characters of a response body quoted in diagnostics.
const BODY_EXCERPT_MAX: usize = 160;

/// Result of the protected-resource session probe.
///
/// `Invalid` means the backend explicitly refused the token; transport
/// failures are errors, not invalidity, so a flaky network cannot log the
/// operator out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    Invalid,
}

/// Authenticated HTTP facade over the backend's REST surface.
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: Arc<SessionStore>) -> Self {
        Self {
            http: Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.clone(),
            session,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token().await {
            Some(token) => request.header(
                AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    /// GET a list endpoint, degrading every failure mode to an empty list.
    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Vec<T> {
        let response = match self
            .authorized(self.http.get(self.endpoint(path)))
            .await
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("GET {} failed: {}", path, e);
                return Vec::new();
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!(
                "GET {} returned HTTP {}: {}",
                path,
                status.as_u16(),
                excerpt(&body)
            );
            return Vec::new();
        }
        if !content_type.starts_with("application/json") {
            tracing::warn!(
                "GET {} returned non-JSON body ({}): {}",
                path,
                content_type,
                excerpt(&body)
            );
            return Vec::new();
        }

        match serde_json::from_str(&body) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("GET {} body did not parse: {} ({})", path, e, excerpt(&body));
                Vec::new()
            }
        }
    }

    /// POST an action endpoint and parse its JSON body.
    async fn post_action<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self
            .authorized(self.http.post(self.endpoint(path)).json(payload))
            .await
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            // Prefer the backend's own error message when the body carries one.
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body)
                && let Some(message) = value.get("error").and_then(|v| v.as_str())
            {
                return Err(ApiError::Backend {
                    message: message.to_string(),
                });
            }
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                excerpt: excerpt(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// List all agents visible to the session.
    pub async fn agents(&self) -> Vec<Agent> {
        self.get_list("agents").await
    }

    /// List the clients of one agent.
    pub async fn clients(&self, agent_id: u64) -> Vec<ClientRecord> {
        self.get_list(&format!("clients/agent/{agent_id}")).await
    }

    /// List the conversation messages for an agent/client pair.
    ///
    /// Returned in wire order; callers sort before gap math.
    pub async fn conversations(&self, agent_id: u64, client_id: u64) -> Vec<ConversationMessage> {
        self.get_list(&format!("messages/agent/{agent_id}/client/{client_id}"))
            .await
    }

    /// List the transactions for an agent/client pair.
    pub async fn transactions(&self, agent_id: u64, client_id: u64) -> Vec<Transaction> {
        self.get_list(&format!("transactions/agent/{agent_id}/client/{client_id}"))
            .await
    }

    /// Probe the protected resource to check the held token is still accepted.
    pub async fn probe(&self) -> Result<ProbeOutcome, ApiError> {
        let path = "protected/";
        let response = self
            .authorized(self.http.get(self.endpoint(path)))
            .await
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let has_error_field = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("error").cloned())
            .is_some_and(|e| !e.is_null());

        if !status.is_success() || has_error_field {
            return Ok(ProbeOutcome::Invalid);
        }
        Ok(ProbeOutcome::Valid)
    }

    /// Submit a prompt to the completion collaborator.
    pub async fn ask(&self, prompt: &str) -> Result<LlmAnswer, ApiError> {
        let mut answer: LlmAnswer = self
            .post_action("llm/ask", &serde_json::json!({ "prompt": prompt }))
            .await?;
        if let Some(message) = answer.error.take() {
            return Err(ApiError::Backend { message });
        }
        Ok(answer)
    }

    /// Submit a prompt to the image-generation collaborator.
    pub async fn generate_image(&self, prompt: &str) -> Result<ImageBatch, ApiError> {
        let mut batch: ImageBatch = self
            .post_action("sd/generate", &serde_json::json!({ "prompt": prompt }))
            .await?;
        if let Some(message) = batch.error.take() {
            return Err(ApiError::Backend { message });
        }
        Ok(batch)
    }
}

/// Truncate a response body for log diagnostics.
fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_MAX {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_EXCERPT_MAX).collect();
    format!("{cut}...")
}
