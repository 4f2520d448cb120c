//! Prompt composition for the completion collaborator.
//!
//! Builds one prompt string from a selected agent/client pair's
//! conversation history plus free-text operator guidance, and splits the
//! returned completion into an optional reasoning segment and the displayed
//! answer. The backend proxies a reasoning model that embeds its chain of
//! thought in `<think>...</think>` tags.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::api::types::{ConversationMessage, MessageKind};
use crate::error::PromptError;
use crate::metrics::compute::sort_messages;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Parsed completion: optional reasoning plus the displayed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmReply {
    pub thinking: Option<String>,
    pub answer: String,
    pub model: String,
}

/// Build the prompt text: transcript lines, a blank separator, then the
/// guidance. Returns `None` when the guidance is empty or whitespace-only;
/// the operation must not be invokable in that case.
pub fn compose(messages: &[ConversationMessage], guidance: &str) -> Option<String> {
    let guidance = guidance.trim();
    if guidance.is_empty() {
        return None;
    }

    let mut lines: Vec<String> = messages
        .iter()
        .filter_map(|m| match m.kind {
            MessageKind::ClientToAgent => Some(format!("user: {}", m.content)),
            MessageKind::AgentToClient => Some(format!("assistant: {}", m.content)),
            // Transaction/emotional rows carry no dialogue to replay.
            _ => None,
        })
        .collect();

    lines.push(String::new());
    lines.push(guidance.to_string());
    Some(lines.join("\n"))
}

/// Split a completion into its reasoning segment and the remainder.
///
/// When a `<think>...</think>` span is present its inner text becomes the
/// reasoning and the span is stripped from the answer; otherwise the whole
/// response is the answer.
pub fn split_reasoning(response: &str) -> (Option<String>, String) {
    if let Some(start) = response.find(THINK_OPEN)
        && let Some(inner_len) = response[start + THINK_OPEN.len()..].find(THINK_CLOSE)
    {
        let inner_start = start + THINK_OPEN.len();
        let inner = &response[inner_start..inner_start + inner_len];

        let mut answer = String::with_capacity(response.len());
        answer.push_str(&response[..start]);
        answer.push_str(&response[inner_start + inner_len + THINK_CLOSE.len()..]);

        (Some(inner.trim().to_string()), answer.trim().to_string())
    } else {
        (None, response.trim().to_string())
    }
}

/// Composes prompts from conversation history and parses the reply.
pub struct PromptComposer {
    api: Arc<ApiClient>,
}

impl PromptComposer {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Fetch the pair's conversation, compose the bundle, submit it, and
    /// parse the structured response.
    pub async fn ask(
        &self,
        selection: Option<(u64, u64)>,
        guidance: &str,
    ) -> Result<LlmReply, PromptError> {
        let (agent_id, client_id) = selection.ok_or(PromptError::NothingSelected)?;
        if guidance.trim().is_empty() {
            return Err(PromptError::EmptyGuidance);
        }

        let messages = sort_messages(self.api.conversations(agent_id, client_id).await);
        let prompt = compose(&messages, guidance).ok_or(PromptError::EmptyGuidance)?;

        let completion = self.api.ask(&prompt).await?;
        let (thinking, answer) = split_reasoning(&completion.response);
        Ok(LlmReply {
            thinking,
            answer,
            model: completion.model,
        })
    }
}
