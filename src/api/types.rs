//! Canonical entity shapes for backend resources.
//!
//! The backend's endpoints disagree on field casing: the gorm-backed lists
//! emit `PascalCase` (`ID`, `Name`, `CreatedAt`) while newer revisions emit
//! `camelCase`. This module is the single normalization layer; everything
//! behind the facade sees exactly one shape. Unknown message types map to
//! [`MessageKind::Other`] so an unrecognized row cannot poison a whole list.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Backend-tracked persona that owns zero or more clients. Read-only
/// projection; never mutated client-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    #[serde(alias = "ID")]
    pub id: u64,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "ClientCount", alias = "clientCount")]
    pub client_count: u64,
    #[serde(default, alias = "Status")]
    pub status: AgentStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
}

/// Counterparty engaged in conversations/transactions with an agent.
///
/// `score` is an externally computed importance indicator with an
/// open-ended range; it drives sorting and the most-active-client pick,
/// never any client-side recomputation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    #[serde(alias = "ID")]
    pub id: u64,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Score")]
    pub score: f64,
}

/// Direction/kind of a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    ClientToAgent,
    AgentToClient,
    Transaction,
    Emotional,
    #[serde(other)]
    Other,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientToAgent => "client_to_agent",
            Self::AgentToClient => "agent_to_client",
            Self::Transaction => "transaction",
            Self::Emotional => "emotional",
            Self::Other => "other",
        }
    }
}

/// One message in an agent/client conversation thread.
///
/// Must be sorted ascending by `created_at` before any gap computation;
/// the backend does not guarantee order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    #[serde(alias = "ID")]
    pub id: u64,
    #[serde(alias = "CreatedAt", alias = "createdAt", alias = "Date")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type", alias = "Type")]
    pub kind: MessageKind,
    #[serde(default, alias = "Content")]
    pub content: String,
}

/// A transaction row. Only the amount matters to the console; every other
/// wire field is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    #[serde(alias = "Amount")]
    pub amount: Decimal,
}

/// Response of the completion collaborator.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmAnswer {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub total_duration: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of the image-generation collaborator: base64-encoded images.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ImageBatch {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}
