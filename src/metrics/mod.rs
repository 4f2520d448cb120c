//! Metrics aggregation pipeline.
//!
//! For one selected agent: fetch all its clients, join every per-client
//! conversation/transaction fetch, derive the performance series, and
//! publish all six outputs atomically as one [`PerformanceReport`]. Nothing
//! becomes visible until the whole run has resolved, so the shell never
//! sees a partial flash.
//!
//! Re-entrancy: each run captures a generation from a monotonic counter at
//! dispatch; publication is skipped when a newer run has been dispatched
//! since. Last-selected-agent wins, regardless of response ordering.

pub mod compute;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc, Weekday};
use futures::future::join_all;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::api::ApiClient;
use crate::api::types::MessageKind;
use crate::config::MetricsConfig;

/// Three-band engagement rating derived from transaction count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementStatus {
    Excellent,
    Steady,
    Dormant,
}

impl EngagementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Steady => "steady",
            Self::Dormant => "dormant",
        }
    }
}

/// Which side of the conversation a timeline entry renders on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Agent,
    Client,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Client => "client",
        }
    }
}

/// One bar of the symmetry chart.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryPoint {
    pub client: String,
    pub ratio: f64,
}

/// One point of the weekday-gap line.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekdayGap {
    pub day: Weekday,
    pub avg_gap_hours: f64,
}

/// One point of the transaction-ratio scatter.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRatioPoint {
    pub client: String,
    pub ratio: f64,
    pub revenue: Decimal,
}

/// Per-client derived row of the performance table. Recomputed on every
/// run, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientPerformance {
    pub client_id: u64,
    pub name: String,
    pub score: f64,
    pub symmetry_ratio: f64,
    pub avg_gap_hours: f64,
    pub tx_ratio: f64,
    pub status: EngagementStatus,
}

/// One row of the most-active-client timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub time: DateTime<Utc>,
    pub sender: Sender,
    pub kind: MessageKind,
    pub message: String,
}

/// Intermediate fold over the joined per-client results, before the
/// timeline re-fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub symmetry: Vec<SymmetryPoint>,
    pub weekday_gaps: Vec<WeekdayGap>,
    pub tx_ratios: Vec<TxRatioPoint>,
    pub clients: Vec<ClientPerformance>,
    pub total_revenue: Decimal,
    pub top_client_id: Option<u64>,
}

/// The six derived outputs, published together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub agent_id: u64,
    pub symmetry: Vec<SymmetryPoint>,
    pub weekday_gaps: Vec<WeekdayGap>,
    pub tx_ratios: Vec<TxRatioPoint>,
    pub clients: Vec<ClientPerformance>,
    pub total_revenue: Decimal,
    pub timeline: Vec<TimelineEntry>,
}

/// Drives metrics runs and holds the currently published report.
pub struct MetricsEngine {
    api: Arc<ApiClient>,
    thresholds: MetricsConfig,
    generation: AtomicU64,
    report: RwLock<Option<Arc<PerformanceReport>>>,
}

impl MetricsEngine {
    pub fn new(api: Arc<ApiClient>, thresholds: MetricsConfig) -> Self {
        Self {
            api,
            thresholds,
            generation: AtomicU64::new(0),
            report: RwLock::new(None),
        }
    }

    /// The currently published report, if any run has completed.
    pub async fn current(&self) -> Option<Arc<PerformanceReport>> {
        self.report.read().await.clone()
    }

    /// Run the full pipeline for `agent_id` and publish the result.
    ///
    /// Returns `None` when a newer run was dispatched while this one was in
    /// flight; the stale result is discarded unpublished.
    pub async fn refresh(&self, agent_id: u64) -> Option<Arc<PerformanceReport>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let report = Arc::new(self.run(agent_id).await);

        let mut slot = self.report.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(
                "Discarding stale metrics run {} for agent {}",
                generation,
                agent_id
            );
            return None;
        }
        *slot = Some(Arc::clone(&report));
        Some(report)
    }

    async fn run(&self, agent_id: u64) -> PerformanceReport {
        let clients = self.api.clients(agent_id).await;

        // Join-all semantics: every per-client fetch resolves before any
        // derivation, so publication can never interleave partial data.
        let fetched = join_all(clients.iter().map(|client| async move {
            let transactions = self.api.transactions(agent_id, client.id).await;
            let conversations = self.api.conversations(agent_id, client.id).await;
            (transactions, conversations)
        }))
        .await;

        let aggregation = compute::aggregate(&clients, &fetched, self.thresholds);

        let timeline = match aggregation.top_client_id {
            Some(client_id) => {
                let conversations = self.api.conversations(agent_id, client_id).await;
                compute::build_timeline(&compute::sort_messages(conversations))
            }
            None => Vec::new(),
        };

        PerformanceReport {
            agent_id,
            symmetry: aggregation.symmetry,
            weekday_gaps: aggregation.weekday_gaps,
            tx_ratios: aggregation.tx_ratios,
            clients: aggregation.clients,
            total_revenue: aggregation.total_revenue,
            timeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, SessionConfig, validate_base_url};
    use crate::session::SessionStore;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn unreachable_backend_publishes_an_empty_report() {
        let dir = tempdir().unwrap();
        let api_config = ApiConfig {
            base_url: validate_base_url("http://127.0.0.1:1", "test").unwrap(),
            timeout: Duration::from_millis(200),
        };
        let session_config = SessionConfig {
            session_path: dir.path().join("session.json"),
            banner_ttl: Duration::from_secs(8),
        };
        let store = Arc::new(SessionStore::open(&api_config, &session_config).await);
        let api = Arc::new(ApiClient::new(&api_config, store));
        let engine = MetricsEngine::new(api, MetricsConfig::default());

        // Every fetch degrades to empty; the derived report is the
        // zero-clients edge case, published atomically.
        let report = engine.refresh(42).await.expect("no newer run exists");
        assert_eq!(report.agent_id, 42);
        assert!(report.symmetry.is_empty());
        assert!(report.weekday_gaps.is_empty());
        assert!(report.clients.is_empty());
        assert_eq!(report.total_revenue, Decimal::ZERO);
        assert!(report.timeline.is_empty());

        assert_eq!(engine.current().await.as_deref(), Some(report.as_ref()));
    }
}
