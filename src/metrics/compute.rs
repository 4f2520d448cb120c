//! Pure derivations over fetched conversation/transaction data.
//!
//! Everything here is deterministic: identical inputs produce byte-identical
//! outputs, with no clock reads and no ordering dependency beyond the
//! explicit sort. The engine in the parent module owns fetching and
//! publication; these functions own the math.

use chrono::{Datelike, Weekday};
use rust_decimal::Decimal;

use crate::api::types::{Client, ConversationMessage, MessageKind, Transaction};
use crate::config::MetricsConfig;

use super::{
    Aggregation, ClientPerformance, EngagementStatus, Sender, SymmetryPoint, TimelineEntry,
    TxRatioPoint, WeekdayGap,
};

/// Fixed Sun..Sat emission order for the weekday series.
const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Sort messages ascending by timestamp. Gap math requires this; the
/// backend does not guarantee wire order.
pub fn sort_messages(mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    messages.sort_by_key(|m| m.created_at);
    messages
}

/// `numerator / denominator` with the zero-denominator case pinned to 0.0,
/// never NaN or infinity.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Ratio of agent-authored to client-authored messages in a thread.
pub fn symmetry_ratio(messages: &[ConversationMessage]) -> f64 {
    let agent_to_client = messages
        .iter()
        .filter(|m| m.kind == MessageKind::AgentToClient)
        .count();
    let client_to_agent = messages
        .iter()
        .filter(|m| m.kind == MessageKind::ClientToAgent)
        .count();
    ratio(agent_to_client, client_to_agent)
}

/// Ratio of transaction count to conversation-message count.
pub fn tx_ratio(transaction_count: usize, message_count: usize) -> f64 {
    ratio(transaction_count, message_count)
}

/// Inter-message gaps in hours between consecutive messages, keyed by the
/// weekday of the LATER message of each pair. Input must be sorted.
pub fn weekday_gaps(sorted: &[ConversationMessage]) -> Vec<(Weekday, f64)> {
    sorted
        .windows(2)
        .map(|pair| {
            let hours = (pair[1].created_at - pair[0].created_at).num_seconds() as f64 / 3600.0;
            (pair[1].created_at.weekday(), hours)
        })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Three-band engagement rating from transaction count.
pub fn engagement_status(transaction_count: u64, thresholds: MetricsConfig) -> EngagementStatus {
    if transaction_count > thresholds.excellent_over {
        EngagementStatus::Excellent
    } else if transaction_count > thresholds.steady_over {
        EngagementStatus::Steady
    } else {
        EngagementStatus::Dormant
    }
}

/// Map a sorted conversation into the display timeline.
///
/// Transaction and emotional messages carry no direction on the wire; they
/// originate from client activity, so they render on the client side with
/// their kind preserved for badging.
pub fn build_timeline(sorted: &[ConversationMessage]) -> Vec<TimelineEntry> {
    sorted
        .iter()
        .map(|m| TimelineEntry {
            time: m.created_at,
            sender: match m.kind {
                MessageKind::AgentToClient => Sender::Agent,
                _ => Sender::Client,
            },
            kind: m.kind,
            message: m.content.clone(),
        })
        .collect()
}

/// Fold per-client fetch results into the derived series.
///
/// `fetched` is positionally aligned with `clients`. The caller joins all
/// fetches before calling; nothing here is published incrementally.
pub fn aggregate(
    clients: &[Client],
    fetched: &[(Vec<Transaction>, Vec<ConversationMessage>)],
    thresholds: MetricsConfig,
) -> Aggregation {
    let mut symmetry = Vec::with_capacity(clients.len());
    let mut tx_ratios = Vec::with_capacity(clients.len());
    let mut performance = Vec::with_capacity(clients.len());
    let mut gap_buckets: [Vec<f64>; 7] = Default::default();
    let mut total_revenue = Decimal::ZERO;
    let mut top_client: Option<&Client> = None;

    for (client, (transactions, conversations)) in clients.iter().zip(fetched) {
        let transaction_count = transactions.len();
        let revenue: Decimal = transactions.iter().map(|t| t.amount).sum();
        total_revenue += revenue;

        // Strictly-greater comparison: the first client encountered wins a
        // score tie and is not re-evaluated.
        if top_client.is_none_or(|current| client.score > current.score) {
            top_client = Some(client);
        }

        let sorted = sort_messages(conversations.clone());
        let symmetry_value = symmetry_ratio(&sorted);
        let gaps = weekday_gaps(&sorted);
        let gap_hours: Vec<f64> = gaps.iter().map(|(_, hours)| *hours).collect();
        for (day, hours) in gaps {
            gap_buckets[day.num_days_from_sunday() as usize].push(hours);
        }
        let tx_ratio_value = tx_ratio(transaction_count, sorted.len());

        symmetry.push(SymmetryPoint {
            client: client.name.clone(),
            ratio: symmetry_value,
        });
        tx_ratios.push(TxRatioPoint {
            client: client.name.clone(),
            ratio: tx_ratio_value,
            revenue,
        });
        performance.push(ClientPerformance {
            client_id: client.id,
            name: client.name.clone(),
            score: client.score,
            symmetry_ratio: symmetry_value,
            avg_gap_hours: mean(&gap_hours),
            tx_ratio: tx_ratio_value,
            status: engagement_status(transaction_count as u64, thresholds),
        });
    }

    // Days with zero observations are omitted, not zero-filled.
    let weekday_gaps = WEEKDAYS
        .iter()
        .enumerate()
        .filter(|(index, _)| !gap_buckets[*index].is_empty())
        .map(|(index, day)| WeekdayGap {
            day: *day,
            avg_gap_hours: mean(&gap_buckets[index]),
        })
        .collect();

    Aggregation {
        symmetry,
        weekday_gaps,
        tx_ratios,
        clients: performance,
        total_revenue,
        top_client_id: top_client.map(|c| c.id),
    }
}
