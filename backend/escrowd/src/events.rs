//! Journal rows for committed escrow engine events.
//!
//! Amounts are stored as decimal text; SQLite integers are 64-bit and the
//! engine counts in `u128`.

use blockfund_escrow::EscrowEvent;
use serde::{Deserialize, Serialize};

/// An engine event flattened for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub session: i64,
    pub seq: i64,
    pub event_type: &'static str,
    pub project_id: i64,
    pub phase_id: Option<i64>,
    pub actor: Option<String>,
    pub amount: Option<String>,
    pub detail: Option<String>,
    pub timestamp: i64,
}

impl JournalEntry {
    pub fn from_event(session: i64, event: &EscrowEvent) -> Self {
        Self {
            session,
            seq: to_i64(event.seq),
            event_type: event.kind.as_str(),
            project_id: to_i64(event.project_id),
            phase_id: event.phase_id.map(i64::from),
            actor: event.actor.as_ref().map(|p| p.as_str().to_string()),
            amount: event.amount.map(|a| a.to_string()),
            detail: event.detail.clone(),
            timestamp: to_i64(event.at),
        }
    }
}

/// A journal row as read back from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub session: i64,
    pub seq: i64,
    pub event_type: String,
    pub project_id: i64,
    pub phase_id: Option<i64>,
    pub actor: Option<String>,
    pub amount: Option<String>,
    pub detail: Option<String>,
    pub timestamp: i64,
    pub created_at: i64,
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
