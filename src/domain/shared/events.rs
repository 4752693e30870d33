//! Domain event plumbing shared by every bounded context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub trait DomainEvent: Send + Sync {
    /// Dotted name, e.g. `call.ended`
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;

    /// Process-wide recording order. Wall-clock time can tie or go backwards.
    fn sequence(&self) -> u64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
}

impl EventMetadata {
    pub fn new(event_type: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
            occurred_at: Utc::now(),
            event_type: event_type.to_string(),
        }
    }
}
