use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

use crate::models::{EventKind, GatewayEvent, GatewayStats};

/// Bounded in-process record of gateway decisions plus monotonic counters.
/// When the buffer is full the oldest event is dropped; the counters keep
/// counting. Read-only from the operational endpoints.
pub struct EventLog {
    events: Mutex<VecDeque<GatewayEvent>>,
    capacity: usize,
    challenges_issued: AtomicU64,
    payments_admitted: AtomicU64,
    payments_rejected: AtomicU64,
    started_at: Instant,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            challenges_issued: AtomicU64::new(0),
            payments_admitted: AtomicU64::new(0),
            payments_rejected: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record(
        &self,
        kind: EventKind,
        path: &str,
        tx_hash: Option<String>,
        detail: impl Into<String>,
    ) {
        match kind {
            EventKind::ChallengeIssued => self.challenges_issued.fetch_add(1, Ordering::Relaxed),
            EventKind::Admitted => self.payments_admitted.fetch_add(1, Ordering::Relaxed),
            EventKind::Rejected => self.payments_rejected.fetch_add(1, Ordering::Relaxed),
        };

        let event = GatewayEvent {
            request_id: Uuid::new_v4(),
            at: Utc::now(),
            kind,
            path: path.to_string(),
            tx_hash,
            detail: detail.into(),
        };

        let mut events = self.events.lock().unwrap();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Newest first, at most `limit` entries.
    pub fn recent(&self, limit: usize) -> Vec<GatewayEvent> {
        let events = self.events.lock().unwrap();
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            challenges_issued: self.challenges_issued.load(Ordering::Relaxed),
            payments_admitted: self.payments_admitted.load(Ordering::Relaxed),
            payments_rejected: self.payments_rejected.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
