//! Failure escalation
//!
//! Counts remove/add failures per pair across cycles. When the count reaches
//! the threshold the pair is halted and the count starts over.

use crate::domain::{FailureRecord, StateFile};
use crate::infrastructure::halt::EmergencyHalt;
use crate::infrastructure::storage::{PairState, StateStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, warn};

pub const FAILURE_THRESHOLD: u32 = 3;

pub struct FailureEscalation {
    store: Arc<dyn StateStore>,
    halt: Arc<dyn EmergencyHalt>,
    threshold: u32,
}

impl FailureEscalation {
    pub fn new(store: Arc<dyn StateStore>, halt: Arc<dyn EmergencyHalt>) -> Self {
        Self {
            store,
            halt,
            threshold: FAILURE_THRESHOLD,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Count one failure for `prefix`; returns the record as persisted last
    pub async fn record_failure(&self, prefix: &str, now: DateTime<Utc>) -> FailureRecord {
        let state = PairState::new(self.store.as_ref(), prefix);

        let mut record: FailureRecord = state.load(StateFile::Failures).await.unwrap_or_default();
        record.count += 1;
        record.last_failure = Some(now);
        state.save(StateFile::Failures, &record).await;

        warn!(
            "[Escalation] {} failure {}/{}",
            prefix, record.count, self.threshold
        );

        if record.count >= self.threshold {
            error!(
                "[Escalation] {} reached {} consecutive failures, halting",
                prefix, record.count
            );
            self.halt.halt(prefix, record.count).await;

            record.count = 0;
            record.last_estop = Some(now);
            state.save(StateFile::Failures, &record).await;
        }

        record
    }
}
