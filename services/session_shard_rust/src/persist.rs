//! Best-effort persistence of resolved shots.
//!
//! Totals are already applied in memory by the time a shot reaches here.
//! Failures are logged and dropped.

use courtcall_core::retry::{execute_with_retry, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_MS};
use courtcall_core::session::ResolvedShot;
use courtcall_core::store::{PointsStore, ShotRecordStore};
use courtcall_core::StoreError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct Persistence {
    points: Arc<dyn PointsStore>,
    shots: Arc<dyn ShotRecordStore>,
    max_attempts: u32,
    base_backoff_ms: u64,
}

impl Persistence {
    pub fn new(points: Arc<dyn PointsStore>, shots: Arc<dyn ShotRecordStore>) -> Self {
        Self {
            points,
            shots,
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_backoff_ms: DEFAULT_RETRY_BASE_MS,
        }
    }

    pub fn with_backoff(mut self, max_attempts: u32, base_backoff_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_backoff_ms = base_backoff_ms;
        self
    }

    pub fn points_store(&self) -> &Arc<dyn PointsStore> {
        &self.points
    }

    /// Fire-and-forget write of one resolved shot
    pub fn spawn(&self, resolved: ResolvedShot) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.persist(resolved).await })
    }

    pub async fn persist(&self, resolved: ResolvedShot) {
        let session_id = match resolved.session_id.as_deref() {
            Some(id) => id,
            None => {
                debug!("No session id, skipping persistence");
                return;
            }
        };

        for (slot, delta) in resolved.slot_deltas.iter().copied().filter(|(_, d)| *d != 0) {
            let points = self.points.clone();
            let result = execute_with_retry(
                "session points increment",
                || {
                    let points = points.clone();
                    async move { points.increment(session_id, slot, delta).await }
                },
                self.max_attempts,
                self.base_backoff_ms,
            )
            .await;

            match result {
                Ok(total) => debug!("Slot {} {:+} -> {}", slot, delta, total),
                Err(StoreError::MissingAssignment { .. }) => {
                    warn!("No participant assigned to slot {} in session {}", slot, session_id)
                }
                Err(e) => error!("Failed to persist {:+} for slot {}: {}", delta, slot, e),
            }
        }

        if resolved.records.is_empty() {
            return;
        }
        let shots = self.shots.clone();
        let records = &resolved.records;
        let result = execute_with_retry(
            "shot records",
            || {
                let shots = shots.clone();
                async move { shots.record_shots(records).await }
            },
            self.max_attempts,
            self.base_backoff_ms,
        )
        .await;
        if let Err(e) = result {
            warn!("Failed to record {} shot(s): {}", records.len(), e);
        }
    }
}
