use crate::domain::models::{PendingQueue, UserId};
use crate::infrastructure::remote_store::RemoteStore;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Aggregate result of one drain pass, for user-facing feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn attempted(&self) -> usize {
        self.synced + self.failed
    }
}

/// Drains locally recorded sessions into the remote store after a sign-in
/// edge. Never raises: every remote failure decays to a retained pending item.
pub struct OfflineSyncService<R: RemoteStore> {
    remote: Arc<R>,
    queue: Arc<Mutex<PendingQueue>>,
}

impl<R: RemoteStore> OfflineSyncService<R> {
    pub fn new(remote: Arc<R>, queue: Arc<Mutex<PendingQueue>>) -> Self {
        Self { remote, queue }
    }

    /// Snapshots and eagerly clears the queue, then submits each item
    /// sequentially. A per-item failure re-appends that item to the (possibly
    /// already refilled) queue instead of aborting the batch, so one bad
    /// record cannot block the rest.
    pub async fn sync_pending(&self, user: &UserId) -> SyncReport {
        let batch = {
            let mut queue = self.queue.lock().await;
            queue.drain_all()
        };

        if batch.is_empty() {
            return SyncReport::default();
        }

        info!("syncing {} pending offline sessions", batch.len());
        let mut report = SyncReport::default();

        for record in batch {
            match self
                .remote
                .insert_session(user, record.phase, record.duration_minutes, record.completed_at)
                .await
            {
                Ok(()) => report.synced += 1,
                Err(err) => {
                    warn!(
                        "offline session {} failed to sync, re-queueing: {err}",
                        record.local_id
                    );
                    report.failed += 1;
                    let mut queue = self.queue.lock().await;
                    queue.re_queue(record);
                }
            }
        }

        info!(
            "offline sync finished: {} synced, {} re-queued",
            report.synced, report.failed
        );
        report
    }
}
