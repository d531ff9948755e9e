use crate::domain::models::{
    DailyAggregate, OfflineSessionRecord, PendingQueue, TimerPhase, UserId,
};
use crate::infrastructure::remote_store::RemoteStore;
use chrono::{DateTime, Local, Utc};
use log::{error, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Accepted by the remote store.
    Stored,
    /// Appended to the pending queue; will be drained on the next sync edge.
    Queued,
    /// Remote call failed while authenticated. The fact is dropped, not
    /// queued; the caller surfaces a one-shot warning.
    RemoteFailed { message: String },
}

/// Records completed-phase facts. Fire-and-forget from the timer's point of
/// view: callers spawn `record_completion` and never await it on the tick
/// path.
pub struct SessionRecorder<R: RemoteStore> {
    remote: Arc<R>,
    queue: Arc<Mutex<PendingQueue>>,
    now_provider: NowProvider,
}

impl<R: RemoteStore> SessionRecorder<R> {
    pub fn new(remote: Arc<R>, queue: Arc<Mutex<PendingQueue>>) -> Self {
        Self {
            remote,
            queue,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Records one completed phase. Duration is the configured minutes for the
    /// phase, not elapsed wall clock. Never raises: every failure path decays
    /// to an outcome plus a log entry.
    pub async fn record_completion(
        &self,
        user: Option<&UserId>,
        phase: TimerPhase,
        duration_minutes: u32,
    ) -> RecordOutcome {
        let completed_at = (self.now_provider)();

        let Some(user) = user else {
            let mut queue = self.queue.lock().await;
            queue.push(OfflineSessionRecord::new(phase, duration_minutes, completed_at));
            return RecordOutcome::Queued;
        };

        if let Err(err) = self
            .remote
            .insert_session(user, phase, duration_minutes, completed_at)
            .await
        {
            let message = err.to_string();
            warn!("session insert failed for {}: {message}", phase.as_str());
            return RecordOutcome::RemoteFailed { message };
        }

        if phase == TimerPhase::Work {
            self.bump_daily_aggregate(user, duration_minutes, completed_at)
                .await;
        }

        RecordOutcome::Stored
    }

    /// Read-modify-write on the per-day totals, keyed by the local calendar
    /// date. Additive only; an existing row is never replaced wholesale.
    async fn bump_daily_aggregate(
        &self,
        user: &UserId,
        duration_minutes: u32,
        completed_at: DateTime<Utc>,
    ) {
        let date = completed_at.with_timezone(&Local).date_naive();

        let mut aggregate = match self.remote.get_daily_aggregate(user, date).await {
            Ok(Some(existing)) => existing,
            Ok(None) => DailyAggregate::empty(date),
            Err(err) => {
                error!("daily aggregate fetch failed: {err}");
                return;
            }
        };

        aggregate.add_work_completion(duration_minutes);
        if let Err(err) = self.remote.upsert_daily_aggregate(user, &aggregate).await {
            error!("daily aggregate upsert failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::remote_store::InMemoryRemoteStore;
    use chrono::TimeZone;

    fn user() -> UserId {
        UserId::new("user-1")
    }

    fn recorder_with(
        remote: Arc<InMemoryRemoteStore>,
    ) -> (SessionRecorder<InMemoryRemoteStore>, Arc<Mutex<PendingQueue>>) {
        let queue = Arc::new(Mutex::new(PendingQueue::new()));
        let fixed_now = Utc
            .with_ymd_and_hms(2026, 2, 16, 10, 0, 0)
            .single()
            .expect("valid datetime");
        let recorder = SessionRecorder::new(remote, Arc::clone(&queue))
            .with_now_provider(Arc::new(move || fixed_now));
        (recorder, queue)
    }

    #[tokio::test]
    async fn unauthenticated_completion_appends_exactly_one_record() {
        let remote = Arc::new(InMemoryRemoteStore::default());
        let (recorder, queue) = recorder_with(Arc::clone(&remote));

        let outcome = recorder
            .record_completion(None, TimerPhase::Work, 25)
            .await;
        assert_eq!(outcome, RecordOutcome::Queued);

        let queue = queue.lock().await;
        assert_eq!(queue.len(), 1);
        let record = &queue.records()[0];
        assert_eq!(record.phase, TimerPhase::Work);
        assert_eq!(record.duration_minutes, 25);
        assert!(remote.sessions().is_empty());
    }

    #[tokio::test]
    async fn queue_only_grows_while_unauthenticated() {
        let remote = Arc::new(InMemoryRemoteStore::default());
        let (recorder, queue) = recorder_with(remote);

        for _ in 0..3 {
            recorder
                .record_completion(None, TimerPhase::Work, 25)
                .await;
        }
        recorder
            .record_completion(None, TimerPhase::ShortBreak, 5)
            .await;

        assert_eq!(queue.lock().await.len(), 4);
    }

    #[tokio::test]
    async fn authenticated_work_completion_stores_session_and_aggregate() {
        let remote = Arc::new(InMemoryRemoteStore::default());
        let (recorder, queue) = recorder_with(Arc::clone(&remote));

        let outcome = recorder
            .record_completion(Some(&user()), TimerPhase::Work, 25)
            .await;
        assert_eq!(outcome, RecordOutcome::Stored);
        assert!(queue.lock().await.is_empty());

        let sessions = remote.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, 25);

        let date = Utc
            .with_ymd_and_hms(2026, 2, 16, 10, 0, 0)
            .single()
            .expect("valid datetime")
            .with_timezone(&Local)
            .date_naive();
        let aggregate = remote
            .aggregate_for(&user(), date)
            .expect("aggregate exists");
        assert_eq!(aggregate.completed_work_count, 1);
        assert_eq!(aggregate.total_focus_minutes, 25);
    }

    #[tokio::test]
    async fn daily_aggregate_accumulates_across_completions() {
        let remote = Arc::new(InMemoryRemoteStore::default());
        let (recorder, _queue) = recorder_with(Arc::clone(&remote));

        recorder
            .record_completion(Some(&user()), TimerPhase::Work, 25)
            .await;
        recorder
            .record_completion(Some(&user()), TimerPhase::Work, 25)
            .await;

        let date = Utc
            .with_ymd_and_hms(2026, 2, 16, 10, 0, 0)
            .single()
            .expect("valid datetime")
            .with_timezone(&Local)
            .date_naive();
        let aggregate = remote
            .aggregate_for(&user(), date)
            .expect("aggregate exists");
        assert_eq!(aggregate.completed_work_count, 2);
        assert_eq!(aggregate.total_focus_minutes, 50);
    }

    #[tokio::test]
    async fn authenticated_failure_is_reported_and_not_queued() {
        struct RejectingRemoteStore;

        #[async_trait::async_trait]
        impl RemoteStore for RejectingRemoteStore {
            async fn current_user(
                &self,
            ) -> Result<Option<UserId>, crate::infrastructure::error::CoreError> {
                Ok(None)
            }

            async fn insert_session(
                &self,
                _user: &UserId,
                _phase: TimerPhase,
                _duration_minutes: u32,
                _completed_at: DateTime<Utc>,
            ) -> Result<(), crate::infrastructure::error::CoreError> {
                Err(crate::infrastructure::error::CoreError::Remote(
                    "insert rejected".to_string(),
                ))
            }

            async fn get_daily_aggregate(
                &self,
                _user: &UserId,
                _date: chrono::NaiveDate,
            ) -> Result<Option<DailyAggregate>, crate::infrastructure::error::CoreError> {
                Ok(None)
            }

            async fn upsert_daily_aggregate(
                &self,
                _user: &UserId,
                _aggregate: &DailyAggregate,
            ) -> Result<(), crate::infrastructure::error::CoreError> {
                Ok(())
            }

            async fn get_settings(
                &self,
                _user: &UserId,
            ) -> Result<Option<crate::domain::models::TimerSettings>, crate::infrastructure::error::CoreError>
            {
                Ok(None)
            }

            async fn upsert_settings(
                &self,
                _user: &UserId,
                _settings: &crate::domain::models::TimerSettings,
            ) -> Result<(), crate::infrastructure::error::CoreError> {
                Ok(())
            }
        }

        let queue = Arc::new(Mutex::new(PendingQueue::new()));
        let recorder = SessionRecorder::new(Arc::new(RejectingRemoteStore), Arc::clone(&queue));

        let outcome = recorder
            .record_completion(Some(&user()), TimerPhase::Work, 25)
            .await;
        assert!(matches!(outcome, RecordOutcome::RemoteFailed { .. }));
        // Accepted loss while online: the fact is not queued for retry.
        assert!(queue.lock().await.is_empty());
    }

    #[tokio::test]
    async fn break_completions_do_not_touch_the_aggregate() {
        let remote = Arc::new(InMemoryRemoteStore::default());
        let (recorder, _queue) = recorder_with(Arc::clone(&remote));

        recorder
            .record_completion(Some(&user()), TimerPhase::ShortBreak, 5)
            .await;

        assert_eq!(remote.sessions().len(), 1);
        let date = Utc
            .with_ymd_and_hms(2026, 2, 16, 10, 0, 0)
            .single()
            .expect("valid datetime")
            .with_timezone(&Local)
            .date_naive();
        assert!(remote.aggregate_for(&user(), date).is_none());
    }
}
