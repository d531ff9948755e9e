use crate::application::auth::{AuthTracker, AuthTransition};
use crate::application::recorder::{RecordOutcome, SessionRecorder};
use crate::application::sync::{OfflineSyncService, SyncReport};
use crate::domain::models::{PendingQueue, TimerPhase, TimerSettings, TimerSettingsPatch, UserId};
use crate::domain::timer::{PhaseCompletion, TimerMachine};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::remote_store::RemoteStore;
use crate::infrastructure::snapshot_store::{PersistedSnapshot, SnapshotStore};
use log::{error, warn};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_AUTO_START_DELAY: Duration = Duration::from_secs(2);

/// Read-only view of the timer for the UI layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub is_running: bool,
    pub is_paused: bool,
    pub time_left_seconds: u32,
    pub phase: TimerPhase,
    pub completed_work_count: u32,
    pub settings: TimerSettings,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Hydrated,
    StateChanged(TimerSnapshot),
    PhaseCompleted {
        finished: TimerPhase,
        completed_work_count: u32,
    },
    RecordingFailed {
        message: String,
    },
    SyncFinished {
        synced: usize,
        failed: usize,
    },
}

/// Single owner of timer state, held by the application root and handed to
/// consumers by reference. All mutation funnels through here; collaborators
/// are constructor-injected trait objects so nothing reaches for globals.
pub struct TimerController<R, S, N>
where
    R: RemoteStore + 'static,
    S: SnapshotStore + 'static,
    N: Notifier + 'static,
{
    machine: Arc<Mutex<TimerMachine>>,
    queue: Arc<Mutex<PendingQueue>>,
    remote: Arc<R>,
    snapshots: Arc<S>,
    notifier: Arc<N>,
    recorder: Arc<SessionRecorder<R>>,
    sync: Arc<OfflineSyncService<R>>,
    auth: Arc<Mutex<AuthTracker>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    events: broadcast::Sender<EngineEvent>,
    hydration: Arc<watch::Sender<bool>>,
    /// Bumped on every manual operation; a scheduled auto-start only fires if
    /// the epoch it captured is still current.
    epoch: Arc<AtomicU64>,
    tick_interval: Duration,
    auto_start_delay: Duration,
}

impl<R, S, N> Clone for TimerController<R, S, N>
where
    R: RemoteStore + 'static,
    S: SnapshotStore + 'static,
    N: Notifier + 'static,
{
    fn clone(&self) -> Self {
        Self {
            machine: Arc::clone(&self.machine),
            queue: Arc::clone(&self.queue),
            remote: Arc::clone(&self.remote),
            snapshots: Arc::clone(&self.snapshots),
            notifier: Arc::clone(&self.notifier),
            recorder: Arc::clone(&self.recorder),
            sync: Arc::clone(&self.sync),
            auth: Arc::clone(&self.auth),
            ticker: Arc::clone(&self.ticker),
            events: self.events.clone(),
            hydration: Arc::clone(&self.hydration),
            epoch: Arc::clone(&self.epoch),
            tick_interval: self.tick_interval,
            auto_start_delay: self.auto_start_delay,
        }
    }
}

impl<R, S, N> TimerController<R, S, N>
where
    R: RemoteStore + 'static,
    S: SnapshotStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(remote: Arc<R>, snapshots: Arc<S>, notifier: Arc<N>) -> Self {
        let queue = Arc::new(Mutex::new(PendingQueue::new()));
        let recorder = Arc::new(SessionRecorder::new(Arc::clone(&remote), Arc::clone(&queue)));
        let sync = Arc::new(OfflineSyncService::new(
            Arc::clone(&remote),
            Arc::clone(&queue),
        ));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (hydration, _) = watch::channel(false);

        Self {
            machine: Arc::new(Mutex::new(TimerMachine::default())),
            queue,
            remote,
            snapshots,
            notifier,
            recorder,
            sync,
            auth: Arc::new(Mutex::new(AuthTracker::new())),
            ticker: Arc::new(Mutex::new(None)),
            events,
            hydration: Arc::new(hydration),
            epoch: Arc::new(AtomicU64::new(0)),
            tick_interval: Duration::from_secs(1),
            auto_start_delay: DEFAULT_AUTO_START_DELAY,
        }
    }

    pub fn with_auto_start_delay(mut self, delay: Duration) -> Self {
        self.auto_start_delay = delay;
        self
    }

    /// Restores persisted state and flips the hydration signal. Consumers
    /// must wait on `hydration_signal` before trusting the snapshot, or they
    /// see a flash of defaults.
    pub async fn hydrate(&self) {
        match self.snapshots.load() {
            Ok(Some(snapshot)) => {
                let snapshot = snapshot.reconciled();
                {
                    let mut machine = self.machine.lock().await;
                    *machine = TimerMachine::restore(
                        snapshot.settings,
                        snapshot.phase,
                        snapshot.time_left_seconds,
                        snapshot.completed_work_count,
                    );
                }
                {
                    let mut queue = self.queue.lock().await;
                    *queue = PendingQueue::from_records(snapshot.pending);
                }
            }
            Ok(None) => {}
            Err(err) => error!("snapshot load failed, starting from defaults: {err}"),
        }

        let _ = self.hydration.send(true);
        self.emit(EngineEvent::Hydrated);
        self.emit_state().await;
    }

    pub fn hydration_signal(&self) -> watch::Receiver<bool> {
        self.hydration.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let machine = self.machine.lock().await;
        snapshot_of(&machine)
    }

    pub async fn pending_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn start(&self) {
        self.bump_epoch();
        let started = {
            let mut machine = self.machine.lock().await;
            machine.start()
        };
        if started {
            self.arm_ticker().await;
            self.persist().await;
            self.emit_state().await;
        }
    }

    pub async fn pause(&self) {
        self.bump_epoch();
        let paused = {
            let mut machine = self.machine.lock().await;
            machine.pause()
        };
        if paused {
            self.disarm_ticker().await;
            self.persist().await;
            self.emit_state().await;
        }
    }

    pub async fn reset(&self) {
        self.bump_epoch();
        {
            let mut machine = self.machine.lock().await;
            machine.reset();
        }
        self.disarm_ticker().await;
        self.persist().await;
        self.emit_state().await;
    }

    pub async fn set_phase(&self, phase: TimerPhase) {
        self.bump_epoch();
        {
            let mut machine = self.machine.lock().await;
            machine.set_phase(phase);
        }
        self.disarm_ticker().await;
        self.persist().await;
        self.emit_state().await;
    }

    /// Merges a partial settings edit. A running countdown stays running; its
    /// remaining time jumps to the new full duration (see TimerMachine).
    pub async fn update_settings(&self, patch: TimerSettingsPatch) {
        self.bump_epoch();
        {
            let mut machine = self.machine.lock().await;
            machine.update_settings(&patch);
        }
        self.persist().await;
        self.emit_state().await;
    }

    pub async fn reset_settings(&self) {
        self.bump_epoch();
        {
            let mut machine = self.machine.lock().await;
            machine.reset_settings();
        }
        self.disarm_ticker().await;
        self.persist().await;
        self.emit_state().await;
    }

    /// Explicit push of the current settings to the remote store. This is the
    /// one save whose failure is surfaced directly to the caller; while
    /// anonymous it is a quiet local-only no-op.
    pub async fn save_settings(&self) -> Result<(), CoreError> {
        let user = {
            let auth = self.auth.lock().await;
            auth.current_user().cloned()
        };
        let Some(user) = user else {
            return Ok(());
        };
        let settings = {
            let machine = self.machine.lock().await;
            machine.settings.clone()
        };
        self.remote.upsert_settings(&user, &settings).await
    }

    /// Feeds the latest auth status. Only the anonymous-to-authenticated edge
    /// triggers work: remote settings are adopted and the pending queue is
    /// drained. Re-observing an unchanged level does nothing.
    pub async fn handle_auth_change(&self, user: Option<UserId>) -> Option<SyncReport> {
        let transition = {
            let mut auth = self.auth.lock().await;
            auth.observe(user)
        };

        match transition {
            Some(AuthTransition::SignedIn(user)) => {
                self.adopt_remote_settings(&user).await;
                let report = self.sync.sync_pending(&user).await;
                self.emit(EngineEvent::SyncFinished {
                    synced: report.synced,
                    failed: report.failed,
                });
                self.persist().await;
                Some(report)
            }
            Some(AuthTransition::SignedOut) | None => None,
        }
    }

    async fn adopt_remote_settings(&self, user: &UserId) {
        match self.remote.get_settings(user).await {
            Ok(Some(settings)) => {
                {
                    let mut machine = self.machine.lock().await;
                    machine.replace_settings(settings);
                }
                self.emit_state().await;
            }
            Ok(None) => {
                // First sign-in from this account: seed the backend with the
                // local settings so other devices pick them up.
                let settings = {
                    let machine = self.machine.lock().await;
                    machine.settings.clone()
                };
                if let Err(err) = self.remote.upsert_settings(user, &settings).await {
                    warn!("initial settings push failed: {err}");
                }
            }
            Err(err) => warn!("remote settings fetch failed: {err}"),
        }
    }

    /// One countdown step, driven by the ticker task. Returns whether the
    /// ticker should keep running. Never awaits network I/O; recording and
    /// persistence are dispatched as detached tasks.
    async fn on_tick(&self) -> bool {
        let (completion, still_running) = {
            let mut machine = self.machine.lock().await;
            let completion = machine.tick();
            (completion, machine.is_running)
        };

        self.persist().await;
        self.emit_state().await;

        if let Some(completion) = completion {
            self.handle_completion(completion).await;
            return false;
        }
        still_running
    }

    // Boxed rather than `async fn`: the completion path re-enters `arm_ticker`
    // through the deferred auto-start, and the resulting recursive opaque
    // future cannot be spawned without type-erasing this edge.
    fn handle_completion(
        &self,
        completion: PhaseCompletion,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let settings = {
                let machine = self.machine.lock().await;
                machine.settings.clone()
            };

            let title = format!("{} Completed!", completion.finished.display_name());
            let body = match completion.finished {
                TimerPhase::Work => format!(
                    "Great job! You've completed {} pomodoros.",
                    completion.completed_work_count
                ),
                TimerPhase::ShortBreak | TimerPhase::LongBreak => {
                    "Break time is over. Ready for the next pomodoro?".to_string()
                }
            };
            self.notifier.notify(&title, &body);
            self.notifier
                .play_sound(&settings.notification_sound, settings.sound_volume);

            self.emit(EngineEvent::PhaseCompleted {
                finished: completion.finished,
                completed_work_count: completion.completed_work_count,
            });

            let recording = self.clone();
            let finished = completion.finished;
            let duration_minutes = completion.duration_minutes;
            tokio::spawn(async move {
                let user = {
                    let auth = recording.auth.lock().await;
                    auth.current_user().cloned()
                };
                let outcome = recording
                    .recorder
                    .record_completion(user.as_ref(), finished, duration_minutes)
                    .await;
                if let RecordOutcome::RemoteFailed { message } = outcome {
                    recording.emit(EngineEvent::RecordingFailed { message });
                }
                // The pending queue may have grown; snapshot it.
                recording.persist().await;
            });

            if completion.auto_start {
                let scheduled_epoch = self.epoch.load(Ordering::SeqCst);
                let deferred = self.clone();
                tokio::spawn(async move {
                    time::sleep(deferred.auto_start_delay).await;
                    deferred.auto_start(scheduled_epoch).await;
                });
            }
        })
    }

    /// Fires the deferred auto-start unless a manual operation landed in the
    /// delay window.
    async fn auto_start(&self, scheduled_epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) != scheduled_epoch {
            return;
        }
        let started = {
            let mut machine = self.machine.lock().await;
            if machine.is_paused {
                false
            } else {
                machine.start()
            }
        };
        if started {
            self.arm_ticker().await;
            self.persist().await;
            self.emit_state().await;
        }
    }

    async fn arm_ticker(&self) {
        let mut guard = self.ticker.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(controller.tick_interval);
            // The first interval tick completes immediately; consume it so
            // the first decrement lands a full second after start.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !controller.on_tick().await {
                    break;
                }
            }
        });

        *guard = Some(handle);
    }

    async fn disarm_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    /// Serializes the durable subset and hands it to the snapshot store on a
    /// detached task; a failed save is logged, never surfaced.
    async fn persist(&self) {
        let snapshot = {
            let machine = self.machine.lock().await;
            let queue = self.queue.lock().await;
            PersistedSnapshot {
                settings: machine.settings.clone(),
                phase: machine.phase,
                time_left_seconds: machine.time_left_seconds,
                completed_work_count: machine.completed_work_count,
                pending: queue.records().to_vec(),
            }
        };

        let snapshots = Arc::clone(&self.snapshots);
        tokio::spawn(async move {
            if let Err(err) = snapshots.save(&snapshot) {
                error!("snapshot save failed: {err}");
            }
        });
    }

    async fn emit_state(&self) {
        let snapshot = self.snapshot().await;
        self.emit(EngineEvent::StateChanged(snapshot));
    }

    fn emit(&self, event: EngineEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

fn snapshot_of(machine: &TimerMachine) -> TimerSnapshot {
    TimerSnapshot {
        is_running: machine.is_running,
        is_paused: machine.is_paused,
        time_left_seconds: machine.time_left_seconds,
        phase: machine.phase,
        completed_work_count: machine.completed_work_count,
        settings: machine.settings.clone(),
    }
}
