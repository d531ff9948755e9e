pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::auth::{AuthState, AuthTracker, AuthTransition};
pub use application::controller::{EngineEvent, TimerController, TimerSnapshot};
pub use application::recorder::{RecordOutcome, SessionRecorder};
pub use application::sync::{OfflineSyncService, SyncReport};
pub use domain::models::{
    DailyAggregate, OfflineSessionRecord, PendingQueue, TimerPhase, TimerSettings,
    TimerSettingsPatch, UserId, duration_for,
};
pub use domain::timer::{PhaseCompletion, TimerMachine};
pub use infrastructure::config::{AppConfig, ensure_default_config, load_config};
pub use infrastructure::error::CoreError;
pub use infrastructure::notifier::{LogNotifier, Notifier};
pub use infrastructure::remote_store::{InMemoryRemoteStore, RemoteStore, ReqwestRemoteStore};
pub use infrastructure::snapshot_store::{
    InMemorySnapshotStore, PersistedSnapshot, SnapshotStore, SqliteSnapshotStore,
};
pub use infrastructure::storage::initialize_database;
