use crate::domain::models::{OfflineSessionRecord, TimerPhase, TimerSettings, duration_for};
use crate::infrastructure::error::CoreError;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The durable subset of engine state. The pending queue rides along so
/// offline sessions survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub settings: TimerSettings,
    pub phase: TimerPhase,
    pub time_left_seconds: u32,
    pub completed_work_count: u32,
    pub pending: Vec<OfflineSessionRecord>,
}

impl PersistedSnapshot {
    /// Corrects stale restored data: clamps settings to their bounds and the
    /// remaining time down to the recomputed phase duration. Silent on purpose;
    /// a settings edit that shortened a duration is not an error.
    pub fn reconciled(mut self) -> Self {
        self.settings = self.settings.clamped();
        self.time_left_seconds = self
            .time_left_seconds
            .min(duration_for(self.phase, &self.settings));
        self
    }
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSnapshot>, CoreError>;
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    db_path: PathBuf,
}

impl SqliteSnapshotStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load(&self) -> Result<Option<PersistedSnapshot>, CoreError> {
        let connection = self.connect()?;
        let payload: Option<String> = connection
            .query_row("SELECT payload FROM engine_snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let snapshot: PersistedSnapshot = serde_json::from_str(&payload)?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), CoreError> {
        let payload = serde_json::to_string(snapshot)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO engine_snapshot (id, payload, saved_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
               payload = excluded.payload,
               saved_at = excluded.saved_at",
            params![payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: Mutex<Option<PersistedSnapshot>>,
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self) -> Result<Option<PersistedSnapshot>, CoreError> {
        let snapshot = self
            .snapshot
            .lock()
            .map_err(|error| CoreError::InvalidState(format!("snapshot lock poisoned: {error}")))?;
        Ok(snapshot.clone())
    }

    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), CoreError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|error| CoreError::InvalidState(format!("snapshot lock poisoned: {error}")))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::OfflineSessionRecord;
    use crate::infrastructure::storage::initialize_database;

    fn sample_snapshot() -> PersistedSnapshot {
        PersistedSnapshot {
            settings: TimerSettings::default(),
            phase: TimerPhase::ShortBreak,
            time_left_seconds: 120,
            completed_work_count: 3,
            pending: vec![OfflineSessionRecord::new(TimerPhase::Work, 25, Utc::now())],
        }
    }

    #[test]
    fn sqlite_store_round_trips_a_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("engine.db");
        initialize_database(&db_path).expect("init database");

        let store = SqliteSnapshotStore::new(&db_path);
        assert!(store.load().expect("load empty").is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).expect("save snapshot");
        let restored = store.load().expect("load").expect("snapshot exists");
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn sqlite_store_overwrites_the_single_row() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("engine.db");
        initialize_database(&db_path).expect("init database");

        let store = SqliteSnapshotStore::new(&db_path);
        let mut snapshot = sample_snapshot();
        store.save(&snapshot).expect("first save");
        snapshot.completed_work_count = 9;
        store.save(&snapshot).expect("second save");

        let restored = store.load().expect("load").expect("snapshot exists");
        assert_eq!(restored.completed_work_count, 9);
    }

    #[test]
    fn reconciled_clamps_remaining_time_to_phase_duration() {
        let snapshot = PersistedSnapshot {
            settings: TimerSettings::default(),
            phase: TimerPhase::Work,
            time_left_seconds: 10_000,
            completed_work_count: 0,
            pending: Vec::new(),
        }
        .reconciled();

        assert_eq!(snapshot.time_left_seconds, 1500);
    }

    #[test]
    fn reconciled_keeps_valid_remaining_time() {
        let snapshot = sample_snapshot().reconciled();
        assert_eq!(snapshot.time_left_seconds, 120);
    }

    #[test]
    fn reconciled_clamps_out_of_range_settings() {
        let mut snapshot = sample_snapshot();
        snapshot.settings.long_break_interval = 99;
        let reconciled = snapshot.reconciled();
        assert_eq!(reconciled.settings.long_break_interval, 10);
    }

    #[test]
    fn in_memory_store_round_trips() {
        let store = InMemorySnapshotStore::default();
        assert!(store.load().expect("load empty").is_none());
        let snapshot = sample_snapshot();
        store.save(&snapshot).expect("save");
        assert_eq!(store.load().expect("load").expect("exists"), snapshot);
    }
}
