use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub const MIN_POMODORO_MINUTES: u32 = 1;
pub const MAX_POMODORO_MINUTES: u32 = 60;
pub const MIN_SHORT_BREAK_MINUTES: u32 = 1;
pub const MAX_SHORT_BREAK_MINUTES: u32 = 30;
pub const MIN_LONG_BREAK_MINUTES: u32 = 1;
pub const MAX_LONG_BREAK_MINUTES: u32 = 60;
pub const MIN_LONG_BREAK_INTERVAL: u32 = 2;
pub const MAX_LONG_BREAK_INTERVAL: u32 = 10;
pub const MAX_SOUND_VOLUME: u8 = 100;

pub const DEFAULT_NOTIFICATION_SOUND: &str = "boxing_bell";

/// Sound ids shipped with the app; anything else falls back to the default.
pub const KNOWN_NOTIFICATION_SOUNDS: &[&str] = &["boxing_bell", "bell", "chime", "digital"];

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Work,
    ShortBreak,
    LongBreak,
}

impl TimerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Work => "Pomodoro",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }
}

impl Default for TimerPhase {
    fn default() -> Self {
        TimerPhase::Work
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub pomodoro_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
    pub long_break_interval: u32,
    pub notification_sound: String,
    pub sound_volume: u8,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            pomodoro_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            long_break_interval: 4,
            notification_sound: DEFAULT_NOTIFICATION_SOUND.to_string(),
            sound_volume: 70,
        }
    }
}

impl TimerSettings {
    /// Out-of-range values are clamped to the nearest bound rather than
    /// rejected, so settings can never end up unusable.
    pub fn clamped(mut self) -> Self {
        self.pomodoro_minutes = self
            .pomodoro_minutes
            .clamp(MIN_POMODORO_MINUTES, MAX_POMODORO_MINUTES);
        self.short_break_minutes = self
            .short_break_minutes
            .clamp(MIN_SHORT_BREAK_MINUTES, MAX_SHORT_BREAK_MINUTES);
        self.long_break_minutes = self
            .long_break_minutes
            .clamp(MIN_LONG_BREAK_MINUTES, MAX_LONG_BREAK_MINUTES);
        self.long_break_interval = self
            .long_break_interval
            .clamp(MIN_LONG_BREAK_INTERVAL, MAX_LONG_BREAK_INTERVAL);
        self.sound_volume = self.sound_volume.min(MAX_SOUND_VOLUME);
        if !KNOWN_NOTIFICATION_SOUNDS
            .iter()
            .any(|known| *known == self.notification_sound)
        {
            self.notification_sound = DEFAULT_NOTIFICATION_SOUND.to_string();
        }
        self
    }

    pub fn minutes_for(&self, phase: TimerPhase) -> u32 {
        match phase {
            TimerPhase::Work => self.pomodoro_minutes,
            TimerPhase::ShortBreak => self.short_break_minutes,
            TimerPhase::LongBreak => self.long_break_minutes,
        }
    }

    pub fn apply(&self, patch: &TimerSettingsPatch) -> Self {
        let mut merged = self.clone();
        if let Some(value) = patch.pomodoro_minutes {
            merged.pomodoro_minutes = value;
        }
        if let Some(value) = patch.short_break_minutes {
            merged.short_break_minutes = value;
        }
        if let Some(value) = patch.long_break_minutes {
            merged.long_break_minutes = value;
        }
        if let Some(value) = patch.auto_start_breaks {
            merged.auto_start_breaks = value;
        }
        if let Some(value) = patch.auto_start_pomodoros {
            merged.auto_start_pomodoros = value;
        }
        if let Some(value) = patch.long_break_interval {
            merged.long_break_interval = value;
        }
        if let Some(value) = patch.notification_sound.as_deref() {
            merged.notification_sound = value.to_string();
        }
        if let Some(value) = patch.sound_volume {
            merged.sound_volume = value;
        }
        merged.clamped()
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettingsPatch {
    pub pomodoro_minutes: Option<u32>,
    pub short_break_minutes: Option<u32>,
    pub long_break_minutes: Option<u32>,
    pub auto_start_breaks: Option<bool>,
    pub auto_start_pomodoros: Option<bool>,
    pub long_break_interval: Option<u32>,
    pub notification_sound: Option<String>,
    pub sound_volume: Option<u8>,
}

/// Maps a phase and the configured durations to the seconds the phase starts
/// with. Pure; callers must re-invoke it after any settings change instead of
/// caching the result.
pub fn duration_for(phase: TimerPhase, settings: &TimerSettings) -> u32 {
    settings.minutes_for(phase) * 60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct UserId(pub String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A completed-phase fact recorded while no authenticated identity was
/// available. Lives in the pending queue until the remote store accepts it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSessionRecord {
    pub local_id: String,
    pub phase: TimerPhase,
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
}

impl OfflineSessionRecord {
    pub fn new(phase: TimerPhase, duration_minutes: u32, completed_at: DateTime<Utc>) -> Self {
        Self {
            local_id: next_id("offline"),
            phase,
            duration_minutes,
            completed_at,
        }
    }
}

/// Exclusive owner of offline session records. Draining snapshots and clears
/// in one step so a concurrent enqueue or a double sync cannot double-submit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingQueue {
    records: Vec<OfflineSessionRecord>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<OfflineSessionRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: OfflineSessionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn drain_all(&mut self) -> Vec<OfflineSessionRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn re_queue(&mut self, record: OfflineSessionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[OfflineSessionRecord] {
        &self.records
    }
}

/// Per-calendar-day running totals, owned by the remote store and updated
/// additively; never overwritten wholesale once created for a date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub completed_work_count: u32,
    pub total_focus_minutes: u32,
}

impl DailyAggregate {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            completed_work_count: 0,
            total_focus_minutes: 0,
        }
    }

    pub fn add_work_completion(&mut self, duration_minutes: u32) {
        self.completed_work_count += 1;
        self.total_focus_minutes += duration_minutes;
    }
}
