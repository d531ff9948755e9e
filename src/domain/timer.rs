use crate::domain::models::{TimerPhase, TimerSettings, TimerSettingsPatch, duration_for};
use serde::{Deserialize, Serialize};

/// Emitted by `tick` when a phase reaches zero. The machine itself performs no
/// side effects; the controller consumes this event to notify, record the
/// session, and schedule an auto-start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCompletion {
    pub finished: TimerPhase,
    pub next: TimerPhase,
    pub duration_minutes: u32,
    pub completed_work_count: u32,
    pub auto_start: bool,
}

/// The timer state machine. States are {idle, running, paused} crossed with the
/// phase dimension; all transitions are synchronous and total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerMachine {
    pub is_running: bool,
    pub is_paused: bool,
    pub time_left_seconds: u32,
    pub phase: TimerPhase,
    pub completed_work_count: u32,
    pub settings: TimerSettings,
}

impl Default for TimerMachine {
    fn default() -> Self {
        Self::new(TimerSettings::default())
    }
}

impl TimerMachine {
    pub fn new(settings: TimerSettings) -> Self {
        let settings = settings.clamped();
        Self {
            is_running: false,
            is_paused: false,
            time_left_seconds: duration_for(TimerPhase::Work, &settings),
            phase: TimerPhase::Work,
            completed_work_count: 0,
            settings,
        }
    }

    pub fn restore(
        settings: TimerSettings,
        phase: TimerPhase,
        time_left_seconds: u32,
        completed_work_count: u32,
    ) -> Self {
        let settings = settings.clamped();
        // A settings edit may have shortened the duration below what an older
        // snapshot stored; clamp silently rather than report.
        let time_left_seconds = time_left_seconds.min(duration_for(phase, &settings));
        Self {
            is_running: false,
            is_paused: false,
            time_left_seconds,
            phase,
            completed_work_count,
            settings,
        }
    }

    /// Resumes from idle or paused. No-op while already running; never resets
    /// the remaining time.
    pub fn start(&mut self) -> bool {
        if self.is_running {
            return false;
        }
        self.is_running = true;
        self.is_paused = false;
        true
    }

    pub fn pause(&mut self) -> bool {
        if !self.is_running {
            return false;
        }
        self.is_running = false;
        self.is_paused = true;
        true
    }

    /// Restores the full duration of the current phase without touching the
    /// phase or the completed count.
    pub fn reset(&mut self) {
        self.is_running = false;
        self.is_paused = false;
        self.time_left_seconds = duration_for(self.phase, &self.settings);
    }

    /// Advances the countdown by one second. Returns the completion event when
    /// this tick drains the phase to zero; the phase-advance rule has already
    /// been applied by the time the event is returned.
    pub fn tick(&mut self) -> Option<PhaseCompletion> {
        if !self.is_running || self.time_left_seconds == 0 {
            return None;
        }

        self.time_left_seconds -= 1;
        if self.time_left_seconds > 0 {
            return None;
        }

        self.is_running = false;
        self.is_paused = false;

        let finished = self.phase;
        let duration_minutes = self.settings.minutes_for(finished);

        let (next, auto_start) = match finished {
            TimerPhase::Work => {
                self.completed_work_count += 1;
                // Cadence is evaluated on the new cumulative count, so
                // interval 4 takes the long break after the 4th, 8th, ...
                let next = if self.completed_work_count % self.settings.long_break_interval == 0 {
                    TimerPhase::LongBreak
                } else {
                    TimerPhase::ShortBreak
                };
                (next, self.settings.auto_start_breaks)
            }
            TimerPhase::ShortBreak | TimerPhase::LongBreak => {
                (TimerPhase::Work, self.settings.auto_start_pomodoros)
            }
        };

        self.phase = next;
        self.time_left_seconds = duration_for(next, &self.settings);

        Some(PhaseCompletion {
            finished,
            next,
            duration_minutes,
            completed_work_count: self.completed_work_count,
            auto_start,
        })
    }

    /// Manual phase override; stops the timer and loads the new phase's full
    /// duration. Does not affect the completed count.
    pub fn set_phase(&mut self, phase: TimerPhase) {
        self.phase = phase;
        self.time_left_seconds = duration_for(phase, &self.settings);
        self.is_running = false;
        self.is_paused = false;
    }

    /// Merges a partial settings update and immediately rescales the remaining
    /// time to the new full duration of the current phase. This also applies
    /// while running, so a live countdown jumps to the edited duration.
    pub fn update_settings(&mut self, patch: &TimerSettingsPatch) {
        self.settings = self.settings.apply(patch);
        self.time_left_seconds = duration_for(self.phase, &self.settings);
    }

    /// Applies already-validated settings wholesale (remote settings pull).
    /// Same rescale rule as `update_settings`.
    pub fn replace_settings(&mut self, settings: TimerSettings) {
        self.settings = settings.clamped();
        self.time_left_seconds = duration_for(self.phase, &self.settings);
    }

    pub fn reset_settings(&mut self) {
        self.settings = TimerSettings::default();
        self.phase = TimerPhase::Work;
        self.completed_work_count = 0;
        self.is_running = false;
        self.is_paused = false;
        self.time_left_seconds = duration_for(TimerPhase::Work, &self.settings);
    }
}
