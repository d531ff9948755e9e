use crate::domain::models::{DailyAggregate, TimerPhase, TimerSettings, UserId};
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

/// Backend-as-a-service boundary. Upserts are keyed by user (settings) or
/// user+date (daily aggregate), so retries cannot duplicate data.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn current_user(&self) -> Result<Option<UserId>, CoreError>;

    async fn insert_session(
        &self,
        user: &UserId,
        phase: TimerPhase,
        duration_minutes: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    async fn get_daily_aggregate(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DailyAggregate>, CoreError>;

    async fn upsert_daily_aggregate(
        &self,
        user: &UserId,
        aggregate: &DailyAggregate,
    ) -> Result<(), CoreError>;

    async fn get_settings(&self, user: &UserId) -> Result<Option<TimerSettings>, CoreError>;

    async fn upsert_settings(&self, user: &UserId, settings: &TimerSettings)
    -> Result<(), CoreError>;
}

const SESSIONS_TABLE: &str = "timer_sessions";
const DAILY_STATS_TABLE: &str = "daily_stats";
const SETTINGS_TABLE: &str = "user_settings";

/// PostgREST-backed implementation. The access token is the signed-in user's
/// bearer token; the anon key identifies the project.
#[derive(Debug, Clone)]
pub struct ReqwestRemoteStore {
    client: Client,
    base_url: Url,
    anon_key: String,
    access_token: Option<String>,
}

impl ReqwestRemoteStore {
    pub fn new(base_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            anon_key: anon_key.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    fn rest_endpoint(&self, table: &str) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CoreError::Remote("base URL cannot be a base".to_string()))?;
            segments.push("rest");
            segments.push("v1");
            segments.push(table);
        }
        Ok(url)
    }

    fn auth_endpoint(&self) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CoreError::Remote("base URL cannot be a base".to_string()))?;
            segments.push("auth");
            segments.push("v1");
            segments.push("user");
        }
        Ok(url)
    }

    fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    fn http_error(context: &str, status: reqwest::StatusCode, body: &str) -> CoreError {
        let message = if body.trim().is_empty() {
            format!("{context}: http {}", status.as_u16())
        } else {
            format!("{context}: http {}; body={body}", status.as_u16())
        };
        CoreError::Remote(message)
    }

    async fn read_body(response: reqwest::Response, context: &str) -> Result<(reqwest::StatusCode, String), CoreError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Remote(format!("failed reading {context} response: {error}")))?;
        Ok((status, body))
    }
}

#[derive(Debug, serde::Deserialize)]
struct AuthUserResponse {
    id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct SessionRow<'a> {
    user_id: &'a str,
    mode: &'a str,
    duration: u32,
    completed_at: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DailyStatsRow {
    user_id: String,
    date: NaiveDate,
    completed_pomodoros: u32,
    total_focus_time: u32,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SettingsRow {
    user_id: String,
    pomodoro_duration: u32,
    short_break_duration: u32,
    long_break_duration: u32,
    auto_start_breaks: bool,
    auto_start_pomodoros: bool,
    long_break_interval: u32,
    notification_sound: String,
    sound_volume: u8,
}

impl SettingsRow {
    fn from_settings(user: &UserId, settings: &TimerSettings) -> Self {
        Self {
            user_id: user.as_str().to_string(),
            pomodoro_duration: settings.pomodoro_minutes,
            short_break_duration: settings.short_break_minutes,
            long_break_duration: settings.long_break_minutes,
            auto_start_breaks: settings.auto_start_breaks,
            auto_start_pomodoros: settings.auto_start_pomodoros,
            long_break_interval: settings.long_break_interval,
            notification_sound: settings.notification_sound.clone(),
            sound_volume: settings.sound_volume,
        }
    }

    fn into_settings(self) -> TimerSettings {
        TimerSettings {
            pomodoro_minutes: self.pomodoro_duration,
            short_break_minutes: self.short_break_duration,
            long_break_minutes: self.long_break_duration,
            auto_start_breaks: self.auto_start_breaks,
            auto_start_pomodoros: self.auto_start_pomodoros,
            long_break_interval: self.long_break_interval,
            notification_sound: self.notification_sound,
            sound_volume: self.sound_volume,
        }
        .clamped()
    }
}

#[async_trait]
impl RemoteStore for ReqwestRemoteStore {
    async fn current_user(&self) -> Result<Option<UserId>, CoreError> {
        let Some(access_token) = self.access_token.as_deref() else {
            return Ok(None);
        };

        let endpoint = self.auth_endpoint()?;
        let response = self
            .client
            .get(endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| CoreError::Remote(format!("network error while fetching user: {error}")))?;

        let (status, body) = Self::read_body(response, "auth user").await?;
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::http_error("auth user request failed", status, &body));
        }

        let parsed: AuthUserResponse = serde_json::from_str(&body)
            .map_err(|error| CoreError::Remote(format!("invalid auth user payload: {error}; body={body}")))?;
        Ok(parsed
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(UserId::new))
    }

    async fn insert_session(
        &self,
        user: &UserId,
        phase: TimerPhase,
        duration_minutes: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let endpoint = self.rest_endpoint(SESSIONS_TABLE)?;
        let row = SessionRow {
            user_id: user.as_str(),
            mode: phase.as_str(),
            duration: duration_minutes,
            completed_at: completed_at.to_rfc3339(),
        };

        let response = self
            .client
            .post(endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
            .json(&row)
            .send()
            .await
            .map_err(|error| CoreError::Remote(format!("network error while inserting session: {error}")))?;

        let (status, body) = Self::read_body(response, "session insert").await?;
        if !status.is_success() {
            return Err(Self::http_error("session insert failed", status, &body));
        }
        Ok(())
    }

    async fn get_daily_aggregate(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DailyAggregate>, CoreError> {
        let mut endpoint = self.rest_endpoint(DAILY_STATS_TABLE)?;
        endpoint
            .query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", user.as_str()))
            .append_pair("date", &format!("eq.{date}"))
            .append_pair("select", "*");

        let response = self
            .client
            .get(endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|error| CoreError::Remote(format!("network error while fetching daily stats: {error}")))?;

        let (status, body) = Self::read_body(response, "daily stats").await?;
        if !status.is_success() {
            return Err(Self::http_error("daily stats fetch failed", status, &body));
        }

        let rows: Vec<DailyStatsRow> = serde_json::from_str(&body)
            .map_err(|error| CoreError::Remote(format!("invalid daily stats payload: {error}; body={body}")))?;
        Ok(rows.into_iter().next().map(|row| DailyAggregate {
            date: row.date,
            completed_work_count: row.completed_pomodoros,
            total_focus_minutes: row.total_focus_time,
        }))
    }

    async fn upsert_daily_aggregate(
        &self,
        user: &UserId,
        aggregate: &DailyAggregate,
    ) -> Result<(), CoreError> {
        let mut endpoint = self.rest_endpoint(DAILY_STATS_TABLE)?;
        endpoint
            .query_pairs_mut()
            .append_pair("on_conflict", "user_id,date");

        let row = DailyStatsRow {
            user_id: user.as_str().to_string(),
            date: aggregate.date,
            completed_pomodoros: aggregate.completed_work_count,
            total_focus_time: aggregate.total_focus_minutes,
        };

        let response = self
            .client
            .post(endpoint)
            .header("apikey", &self.anon_key)
            .header("Prefer", "resolution=merge-duplicates")
            .bearer_auth(self.bearer())
            .json(&row)
            .send()
            .await
            .map_err(|error| CoreError::Remote(format!("network error while upserting daily stats: {error}")))?;

        let (status, body) = Self::read_body(response, "daily stats upsert").await?;
        if !status.is_success() {
            return Err(Self::http_error("daily stats upsert failed", status, &body));
        }
        Ok(())
    }

    async fn get_settings(&self, user: &UserId) -> Result<Option<TimerSettings>, CoreError> {
        let mut endpoint = self.rest_endpoint(SETTINGS_TABLE)?;
        endpoint
            .query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", user.as_str()))
            .append_pair("select", "*");

        let response = self
            .client
            .get(endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
            .send()
            .await
            .map_err(|error| CoreError::Remote(format!("network error while fetching settings: {error}")))?;

        let (status, body) = Self::read_body(response, "settings").await?;
        if !status.is_success() {
            return Err(Self::http_error("settings fetch failed", status, &body));
        }

        let rows: Vec<SettingsRow> = serde_json::from_str(&body)
            .map_err(|error| CoreError::Remote(format!("invalid settings payload: {error}; body={body}")))?;
        Ok(rows.into_iter().next().map(SettingsRow::into_settings))
    }

    async fn upsert_settings(
        &self,
        user: &UserId,
        settings: &TimerSettings,
    ) -> Result<(), CoreError> {
        let mut endpoint = self.rest_endpoint(SETTINGS_TABLE)?;
        endpoint.query_pairs_mut().append_pair("on_conflict", "user_id");

        let row = SettingsRow::from_settings(user, settings);
        let response = self
            .client
            .post(endpoint)
            .header("apikey", &self.anon_key)
            .header("Prefer", "resolution=merge-duplicates")
            .bearer_auth(self.bearer())
            .json(&row)
            .send()
            .await
            .map_err(|error| CoreError::Remote(format!("network error while upserting settings: {error}")))?;

        let (status, body) = Self::read_body(response, "settings upsert").await?;
        if !status.is_success() {
            return Err(Self::http_error("settings upsert failed", status, &body));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub user_id: String,
    pub phase: TimerPhase,
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    sessions: Vec<StoredSession>,
    aggregates: HashMap<(String, NaiveDate), DailyAggregate>,
    settings: HashMap<String, TimerSettings>,
    user: Option<UserId>,
}

/// In-memory remote store for local use and tests.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryRemoteStore {
    pub fn with_user(user: UserId) -> Self {
        let store = Self::default();
        store
            .state
            .lock()
            .expect("in-memory remote store lock")
            .user = Some(user);
        store
    }

    pub fn sessions(&self) -> Vec<StoredSession> {
        self.state
            .lock()
            .expect("in-memory remote store lock")
            .sessions
            .clone()
    }

    pub fn aggregate_for(&self, user: &UserId, date: NaiveDate) -> Option<DailyAggregate> {
        self.state
            .lock()
            .expect("in-memory remote store lock")
            .aggregates
            .get(&(user.as_str().to_string(), date))
            .cloned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, CoreError> {
        self.state
            .lock()
            .map_err(|error| CoreError::InvalidState(format!("remote store lock poisoned: {error}")))
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn current_user(&self) -> Result<Option<UserId>, CoreError> {
        Ok(self.lock()?.user.clone())
    }

    async fn insert_session(
        &self,
        user: &UserId,
        phase: TimerPhase,
        duration_minutes: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.lock()?.sessions.push(StoredSession {
            user_id: user.as_str().to_string(),
            phase,
            duration_minutes,
            completed_at,
        });
        Ok(())
    }

    async fn get_daily_aggregate(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DailyAggregate>, CoreError> {
        Ok(self
            .lock()?
            .aggregates
            .get(&(user.as_str().to_string(), date))
            .cloned())
    }

    async fn upsert_daily_aggregate(
        &self,
        user: &UserId,
        aggregate: &DailyAggregate,
    ) -> Result<(), CoreError> {
        self.lock()?
            .aggregates
            .insert((user.as_str().to_string(), aggregate.date), aggregate.clone());
        Ok(())
    }

    async fn get_settings(&self, user: &UserId) -> Result<Option<TimerSettings>, CoreError> {
        Ok(self.lock()?.settings.get(user.as_str()).cloned())
    }

    async fn upsert_settings(
        &self,
        user: &UserId,
        settings: &TimerSettings,
    ) -> Result<(), CoreError> {
        self.lock()?
            .settings
            .insert(user.as_str().to_string(), settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1")
    }

    #[tokio::test]
    async fn in_memory_store_keeps_sessions_in_insert_order() {
        let store = InMemoryRemoteStore::default();
        store
            .insert_session(&user(), TimerPhase::Work, 25, Utc::now())
            .await
            .expect("insert work");
        store
            .insert_session(&user(), TimerPhase::ShortBreak, 5, Utc::now())
            .await
            .expect("insert break");

        let sessions = store.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].phase, TimerPhase::Work);
        assert_eq!(sessions[1].phase, TimerPhase::ShortBreak);
    }

    #[tokio::test]
    async fn in_memory_upserts_are_keyed_by_user_and_date() {
        let store = InMemoryRemoteStore::default();
        let date = NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date");
        let mut aggregate = DailyAggregate::empty(date);
        aggregate.add_work_completion(25);
        store
            .upsert_daily_aggregate(&user(), &aggregate)
            .await
            .expect("first upsert");

        aggregate.add_work_completion(25);
        store
            .upsert_daily_aggregate(&user(), &aggregate)
            .await
            .expect("second upsert");

        let stored = store
            .get_daily_aggregate(&user(), date)
            .await
            .expect("get")
            .expect("aggregate exists");
        assert_eq!(stored.completed_work_count, 2);
        assert_eq!(stored.total_focus_minutes, 50);
    }

    #[tokio::test]
    async fn settings_round_trip_through_in_memory_store() {
        let store = InMemoryRemoteStore::default();
        assert!(store.get_settings(&user()).await.expect("get").is_none());

        let settings = TimerSettings {
            pomodoro_minutes: 50,
            ..TimerSettings::default()
        };
        store
            .upsert_settings(&user(), &settings)
            .await
            .expect("upsert");
        let stored = store
            .get_settings(&user())
            .await
            .expect("get")
            .expect("settings exist");
        assert_eq!(stored.pomodoro_minutes, 50);
    }

    #[test]
    fn settings_row_mapping_clamps_on_the_way_in() {
        let row = SettingsRow {
            user_id: "user-1".to_string(),
            pomodoro_duration: 500,
            short_break_duration: 5,
            long_break_duration: 15,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            long_break_interval: 0,
            notification_sound: "unknown-sound".to_string(),
            sound_volume: 70,
        };
        let settings = row.into_settings();
        assert_eq!(settings.pomodoro_minutes, 60);
        assert_eq!(settings.long_break_interval, 2);
        assert_eq!(settings.notification_sound, "boxing_bell");
    }

    #[test]
    fn rest_endpoint_appends_table_segments() {
        let store = ReqwestRemoteStore::new(
            Url::parse("https://project.supabase.co").expect("valid url"),
            "anon-key",
        );
        let endpoint = store.rest_endpoint("timer_sessions").expect("endpoint");
        assert_eq!(
            endpoint.as_str(),
            "https://project.supabase.co/rest/v1/timer_sessions"
        );
    }
}
