use crate::infrastructure::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_DATABASE_FILE: &str = "pomodoro.db";

/// Remote backend connection settings. The timer itself never needs these;
/// only authenticated sync paths do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u64,
    pub remote_base_url: Option<String>,
    pub remote_anon_key: Option<String>,
    pub database_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            remote_base_url: None,
            remote_anon_key: None,
            database_file: DEFAULT_DATABASE_FILE.to_string(),
        }
    }
}

impl AppConfig {
    /// Both remote fields must be present and valid for sync to be available.
    pub fn remote_endpoint(&self) -> Result<Option<(Url, String)>, CoreError> {
        let (Some(base_url), Some(anon_key)) = (
            self.remote_base_url.as_deref().map(str::trim),
            self.remote_anon_key.as_deref().map(str::trim),
        ) else {
            return Ok(None);
        };

        if base_url.is_empty() || anon_key.is_empty() {
            return Ok(None);
        }

        let parsed = Url::parse(base_url).map_err(|error| {
            CoreError::InvalidConfig(format!("invalid remoteBaseUrl '{base_url}': {error}"))
        })?;
        Ok(Some((parsed, anon_key.to_string())))
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), CoreError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        fs::create_dir_all(config_dir)?;
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_config(config_dir: &Path) -> Result<AppConfig, CoreError> {
    let path = config_dir.join(APP_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: AppConfig = serde_json::from_str(&raw)?;
    if parsed.schema != SUPPORTED_SCHEMA {
        return Err(CoreError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            parsed.schema,
            path.display()
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_default_config_writes_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_config(dir.path()).expect("ensure config");

        let config = load_config(dir.path()).expect("load config");
        assert_eq!(config, AppConfig::default());
        assert!(config.remote_endpoint().expect("endpoint").is_none());
    }

    #[test]
    fn ensure_default_config_keeps_existing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let custom = AppConfig {
            remote_base_url: Some("https://project.supabase.co".to_string()),
            remote_anon_key: Some("anon-key".to_string()),
            ..AppConfig::default()
        };
        fs::write(
            dir.path().join(APP_JSON),
            serde_json::to_string_pretty(&custom).expect("serialize"),
        )
        .expect("write config");

        ensure_default_config(dir.path()).expect("ensure config");
        let loaded = load_config(dir.path()).expect("load config");
        assert_eq!(loaded, custom);

        let (url, key) = loaded
            .remote_endpoint()
            .expect("endpoint")
            .expect("remote configured");
        assert_eq!(url.as_str(), "https://project.supabase.co/");
        assert_eq!(key, "anon-key");
    }

    #[test]
    fn load_config_rejects_unknown_schema() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(
            dir.path().join(APP_JSON),
            r#"{"schema": 2, "databaseFile": "pomodoro.db"}"#,
        )
        .expect("write config");

        assert!(matches!(
            load_config(dir.path()),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_remote_url_is_a_config_error() {
        let config = AppConfig {
            remote_base_url: Some("not a url".to_string()),
            remote_anon_key: Some("anon-key".to_string()),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.remote_endpoint(),
            Err(CoreError::InvalidConfig(_))
        ));
    }
}
