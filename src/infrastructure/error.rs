use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Remote store error: {0}")]
    Remote(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}
