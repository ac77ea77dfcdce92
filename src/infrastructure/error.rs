use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid task: {0}")]
    InvalidTask(String),
    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
