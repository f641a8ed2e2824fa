//! VizAlert error type.

/// Errors raised by VizAlert infrastructure (config, storage, adapters).
#[derive(Debug, thiserror::Error)]
pub enum VizAlertError {
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("query error: {0}")]
    Query(String),

    /// The query context could not be loaded from the results cache.
    #[error("cache load error: {0}")]
    CacheLoad(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VizAlertError>;
