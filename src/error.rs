//! Error types surfaced at construction and configuration time.
//!
//! Queue operations themselves never fail: a full bucket is reported through the boolean result of
//! `admit`, and an empty queue through `None` from `serve`.

/// Configuration rejected while building a scheduler or loading its settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("bucket count must be at least 1")]
    ZeroBuckets,
    #[error("per-bucket capacity must be at least 1")]
    ZeroCapacity,
    #[error("rank scale maximum must be finite and positive, got {0}")]
    InvalidRankScale(f64),
    #[error("admit ratio must be within [0, 1], got {0}")]
    InvalidAdmitRatio(f64),
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
