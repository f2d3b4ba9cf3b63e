use thiserror::Error;

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Failures inside the tracker. None of these reach the host application:
/// public operations log them and carry on.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No async runtime available to dispatch {0}")]
    NoRuntime(String),
}
