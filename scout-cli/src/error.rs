use scout_engine::{DiscoveryError, SessionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Browser error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
