use thiserror::Error;

#[derive(Error, Debug)]
pub enum KgadgetError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Agent error: {0:#}")]
    AgentError(anyhow::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported feature on this system: {0}")]
    UnsupportedFeature(String),
}

impl From<anyhow::Error> for KgadgetError {
    fn from(err: anyhow::Error) -> Self {
        KgadgetError::AgentError(err)
    }
}

pub type Result<T> = std::result::Result<T, KgadgetError>;
