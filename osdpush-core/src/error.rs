#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Registry busy: {0}")]
    Busy(&'static str),
    #[error("Channel not found")]
    ChannelNotFound,
    #[error("Enrichment provider failed: {0}")]
    ProviderFailed(String),
    #[error("Enrichment provider timed out")]
    ProviderTimedOut,
    #[error("std::io error: {0}")]
    IoError(std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(serde_json::Error),
    #[error(transparent)]
    AnyhowError(#[from] anyhow::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err)
    }
}
