use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl Serialize for GatewayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures surfaced by the credential pool. `NoCredential` and
/// `TemporaryRefresh` are transient; `PermanentRefresh` means the chosen
/// credential has just been disabled and the caller should acquire again.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("no available credentials for model {0}")]
    NoCredential(String),

    #[error("permanent refresh failure (status {0}), credential disabled")]
    PermanentRefresh(u16),

    #[error("temporary refresh failure: {0}")]
    TemporaryRefresh(String),
}
