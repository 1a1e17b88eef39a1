use std::time::Duration;

/// Failure of the initial, bounded connect.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid broker url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported broker url scheme '{0}' (use tcp://, mqtt://, ssl://, tls:// or mqtts://)")]
    UnsupportedScheme(String),

    #[error("broker url has no host")]
    MissingHost,

    #[error("broker did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("broker rejected the connection: {0}")]
    Rejected(String),

    #[error("connection failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

pub type Result<T> = std::result::Result<T, Error>;
