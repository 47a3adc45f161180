use thiserror::Error;

/// Error kinds shared by the connection client and the governance client.
///
/// Both layers wrap this in their own richer error type (`rpcx_client::ClientError`,
/// `rpcx_governance::GovernanceError`) rather than returning it directly, so callers
/// that only care about one layer aren't forced to match on the other's variants.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection is shut down")]
    Shutdown,

    #[error("unsupported codec")]
    UnsupportedCodec,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A transport failure that has already been reported once and now needs
    /// to be fanned out to several pending calls at once. `io::Error` isn't
    /// `Clone`, so the reader loop downgrades it to its display text here.
    #[error("transport error: {0}")]
    TransportClosed(String),

    #[error("call timed out")]
    Timeout,

    #[error("server returned an error: {0}")]
    ServiceError(String),
}

impl Error {
    pub fn clone_for_fanout(&self) -> Error {
        match self {
            Error::Shutdown => Error::Shutdown,
            Error::UnsupportedCodec => Error::UnsupportedCodec,
            Error::Transport(e) => Error::TransportClosed(e.to_string()),
            Error::TransportClosed(s) => Error::TransportClosed(s.clone()),
            Error::Timeout => Error::Timeout,
            Error::ServiceError(s) => Error::ServiceError(s.clone()),
        }
    }
}
