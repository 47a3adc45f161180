use thiserror::Error;

/// Errors raised by the single-connection client (§7).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Shared(#[from] rpcx_share::Error),

    #[error("failed to dial {network}@{address}: {source}")]
    Dial {
        network: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("call was cancelled")]
    Cancelled,

    #[error("call exceeded its deadline")]
    DeadlineExceeded,

    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl Clone for ClientError {
    fn clone(&self) -> Self {
        match self {
            ClientError::Shared(e) => ClientError::Shared(e.clone_for_fanout()),
            ClientError::Dial { network, address, source } => ClientError::ConnectionClosed(format!(
                "dial error to {network}@{address} while fanning out to pending calls: {source}"
            )),
            ClientError::Cancelled => ClientError::Cancelled,
            ClientError::DeadlineExceeded => ClientError::DeadlineExceeded,
            ClientError::ConnectionClosed(s) => ClientError::ConnectionClosed(s.clone()),
        }
    }
}

impl ClientError {
    /// `ServiceError` is raised by the server and carries server semantics;
    /// it must never be retried (§4.4, §7).
    pub fn is_service_error(&self) -> bool {
        matches!(self, ClientError::Shared(rpcx_share::Error::ServiceError(_)))
    }

    /// Context cancellation / deadline errors are never retried (§4.4).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ClientError::Cancelled | ClientError::DeadlineExceeded)
    }

    /// "Uncovered" errors (§4.4): anything that isn't a service error and
    /// isn't a cancellation triggers eviction of the cached connection.
    pub fn is_uncovered(&self) -> bool {
        !self.is_service_error() && !self.is_cancellation()
    }
}
