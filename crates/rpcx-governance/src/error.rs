use thiserror::Error;

/// Errors raised by the governance client (§7).
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Client(#[from] rpcx_client::ClientError),

    #[error("governance client is shut down")]
    Shutdown,

    #[error("selector returned no server for this call")]
    NoServer,

    #[error("endpoint is unavailable: {0}")]
    Unavailable(String),

    #[error("circuit breaker is open for this endpoint")]
    BreakerOpen,

    #[error("call was cancelled")]
    Cancelled,

    #[error("{0} of {1} endpoints failed: {2:?}")]
    Aggregate(usize, usize, Vec<GovernanceError>),
}

impl Clone for GovernanceError {
    fn clone(&self) -> Self {
        match self {
            GovernanceError::Client(e) => GovernanceError::Client(e.clone()),
            GovernanceError::Shutdown => GovernanceError::Shutdown,
            GovernanceError::NoServer => GovernanceError::NoServer,
            GovernanceError::Unavailable(s) => GovernanceError::Unavailable(s.clone()),
            GovernanceError::BreakerOpen => GovernanceError::BreakerOpen,
            GovernanceError::Cancelled => GovernanceError::Cancelled,
            GovernanceError::Aggregate(ok, total, errs) => {
                GovernanceError::Aggregate(*ok, *total, errs.clone())
            }
        }
    }
}

impl GovernanceError {
    /// A `ServiceError` carries server semantics and must never be retried (§4.4).
    pub fn is_service_error(&self) -> bool {
        matches!(self, GovernanceError::Client(e) if e.is_service_error())
    }

    /// Context cancellation / deadline errors are never retried (§4.4).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GovernanceError::Cancelled)
            || matches!(self, GovernanceError::Client(e) if e.is_cancellation())
    }

    /// "Uncovered" errors trigger eviction of the cached connection between
    /// attempts (§4.4): anything that isn't a service error and isn't a
    /// cancellation.
    pub fn is_uncovered(&self) -> bool {
        !self.is_service_error() && !self.is_cancellation()
    }
}
