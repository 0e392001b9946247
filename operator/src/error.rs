//! Errors produced while reconciling a workload.

/// Errors produced by the reconcile functions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any API failure that is not one of the expected races.
    #[error("Kube error: {source}")]
    Kube {
        /// Underlying client error
        #[from]
        source: kube::Error,
    },
    /// The service changed between being observed and being patched.
    #[error("service {namespace}/{name} was modified concurrently")]
    Conflict {
        /// Namespace of the service
        namespace: String,
        /// Name of the service
        name: String,
    },
    /// The workload is missing a field the projection depends on.
    #[error("workload {name} is malformed: {reason}")]
    MalformedWorkload {
        /// Best known name of the workload
        name: String,
        /// What was missing or invalid
        reason: String,
    },
    /// The API answered with an outcome the operation cannot produce.
    #[error("{operation} of service {namespace}/{name} returned {outcome}")]
    UnexpectedOutcome {
        /// Namespace of the service
        namespace: String,
        /// Name of the service
        name: String,
        /// Operation that was attempted
        operation: &'static str,
        /// Outcome that came back
        outcome: &'static str,
    },
}

impl Error {
    pub(crate) fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedWorkload {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unexpected(
        namespace: String,
        name: String,
        operation: &'static str,
        outcome: &'static str,
    ) -> Self {
        Self::UnexpectedOutcome {
            namespace,
            name,
            operation,
            outcome,
        }
    }

    /// Reports whether trying the same event again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::MalformedWorkload { .. } | Error::UnexpectedOutcome { .. } => false,
            Error::Kube { source } => match source {
                kube::Error::Api(resp) => resp.code == 429 || resp.code >= 500,
                kube::Error::HyperError(_)
                | kube::Error::Service(_)
                | kube::Error::ReadEvents(_) => true,
                _ => false,
            },
        }
    }
}
