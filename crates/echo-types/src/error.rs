use thiserror::Error;

/// Errors from the session/analysis store.
///
/// Backend outages never show up here: the hybrid store degrades to its
/// local map instead. What remains are encoding failures and errors raised
/// by a remote backend before the store swallows them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote cache error: {0}")]
    Remote(String),

    #[error("remote cache timed out after {0}ms")]
    Timeout(u64),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Failure of a call to the external analysis provider.
///
/// The core treats every variant the same way; the split only exists for
/// logging.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider payload: {0}")]
    Malformed(String),

    #[error("provider call timed out after {0}ms")]
    Timeout(u64),
}

/// Outcome errors of the analysis pipeline.
///
/// `Clone` because one leader outcome is fanned out to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),

    #[error("analysis provider failed: {0}")]
    Provider(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProviderError> for AnalysisError {
    fn from(e: ProviderError) -> Self {
        AnalysisError::Provider(e.to_string())
    }
}

/// Errors from session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session '{0}' has ended")]
    Ended(String),

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
