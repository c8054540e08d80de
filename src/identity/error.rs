use thiserror::Error;

/// Failure taxonomy for the verify/resolve path. Every variant denies; there
/// is no partial success. Verifier-level failures and resolver-level failures
/// both surface to callers as an authentication problem, distinct from the
/// gate's forbidden decisions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential expired")]
    Expired,
    #[error("credential malformed")]
    Malformed,
    #[error("credential revoked")]
    Revoked,
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("no directory record for subject {0}")]
    UnknownIdentity(String),
    #[error("incomplete profile for subject {subject_id}: missing {missing}")]
    IncompleteProfile {
        subject_id: String,
        missing: &'static str,
    },
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// True for transient infrastructure failures, reported to callers as
    /// service-unavailable rather than as an authentication failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ProviderUnavailable(_))
    }
}
