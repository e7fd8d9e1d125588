//! Error taxonomy for account operations.
//!
//! Audit write failures are absent from [`AccountError`]: they are
//! swallowed by [`crate::audit::AuditRecorder::best_effort`] and never reach
//! callers.

use crate::identity::AuthError;
use crate::store::StoreError;
use thiserror::Error;

/// Input rejected before anything is sent to the provider or the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("identity must not be empty")]
    EmptyIdentity,
    #[error("first name is required")]
    EmptyFirstName,
    #[error("last name is required")]
    EmptyLastName,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password is required")]
    EmptyPassword,
    #[error("unknown profile field: {0}")]
    UnknownField(String),
}

/// Failures surfaced to the user-facing layer.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Credentials rejected by the identity provider.
    #[error("invalid login credentials")]
    Authentication(#[source] AuthError),

    /// No signed-in session for an operation that needs one.
    #[error("not signed in")]
    Unauthenticated,

    /// The store refused the operation for the calling identity.
    #[error("operation not permitted")]
    Authorization(#[source] StoreError),

    /// The profile row itself could not be updated.
    #[error("failed to save profile")]
    PrimaryCommit(#[source] StoreError),

    /// Profile or history could not be fetched.
    #[error("failed to load account data")]
    Load(#[source] StoreError),

    /// Sign-up or sign-out failed at the identity provider.
    #[error("identity provider request failed")]
    Provider(#[source] AuthError),
}

impl AccountError {
    /// Classify a failed profile update: authorization refusals are reported
    /// separately from other commit failures.
    #[must_use]
    pub fn from_commit(err: StoreError) -> Self {
        match err {
            StoreError::Forbidden => Self::Authorization(err),
            other => Self::PrimaryCommit(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_forbidden_is_authorization() {
        let err = AccountError::from_commit(StoreError::Forbidden);
        assert!(matches!(err, AccountError::Authorization(_)));
    }

    #[test]
    fn commit_other_failures_are_primary_commit() {
        let err = AccountError::from_commit(StoreError::Unavailable("down".to_string()));
        assert!(matches!(err, AccountError::PrimaryCommit(_)));

        let err = AccountError::from_commit(StoreError::NotFound);
        assert!(matches!(err, AccountError::PrimaryCommit(_)));
    }

    #[test]
    fn messages_are_generic() {
        let err = AccountError::Authentication(AuthError::Rejected {
            message: "Invalid login credentials".to_string(),
        });
        assert_eq!(err.to_string(), "invalid login credentials");
        assert_eq!(
            ValidationError::UnknownField("email".to_string()).to_string(),
            "unknown profile field: email"
        );
    }
}
