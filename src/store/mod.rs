//! Record store boundary: profiles, login history, and profile changes.
//!
//! Every call names its `Caller`. Implementations enforce the row policy:
//! - reads and inserts only where the row subject is the caller's identity;
//! - profile updates only by the profile's own identity;
//! - anonymous callers may only append failed login attempts.

use crate::model::{
    Identity, LoginHistoryRecord, NewLoginAttempt, NewProfileChange, Profile,
    ProfileChangeRecord, ProfileUpdate,
};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

mod postgres;

pub use self::postgres::PgStore;

/// Identity on whose behalf a store call runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Identity(Identity),
}

impl Caller {
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Anonymous => None,
            Self::Identity(identity) => Some(identity),
        }
    }

    /// True when the caller is the identity named by `subject`.
    #[must_use]
    pub fn owns(&self, subject: &str) -> bool {
        self.identity()
            .is_some_and(|identity| identity.as_str() == subject)
    }

    /// Whether this caller may append `attempt` under the login history policy.
    #[must_use]
    pub fn may_record(&self, attempt: &NewLoginAttempt) -> bool {
        match self {
            Self::Anonymous => !attempt.success(),
            Self::Identity(_) => self.owns(attempt.subject().as_str()),
        }
    }
}

impl From<Identity> for Caller {
    fn from(identity: Identity) -> Self {
        Self::Identity(identity)
    }
}

impl From<&Identity> for Caller {
    fn from(identity: &Identity) -> Self {
        Self::Identity(identity.clone())
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Identity(identity) => identity.fmt(f),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// Row policy refused the operation for this caller.
    #[error("operation not permitted for caller")]
    Forbidden,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_policy_violation(&err) {
            Self::Forbidden
        } else {
            Self::Database(err)
        }
    }
}

/// SQLSTATE 42501 (`insufficient_privilege`), raised by row level security.
pub(crate) fn is_policy_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "42501"),
        _ => false,
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_profile(
        &self,
        caller: &Caller,
        id: &Identity,
    ) -> Result<Option<Profile>, StoreError>;

    /// Write every field of `update` to the profile row of `id`.
    async fn update_profile(
        &self,
        caller: &Caller,
        id: &Identity,
        update: &ProfileUpdate,
    ) -> Result<(), StoreError>;

    async fn insert_login_attempt(
        &self,
        caller: &Caller,
        attempt: &NewLoginAttempt,
    ) -> Result<(), StoreError>;

    async fn insert_profile_change(
        &self,
        caller: &Caller,
        change: &NewProfileChange,
    ) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_login_history(
        &self,
        caller: &Caller,
        subject: &Identity,
    ) -> Result<Vec<LoginHistoryRecord>, StoreError>;

    /// Newest first.
    async fn list_profile_changes(
        &self,
        caller: &Caller,
        subject: &Identity,
    ) -> Result<Vec<ProfileChangeRecord>, StoreError>;

    /// Cheap liveness check for `/health`.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError};

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn policy_violation_maps_to_forbidden() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("42501"),
        }));
        assert!(matches!(StoreError::from(err), StoreError::Forbidden));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(matches!(StoreError::from(err), StoreError::Database(_)));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn anonymous_may_only_record_failures() -> Result<()> {
        let failed = NewLoginAttempt::failed("a@b.com", None, "Invalid login credentials");
        let succeeded = NewLoginAttempt::succeeded(Identity::new("U1")?, None);

        assert!(Caller::Anonymous.may_record(&failed));
        assert!(!Caller::Anonymous.may_record(&succeeded));
        Ok(())
    }

    #[test]
    fn identity_may_only_record_own_attempts() -> Result<()> {
        let caller = Caller::from(Identity::new("U1")?);
        assert!(caller.may_record(&NewLoginAttempt::succeeded(Identity::new("U1")?, None)));
        assert!(!caller.may_record(&NewLoginAttempt::succeeded(Identity::new("U2")?, None)));
        assert!(!caller.may_record(&NewLoginAttempt::failed("a@b.com", None, "bad")));
        assert_eq!(caller.to_string(), "U1");
        assert_eq!(Caller::Anonymous.to_string(), "anonymous");
        Ok(())
    }
}
