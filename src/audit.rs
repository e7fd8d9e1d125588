//! Audit recorder for login attempts and profile field changes.
//!
//! Delivery is best effort and at most once. Each `record_*` call appends one
//! row and returns an explicit `Result`, but user-facing flows pass it through
//! [`AuditRecorder::best_effort`], which logs and discards the error. A lost
//! audit row never blocks a sign-in or a profile save, and nothing is retried.

use crate::model::{NewLoginAttempt, NewProfileChange};
use crate::store::{Caller, RecordStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to record login attempt for {subject}: {source}")]
    LoginAttempt {
        subject: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to record {field} change for {subject}: {source}")]
    ProfileChange {
        subject: String,
        field: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("audit subject must not be empty")]
    EmptySubject,
}

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

impl AuditRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Append one login history row.
    ///
    /// # Errors
    /// Returns `AuditError` if the subject is blank or the insert fails.
    #[instrument(skip_all, fields(subject = %attempt.subject().as_str(), success = attempt.success()))]
    pub async fn record_login_attempt(
        &self,
        caller: &Caller,
        attempt: &NewLoginAttempt,
    ) -> Result<(), AuditError> {
        let subject = attempt.subject().as_str();
        if subject.trim().is_empty() {
            return Err(AuditError::EmptySubject);
        }

        self.store
            .insert_login_attempt(caller, attempt)
            .await
            .map_err(|source| AuditError::LoginAttempt {
                subject: subject.to_string(),
                source,
            })?;

        debug!("login attempt recorded");
        Ok(())
    }

    /// Append one profile change row.
    ///
    /// # Errors
    /// Returns `AuditError` if the insert fails.
    #[instrument(skip_all, fields(subject = %change.subject, field = %change.field))]
    pub async fn record_profile_field_change(
        &self,
        caller: &Caller,
        change: &NewProfileChange,
    ) -> Result<(), AuditError> {
        self.store
            .insert_profile_change(caller, change)
            .await
            .map_err(|source| AuditError::ProfileChange {
                subject: change.subject.to_string(),
                field: change.field.as_str(),
                source,
            })?;

        debug!("profile change recorded");
        Ok(())
    }

    /// Discard an audit result after logging a failure.
    ///
    /// Returns whether the row was written, for tracing only; callers must not
    /// branch user-visible behavior on it.
    pub fn best_effort(result: Result<(), AuditError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("audit write dropped: {err}");
                false
            }
        }
    }
}
