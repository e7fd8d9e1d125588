//! Account flows: sign-up, sign-in with login history, sign-out, and the
//! read-only history views.
//!
//! Every sign-in submission records exactly one login history row:
//! - rejected credentials record the submitted identifier, the provider's
//!   message as the failure reason, then return the authentication error;
//! - accepted credentials record the resolved identity, and only after that
//!   attempt is the session context signed in;
//! - a blank password is recorded as a failure without calling the provider.
//!
//! A blank identifier is rejected without a row, since the subject must not
//! be empty.

use crate::audit::AuditRecorder;
use crate::error::{AccountError, ValidationError};
use crate::identity::{IdentityProvider, Session, SessionContext, SignUpRequest};
use crate::model::{Identity, LoginHistoryRecord, NewLoginAttempt, ProfileChangeRecord};
use crate::store::{Caller, RecordStore};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Basic email format check.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[derive(Clone)]
pub struct AccountService {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    recorder: AuditRecorder,
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService").finish_non_exhaustive()
    }
}

impl AccountService {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            provider,
            recorder: AuditRecorder::new(store.clone()),
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    /// Register a new identity. The provider creates the profile row.
    ///
    /// # Errors
    /// Returns `AccountError::Validation` for malformed input and
    /// `AccountError::Provider` if the provider refuses.
    #[instrument(skip_all, fields(email = %request.email))]
    pub async fn sign_up(&self, mut request: SignUpRequest) -> Result<Identity, AccountError> {
        request.email = request.email.trim().to_string();
        if !valid_email(&request.email) {
            return Err(ValidationError::InvalidEmail.into());
        }
        if request.password.expose_secret().is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }
        request.first_name = request.first_name.trim().to_string();
        if request.first_name.is_empty() {
            return Err(ValidationError::EmptyFirstName.into());
        }
        request.last_name = request.last_name.trim().to_string();
        if request.last_name.is_empty() {
            return Err(ValidationError::EmptyLastName.into());
        }
        request.phone = crate::model::normalize_optional(request.phone);

        let identity = self
            .provider
            .sign_up(&request)
            .await
            .map_err(AccountError::Provider)?;

        info!(%identity, "identity registered");
        Ok(identity)
    }

    /// Authenticate and record the attempt.
    ///
    /// # Errors
    /// Returns `AccountError::Authentication` when the provider rejects the
    /// credentials (after the failure has been recorded), or
    /// `AccountError::Validation` for a blank identifier (nothing recorded)
    /// or a blank password (recorded as a failed attempt).
    #[instrument(skip_all, fields(email = %email))]
    pub async fn sign_in(
        &self,
        context: &mut SessionContext,
        email: &str,
        password: &SecretString,
        client_descriptor: Option<String>,
    ) -> Result<Session, AccountError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ValidationError::InvalidEmail.into());
        }
        if password.expose_secret().is_empty() {
            let reason = ValidationError::EmptyPassword;
            let attempt = NewLoginAttempt::failed(email, client_descriptor, reason.to_string());
            AuditRecorder::best_effort(
                self.recorder
                    .record_login_attempt(&Caller::Anonymous, &attempt)
                    .await,
            );
            return Err(reason.into());
        }

        match self.provider.sign_in_with_password(email, password).await {
            Ok(session) => {
                let attempt =
                    NewLoginAttempt::succeeded(session.identity.clone(), client_descriptor);
                AuditRecorder::best_effort(
                    self.recorder
                        .record_login_attempt(&Caller::from(&session.identity), &attempt)
                        .await,
                );

                debug!(identity = %session.identity, "sign-in succeeded");
                context.sign_in(session.clone());
                Ok(session)
            }
            Err(err) => {
                let attempt = NewLoginAttempt::failed(email, client_descriptor, err.reason());
                AuditRecorder::best_effort(
                    self.recorder
                        .record_login_attempt(&Caller::Anonymous, &attempt)
                        .await,
                );

                debug!("sign-in rejected: {err}");
                Err(AccountError::Authentication(err))
            }
        }
    }

    /// End the session. The context is signed out even if the provider call
    /// fails; the failure is logged.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, context: &mut SessionContext) {
        let Some(session) = context.sign_out() else {
            return;
        };
        if let Err(err) = self.provider.sign_out(&session).await {
            warn!(identity = %session.identity, "provider sign-out failed: {err}");
        }
    }

    /// Resolve a bearer token into a session context.
    ///
    /// # Errors
    /// Returns `AccountError::Provider` if the provider cannot be queried.
    pub async fn resolve_session(&self, access_token: &str) -> Result<SessionContext, AccountError> {
        match self.provider.session(access_token).await {
            Ok(Some(session)) => Ok(SessionContext::signed_in(session)),
            Ok(None) => Ok(SessionContext::signed_out()),
            Err(err) => {
                error!("Failed to resolve session: {err}");
                Err(AccountError::Provider(err))
            }
        }
    }

    /// Login history of `identity`, newest first.
    ///
    /// # Errors
    /// Returns `AccountError::Load` if the store read fails.
    pub async fn login_history(
        &self,
        identity: &Identity,
    ) -> Result<Vec<LoginHistoryRecord>, AccountError> {
        self.store
            .list_login_history(&Caller::from(identity), identity)
            .await
            .map_err(|err| {
                error!("Failed to load login history: {err}");
                AccountError::Load(err)
            })
    }

    /// Profile change history of `identity`, newest first.
    ///
    /// # Errors
    /// Returns `AccountError::Load` if the store read fails.
    pub async fn profile_changes(
        &self,
        identity: &Identity,
    ) -> Result<Vec<ProfileChangeRecord>, AccountError> {
        self.store
            .list_profile_changes(&Caller::from(identity), identity)
            .await
            .map_err(|err| {
                error!("Failed to load profile changes: {err}");
                AccountError::Load(err)
            })
    }
}
