//! In-process identity provider and record store.
//!
//! `MemoryBackend` implements both [`IdentityProvider`] and [`RecordStore`]
//! with the same row policy as the PostgreSQL store. Sign-up creates the
//! profile row itself, standing in for the provider's sign-up hook. It backs
//! the `--in-memory` server mode and the test suites. Built with
//! [`MemoryBackend::with_journal`] it also keeps a journal of
//! every call so tests can assert ordering. Faults can be switched on per
//! operation.

use crate::identity::{AuthError, IdentityProvider, Session, SignUpRequest};
use crate::model::{
    Identity, LoginHistoryRecord, NewLoginAttempt, NewProfileChange, Profile,
    ProfileChangeRecord, ProfileField, ProfileUpdate, normalize_optional,
};
use crate::store::{Caller, RecordStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

/// A call received by the backend, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    SignUp { email: String },
    SignIn { email: String },
    SignOut { identity: Identity },
    FetchProfile { id: Identity },
    UpdateProfile { id: Identity },
    InsertLoginAttempt { subject: String, success: bool },
    InsertProfileChange { field: ProfileField },
    ListLoginHistory { subject: Identity },
    ListProfileChanges { subject: Identity },
}

/// Operations forced to fail with `StoreError::Unavailable`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Faults {
    pub login_inserts: bool,
    pub change_inserts: bool,
    pub profile_updates: bool,
    pub reads: bool,
}

struct Account {
    identity: Identity,
    email: String,
    password: SecretString,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, Identity>,
    profiles: HashMap<Identity, Profile>,
    login_history: Vec<LoginHistoryRecord>,
    profile_changes: Vec<ProfileChangeRecord>,
    /// `None` unless journaling was requested.
    journal: Option<Vec<Operation>>,
    faults: Faults,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    peer_address: Option<String>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("peer_address", &self.peer_address)
            .finish_non_exhaustive()
    }
}

impl State {
    fn record(&mut self, operation: Operation) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(operation);
        }
    }
}

fn unavailable(operation: &str) -> StoreError {
    StoreError::Unavailable(format!("{operation} failed (injected fault)"))
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the store attributes to login history rows, as a real store
    /// would from its connection metadata.
    #[must_use]
    pub fn with_peer_address(mut self, address: impl Into<String>) -> Self {
        self.peer_address = Some(address.into());
        self
    }

    /// Record every provider and store call, in arrival order. Only meant
    /// for tests: the journal is never trimmed.
    #[must_use]
    pub fn with_journal(mut self) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .journal = Some(Vec::new());
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an account and its profile under a fixed identity.
    ///
    /// # Errors
    /// Returns an error if `identity` is blank.
    pub fn seed_account(
        &self,
        identity: &str,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
    ) -> Result<Identity, crate::error::ValidationError> {
        let identity = Identity::new(identity)?;
        let mut state = self.lock();
        insert_account(
            &mut state,
            identity.clone(),
            email,
            SecretString::from(password.to_string()),
            first_name,
            last_name,
            phone.map(str::to_string),
        );
        Ok(identity)
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    #[must_use]
    pub fn journal(&self) -> Vec<Operation> {
        self.lock().journal.clone().unwrap_or_default()
    }

    pub fn clear_journal(&self) {
        if let Some(journal) = self.lock().journal.as_mut() {
            journal.clear();
        }
    }

    /// Every stored login attempt, oldest first, regardless of subject.
    #[must_use]
    pub fn all_login_attempts(&self) -> Vec<LoginHistoryRecord> {
        self.lock().login_history.clone()
    }

    /// Every stored profile change, oldest first, regardless of subject.
    #[must_use]
    pub fn all_profile_changes(&self) -> Vec<ProfileChangeRecord> {
        self.lock().profile_changes.clone()
    }

    #[must_use]
    pub fn profile(&self, id: &Identity) -> Option<Profile> {
        self.lock().profiles.get(id).cloned()
    }
}

fn insert_account(
    state: &mut State,
    identity: Identity,
    email: &str,
    password: SecretString,
    first_name: &str,
    last_name: &str,
    phone: Option<String>,
) {
    let now = Utc::now();
    state.profiles.insert(
        identity.clone(),
        Profile {
            id: identity.clone(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            phone: normalize_optional(phone),
            created_at: now,
            updated_at: now,
        },
    );
    state.accounts.insert(
        email.to_lowercase(),
        Account {
            identity,
            email: email.to_string(),
            password,
        },
    );
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity, AuthError> {
        let mut state = self.lock();
        state.record(Operation::SignUp {
            email: request.email.clone(),
        });

        if state.accounts.contains_key(&request.email.to_lowercase()) {
            return Err(AuthError::Rejected {
                message: "User already registered".to_string(),
            });
        }

        let identity = Identity::new(Uuid::new_v4().to_string())
            .map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?;
        insert_account(
            &mut state,
            identity.clone(),
            &request.email,
            request.password.clone(),
            &request.first_name,
            &request.last_name,
            request.phone.clone(),
        );
        debug!(%identity, "memory sign-up");
        Ok(identity)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, AuthError> {
        let mut state = self.lock();
        state.record(Operation::SignIn {
            email: email.to_string(),
        });

        let (identity, stored_email) = match state.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password.expose_secret() == password.expose_secret() => {
                (account.identity.clone(), account.email.clone())
            }
            _ => {
                return Err(AuthError::Rejected {
                    message: INVALID_CREDENTIALS.to_string(),
                });
            }
        };

        let token = Uuid::new_v4().to_string();
        state.tokens.insert(token.clone(), identity.clone());
        Ok(Session {
            identity,
            email: stored_email,
            access_token: SecretString::from(token),
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        let mut state = self.lock();
        state.record(Operation::SignOut {
            identity: session.identity.clone(),
        });
        state.tokens.remove(session.access_token.expose_secret());
        Ok(())
    }

    async fn session(&self, access_token: &str) -> Result<Option<Session>, AuthError> {
        let state = self.lock();
        let Some(identity) = state.tokens.get(access_token) else {
            return Ok(None);
        };
        let email = state
            .accounts
            .values()
            .find(|account| &account.identity == identity)
            .map(|account| account.email.clone())
            .unwrap_or_default();
        Ok(Some(Session {
            identity: identity.clone(),
            email,
            access_token: SecretString::from(access_token.to_string()),
        }))
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn fetch_profile(
        &self,
        caller: &Caller,
        id: &Identity,
    ) -> Result<Option<Profile>, StoreError> {
        let mut state = self.lock();
        state.record(Operation::FetchProfile { id: id.clone() });
        if state.faults.reads {
            return Err(unavailable("fetch profile"));
        }
        if !caller.owns(id.as_str()) {
            return Err(StoreError::Forbidden);
        }
        Ok(state.profiles.get(id).cloned())
    }

    async fn update_profile(
        &self,
        caller: &Caller,
        id: &Identity,
        update: &ProfileUpdate,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.record(Operation::UpdateProfile { id: id.clone() });
        if state.faults.profile_updates {
            return Err(unavailable("update profile"));
        }
        if !caller.owns(id.as_str()) {
            return Err(StoreError::Forbidden);
        }
        let profile = state.profiles.get_mut(id).ok_or(StoreError::NotFound)?;
        profile.first_name.clone_from(&update.first_name);
        profile.last_name.clone_from(&update.last_name);
        profile.phone.clone_from(&update.phone);
        profile.updated_at = update.updated_at;
        Ok(())
    }

    async fn insert_login_attempt(
        &self,
        caller: &Caller,
        attempt: &NewLoginAttempt,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.record(Operation::InsertLoginAttempt {
            subject: attempt.subject().as_str().to_string(),
            success: attempt.success(),
        });
        if state.faults.login_inserts {
            return Err(unavailable("insert login attempt"));
        }
        if !caller.may_record(attempt) {
            return Err(StoreError::Forbidden);
        }
        state.login_history.push(LoginHistoryRecord {
            id: Uuid::new_v4(),
            subject: attempt.subject().clone(),
            attempted_at: Utc::now(),
            ip_address: self.peer_address.clone(),
            client_descriptor: attempt.client_descriptor().map(str::to_string),
            success: attempt.success(),
            failure_reason: attempt.failure_reason().map(str::to_string),
        });
        Ok(())
    }

    async fn insert_profile_change(
        &self,
        caller: &Caller,
        change: &NewProfileChange,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.record(Operation::InsertProfileChange { field: change.field });
        if state.faults.change_inserts {
            return Err(unavailable("insert profile change"));
        }
        if !caller.owns(change.subject.as_str()) || change.actor != change.subject {
            return Err(StoreError::Forbidden);
        }
        state.profile_changes.push(ProfileChangeRecord {
            id: Uuid::new_v4(),
            subject: change.subject.clone(),
            field: change.field,
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            changed_at: Utc::now(),
            actor: change.actor.clone(),
        });
        Ok(())
    }

    async fn list_login_history(
        &self,
        caller: &Caller,
        subject: &Identity,
    ) -> Result<Vec<LoginHistoryRecord>, StoreError> {
        let mut state = self.lock();
        state.record(Operation::ListLoginHistory {
            subject: subject.clone(),
        });
        if state.faults.reads {
            return Err(unavailable("list login history"));
        }
        if !caller.owns(subject.as_str()) {
            return Err(StoreError::Forbidden);
        }
        Ok(state
            .login_history
            .iter()
            .rev()
            .filter(|record| record.subject.as_str() == subject.as_str())
            .cloned()
            .collect())
    }

    async fn list_profile_changes(
        &self,
        caller: &Caller,
        subject: &Identity,
    ) -> Result<Vec<ProfileChangeRecord>, StoreError> {
        let mut state = self.lock();
        state.record(Operation::ListProfileChanges {
            subject: subject.clone(),
        });
        if state.faults.reads {
            return Err(unavailable("list profile changes"));
        }
        if !caller.owns(subject.as_str()) {
            return Err(StoreError::Forbidden);
        }
        Ok(state
            .profile_changes
            .iter()
            .rev()
            .filter(|record| &record.subject == subject)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.lock().faults.reads {
            return Err(unavailable("ping"));
        }
        Ok(())
    }
}
