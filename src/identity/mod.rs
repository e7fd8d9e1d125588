//! Identity provider boundary and the owned session context.
//!
//! Flow Overview:
//! 1) Sign-in returns a `Session` bound to the provider's stable user id.
//! 2) Callers keep that session in a `SessionContext` they own and pass
//!    around explicitly; there is no global "current user".
//! 3) Bearer tokens presented later are resolved back into a session through
//!    `IdentityProvider::session`.

use crate::error::AccountError;
use crate::model::Identity;
use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt;
use thiserror::Error;

mod gotrue;

pub use self::gotrue::GoTrueProvider;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider refused the request; `message` is the provider's text.
    #[error("{message}")]
    Rejected { message: String },
    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected identity provider response: {0}")]
    UnexpectedResponse(String),
}

impl AuthError {
    /// Message recorded as the failure reason of a login attempt.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// An authenticated session issued by the provider.
#[derive(Clone)]
pub struct Session {
    pub identity: Identity,
    pub email: String,
    pub access_token: SecretString,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("email", &self.email)
            .field("access_token", &"***")
            .finish()
    }
}

/// Sign-up payload; profile attributes are forwarded to the provider, which
/// creates the profile row.
#[derive(Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("phone", &self.phone)
            .finish()
    }
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity, AuthError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, AuthError>;

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;

    /// Resolve a bearer token; `Ok(None)` when it is unknown or expired.
    async fn session(&self, access_token: &str) -> Result<Option<Session>, AuthError>;
}

#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// Not yet resolved (loading).
    #[default]
    Unknown,
    SignedOut,
    SignedIn(Session),
}

/// Session state owned by one caller.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    state: SessionState,
}

impl SessionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self {
            state: SessionState::SignedIn(session),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            state: SessionState::SignedOut,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self.state, SessionState::Unknown)
    }

    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::SignedIn(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.session().map(|session| &session.identity)
    }

    /// # Errors
    /// Returns `AccountError::Unauthenticated` unless a session is present.
    pub fn require_identity(&self) -> Result<&Identity, AccountError> {
        self.identity().ok_or(AccountError::Unauthenticated)
    }

    pub fn sign_in(&mut self, session: Session) {
        self.state = SessionState::SignedIn(session);
    }

    /// Drop the session, returning it if there was one.
    pub fn sign_out(&mut self) -> Option<Session> {
        match std::mem::replace(&mut self.state, SessionState::SignedOut) {
            SessionState::SignedIn(session) => Some(session),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn session() -> Result<Session> {
        Ok(Session {
            identity: Identity::new("U1")?,
            email: "ada@example.com".to_string(),
            access_token: SecretString::from("token"),
        })
    }

    #[test]
    fn context_starts_unknown() {
        let context = SessionContext::new();
        assert!(!context.is_resolved());
        assert!(context.identity().is_none());
        assert!(matches!(
            context.require_identity(),
            Err(AccountError::Unauthenticated)
        ));
    }

    #[test]
    fn sign_in_then_out() -> Result<()> {
        let mut context = SessionContext::new();
        context.sign_in(session()?);
        assert_eq!(context.require_identity()?.as_str(), "U1");

        let previous = context.sign_out();
        assert!(previous.is_some());
        assert!(context.is_resolved());
        assert!(context.identity().is_none());
        assert!(context.sign_out().is_none());
        Ok(())
    }

    #[test]
    fn debug_redacts_secrets() -> Result<()> {
        let rendered = format!("{:?}", session()?);
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("\"token\""));

        let request = SignUpRequest {
            email: "ada@example.com".to_string(),
            password: SecretString::from("hunter22"),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
        };
        assert!(!format!("{request:?}").contains("hunter22"));
        Ok(())
    }

    #[test]
    fn rejected_reason_is_provider_message() {
        let err = AuthError::Rejected {
            message: "Invalid login credentials".to_string(),
        };
        assert_eq!(err.reason(), "Invalid login credentials");
    }
}
