use super::{FieldChange, Identity, ProfileField};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who a login attempt was about.
///
/// Successful attempts carry the identity resolved by the provider. Failed
/// attempts only have what the user typed, which may not name a real account.
/// Both are stored in the same `subject_id` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginSubject {
    Verified(Identity),
    Attempted(String),
}

impl LoginSubject {
    /// Rebuild the subject from a stored row.
    #[must_use]
    pub fn from_row(subject_id: String, success: bool) -> Self {
        if success {
            match Identity::new(subject_id.clone()) {
                Ok(identity) => Self::Verified(identity),
                Err(_) => Self::Attempted(subject_id),
            }
        } else {
            Self::Attempted(subject_id)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Verified(identity) => identity.as_str(),
            Self::Attempted(identifier) => identifier,
        }
    }

    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Stored login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginHistoryRecord {
    pub id: Uuid,
    pub subject: LoginSubject,
    pub attempted_at: DateTime<Utc>,
    /// Attributed by the store from the connection, never by the caller.
    pub ip_address: Option<String>,
    pub client_descriptor: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

/// Login attempt to append. Only the two constructors exist, so a failure
/// reason is present exactly when the attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoginAttempt {
    subject: LoginSubject,
    client_descriptor: Option<String>,
    success: bool,
    failure_reason: Option<String>,
}

impl NewLoginAttempt {
    #[must_use]
    pub fn succeeded(identity: Identity, client_descriptor: Option<String>) -> Self {
        Self {
            subject: LoginSubject::Verified(identity),
            client_descriptor,
            success: true,
            failure_reason: None,
        }
    }

    #[must_use]
    pub fn failed(
        identifier: impl Into<String>,
        client_descriptor: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            subject: LoginSubject::Attempted(identifier.into()),
            client_descriptor,
            success: false,
            failure_reason: Some(reason.into()),
        }
    }

    #[must_use]
    pub const fn subject(&self) -> &LoginSubject {
        &self.subject
    }

    #[must_use]
    pub fn client_descriptor(&self) -> Option<&str> {
        self.client_descriptor.as_deref()
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

/// Stored single-field profile change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChangeRecord {
    pub id: Uuid,
    pub subject: Identity,
    pub field: ProfileField,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub actor: Identity,
}

/// Profile change to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfileChange {
    pub subject: Identity,
    pub actor: Identity,
    pub field: ProfileField,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl NewProfileChange {
    /// Change made by the profile owner; actor and subject are the same.
    #[must_use]
    pub fn self_service(identity: &Identity, change: FieldChange) -> Self {
        Self {
            subject: identity.clone(),
            actor: identity.clone(),
            field: change.field,
            old_value: change.old_value,
            new_value: change.new_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn failed_attempt_keeps_raw_identifier() {
        let attempt = NewLoginAttempt::failed("a@b.com", None, "Invalid login credentials");
        assert!(!attempt.success());
        assert!(!attempt.subject().is_verified());
        assert_eq!(attempt.subject().as_str(), "a@b.com");
        assert_eq!(attempt.failure_reason(), Some("Invalid login credentials"));
    }

    #[test]
    fn successful_attempt_has_no_reason() -> Result<(), ValidationError> {
        let attempt =
            NewLoginAttempt::succeeded(Identity::new("U1")?, Some("curl/8.5".to_string()));
        assert!(attempt.success());
        assert!(attempt.subject().is_verified());
        assert_eq!(attempt.subject().as_str(), "U1");
        assert_eq!(attempt.failure_reason(), None);
        assert_eq!(attempt.client_descriptor(), Some("curl/8.5"));
        Ok(())
    }

    #[test]
    fn subject_from_row() {
        assert!(LoginSubject::from_row("U1".to_string(), true).is_verified());
        assert!(!LoginSubject::from_row("a@b.com".to_string(), false).is_verified());
        assert!(!LoginSubject::from_row(String::new(), true).is_verified());
    }

    #[test]
    fn self_service_change_sets_actor() -> Result<(), ValidationError> {
        let identity = Identity::new("U1")?;
        let change = NewProfileChange::self_service(
            &identity,
            FieldChange {
                field: ProfileField::LastName,
                old_value: Some("Byron".to_string()),
                new_value: Some("King".to_string()),
            },
        );
        assert_eq!(change.actor, change.subject);
        assert_eq!(change.field, ProfileField::LastName);
        Ok(())
    }
}
