use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable token naming an authenticated principal.
///
/// The value comes from the identity provider and is never interpreted here;
/// the only rule is that it is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// # Errors
    /// Returns `ValidationError::EmptyIdentity` for empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyIdentity);
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_identity() {
        assert_eq!(Identity::new(""), Err(ValidationError::EmptyIdentity));
        assert_eq!(Identity::new("   "), Err(ValidationError::EmptyIdentity));
    }

    #[test]
    fn keeps_value_verbatim() -> Result<(), ValidationError> {
        let identity = Identity::new("9b2f0c1e-user")?;
        assert_eq!(identity.as_str(), "9b2f0c1e-user");
        assert_eq!(identity.to_string(), "9b2f0c1e-user");
        Ok(())
    }

    #[test]
    fn deserialize_rejects_empty() {
        let result: Result<Identity, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }
}
