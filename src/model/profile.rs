use super::Identity;
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Mutable profile attributes, in canonical audit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    FirstName,
    LastName,
    #[serde(rename = "phone_number")]
    Phone,
}

impl ProfileField {
    /// Audit order for a single submission.
    pub const ALL: [Self; 3] = [Self::FirstName, Self::LastName, Self::Phone];

    /// Column / field name as stored in profile change records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Phone => "phone_number",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownField(s.to_string()))
    }
}

/// One profile row per identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Identity,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    #[must_use]
    pub fn value(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::FirstName => Some(self.first_name.as_str()),
            ProfileField::LastName => Some(self.last_name.as_str()),
            ProfileField::Phone => self.phone.as_deref(),
        }
    }
}

/// Raw profile edit as submitted by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ProfileForm {
    /// Validate and normalize the submission.
    ///
    /// Names are trimmed and must not be empty. The optional phone number is
    /// trimmed and an empty value collapses to absent, so `""` and a missing
    /// phone compare equal.
    ///
    /// # Errors
    /// Returns a `ValidationError` naming the first missing required field.
    pub fn normalize(&self) -> Result<ProfileValues, ValidationError> {
        let first_name = self.first_name.trim();
        if first_name.is_empty() {
            return Err(ValidationError::EmptyFirstName);
        }
        let last_name = self.last_name.trim();
        if last_name.is_empty() {
            return Err(ValidationError::EmptyLastName);
        }

        Ok(ProfileValues {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            phone: normalize_optional(self.phone.clone()),
        })
    }
}

/// Validated, normalized profile values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileValues {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

impl ProfileValues {
    #[must_use]
    pub fn value(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::FirstName => Some(self.first_name.as_str()),
            ProfileField::LastName => Some(self.last_name.as_str()),
            ProfileField::Phone => self.phone.as_deref(),
        }
    }

    /// Fields that differ from `snapshot`, in canonical order.
    ///
    /// Old values are reported as loaded; comparison normalizes the snapshot's
    /// optional fields the same way submissions are normalized.
    #[must_use]
    pub fn changes_from(&self, snapshot: &Profile) -> Vec<FieldChange> {
        ProfileField::ALL
            .into_iter()
            .filter_map(|field| {
                let old = snapshot.value(field);
                let new = self.value(field);
                let old_cmp = match field {
                    ProfileField::Phone => old.map(str::trim).filter(|v| !v.is_empty()),
                    _ => old,
                };
                (old_cmp != new).then(|| FieldChange {
                    field,
                    old_value: old.map(str::to_string),
                    new_value: new.map(str::to_string),
                })
            })
            .collect()
    }

    /// Row-level write for these values with a fresh update timestamp.
    #[must_use]
    pub fn into_update(self, updated_at: DateTime<Utc>) -> ProfileUpdate {
        ProfileUpdate {
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            updated_at,
        }
    }
}

/// A single field's old/new pair from a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: ProfileField,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Profile update carrying every submitted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Trim an optional value and treat empty as absent.
#[must_use]
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(phone: Option<&str>) -> Result<Profile, ValidationError> {
        let now = Utc::now();
        Ok(Profile {
            id: Identity::new("U1")?,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: phone.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    fn form(first: &str, last: &str, phone: Option<&str>) -> ProfileForm {
        ProfileForm {
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone: phone.map(str::to_string),
        }
    }

    #[test]
    fn field_names_round_trip() -> Result<(), ValidationError> {
        for field in ProfileField::ALL {
            assert_eq!(field.as_str().parse::<ProfileField>()?, field);
        }
        assert_eq!(
            "email".parse::<ProfileField>(),
            Err(ValidationError::UnknownField("email".to_string()))
        );
        Ok(())
    }

    #[test]
    fn normalize_requires_names() {
        assert_eq!(
            form(" ", "Lovelace", None).normalize(),
            Err(ValidationError::EmptyFirstName)
        );
        assert_eq!(
            form("Ada", "", None).normalize(),
            Err(ValidationError::EmptyLastName)
        );
    }

    #[test]
    fn normalize_collapses_empty_phone() -> Result<(), ValidationError> {
        let values = form(" Ada ", "Lovelace", Some("  ")).normalize()?;
        assert_eq!(values.first_name, "Ada");
        assert_eq!(values.phone, None);
        Ok(())
    }

    #[test]
    fn unchanged_submission_has_no_changes() -> Result<(), ValidationError> {
        let snapshot = profile(Some("555-0100"))?;
        let values = form("Ada", "Lovelace", Some("555-0100")).normalize()?;
        assert!(values.changes_from(&snapshot).is_empty());
        Ok(())
    }

    #[test]
    fn empty_and_absent_phone_are_equal() -> Result<(), ValidationError> {
        let snapshot = profile(Some(""))?;
        let values = form("Ada", "Lovelace", None).normalize()?;
        assert!(values.changes_from(&snapshot).is_empty());

        let snapshot = profile(None)?;
        let values = form("Ada", "Lovelace", Some("")).normalize()?;
        assert!(values.changes_from(&snapshot).is_empty());
        Ok(())
    }

    #[test]
    fn changes_follow_canonical_order() -> Result<(), ValidationError> {
        let snapshot = profile(None)?;
        let values = form("Augusta", "King", Some("555-0100")).normalize()?;
        let changes = values.changes_from(&snapshot);
        let fields: Vec<_> = changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, ProfileField::ALL.to_vec());
        assert_eq!(changes[2].old_value, None);
        assert_eq!(changes[2].new_value.as_deref(), Some("555-0100"));
        assert_eq!(changes[0].old_value.as_deref(), Some("Ada"));
        Ok(())
    }

    #[test]
    fn clearing_phone_records_null_new_value() -> Result<(), ValidationError> {
        let snapshot = profile(Some("555-0100"))?;
        let values = form("Ada", "Lovelace", Some("")).normalize()?;
        let changes = values.changes_from(&snapshot);
        assert_eq!(
            changes,
            vec![FieldChange {
                field: ProfileField::Phone,
                old_value: Some("555-0100".to_string()),
                new_value: None,
            }]
        );
        Ok(())
    }
}
