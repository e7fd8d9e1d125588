//! Account data model: identities, profiles, and the two audit trails.
//!
//! Profiles are mutable and owned by the identity they describe. Login history
//! and profile change records are append-only; nothing in this crate updates
//! or deletes them.

mod history;
mod identity;
mod profile;

pub use self::history::{
    LoginHistoryRecord, LoginSubject, NewLoginAttempt, NewProfileChange, ProfileChangeRecord,
};
pub use self::identity::Identity;
pub use self::profile::{
    FieldChange, Profile, ProfileField, ProfileForm, ProfileUpdate, ProfileValues,
    normalize_optional,
};
