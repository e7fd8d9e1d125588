//! Profile mutation coordinator.
//!
//! One submission runs one cycle, strictly in order:
//! 1) Diffing: validate the form and compare it with the loaded snapshot.
//! 2) Auditing: write one change record per differing field, in
//!    `first_name`, `last_name`, `phone_number` order. Failures are dropped.
//! 3) Committing: issue a single profile update with every submitted value
//!    and a fresh `updated_at`, even when nothing changed.
//! 4) Reloading: re-fetch the profile and its change history.
//!
//! Audit rows are attempted before the update is sent, so a crash between
//! steps 2 and 3 can leave history describing a change that was never
//! committed. The profile row itself is never left half-written.

use crate::audit::AuditRecorder;
use crate::error::AccountError;
use crate::model::{
    Identity, NewProfileChange, Profile, ProfileChangeRecord, ProfileField, ProfileForm,
};
use crate::store::{Caller, RecordStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loaded,
    Diffing,
    Auditing,
    Committing,
    Reloading,
}

/// Outcome shown to the user for the last cycle or reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Saved,
    /// Saved, but the follow-up reload failed; views are stale.
    SavedStale,
    SaveFailed,
    LoadFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    /// Fields that differed from the snapshot, in audit order.
    pub changed: Vec<ProfileField>,
    pub reloaded: bool,
}

pub struct ProfileCoordinator {
    store: Arc<dyn RecordStore>,
    recorder: AuditRecorder,
    identity: Identity,
    caller: Caller,
    snapshot: Profile,
    changes: Vec<ProfileChangeRecord>,
    phase: Phase,
    notice: Option<Notice>,
}

impl std::fmt::Debug for ProfileCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCoordinator")
            .field("identity", &self.identity)
            .field("phase", &self.phase)
            .field("notice", &self.notice)
            .finish_non_exhaustive()
    }
}

impl ProfileCoordinator {
    /// Load the profile of `identity` and its change history.
    ///
    /// A history read failure still yields a coordinator, with an empty
    /// history view and `Notice::LoadFailed`.
    ///
    /// # Errors
    /// Returns `AccountError::Load` if the profile cannot be fetched or does
    /// not exist.
    #[instrument(skip(store))]
    pub async fn load(store: Arc<dyn RecordStore>, identity: Identity) -> Result<Self, AccountError> {
        let caller = Caller::from(&identity);
        let snapshot = fetch_snapshot(store.as_ref(), &caller, &identity).await?;

        let mut notice = None;
        let changes = match store.list_profile_changes(&caller, &identity).await {
            Ok(changes) => changes,
            Err(err) => {
                error!("Failed to load profile change history: {err}");
                notice = Some(Notice::LoadFailed);
                Vec::new()
            }
        };

        Ok(Self {
            recorder: AuditRecorder::new(store.clone()),
            store,
            identity,
            caller,
            snapshot,
            changes,
            phase: Phase::Loaded,
            notice,
        })
    }

    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Last successfully loaded profile.
    #[must_use]
    pub const fn snapshot(&self) -> &Profile {
        &self.snapshot
    }

    /// Profile change history, newest first.
    #[must_use]
    pub fn changes(&self) -> &[ProfileChangeRecord] {
        &self.changes
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn notice(&self) -> Option<Notice> {
        self.notice
    }

    /// Replace the snapshot and history views with fresh reads.
    ///
    /// # Errors
    /// Returns `AccountError::Load`; views that could not be read stay stale.
    pub async fn reload(&mut self) -> Result<(), AccountError> {
        let snapshot = match fetch_snapshot(self.store.as_ref(), &self.caller, &self.identity).await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.notice = Some(Notice::LoadFailed);
                return Err(err);
            }
        };
        self.snapshot = snapshot;

        match self
            .store
            .list_profile_changes(&self.caller, &self.identity)
            .await
        {
            Ok(changes) => {
                self.changes = changes;
                Ok(())
            }
            Err(err) => {
                self.notice = Some(Notice::LoadFailed);
                Err(AccountError::Load(err))
            }
        }
    }

    /// Run one mutation cycle for `form`.
    ///
    /// # Errors
    /// - `AccountError::Validation` if the form is invalid; nothing is written.
    /// - `AccountError::PrimaryCommit` / `AccountError::Authorization` if the
    ///   profile update fails; the snapshot keeps its previous value.
    #[instrument(skip_all, fields(identity = %self.identity))]
    pub async fn submit(&mut self, form: &ProfileForm) -> Result<SubmitReport, AccountError> {
        self.phase = Phase::Diffing;
        let values = match form.normalize() {
            Ok(values) => values,
            Err(err) => {
                self.phase = Phase::Loaded;
                return Err(err.into());
            }
        };
        let diff = values.changes_from(&self.snapshot);
        let changed: Vec<ProfileField> = diff.iter().map(|change| change.field).collect();
        debug!(?changed, "profile diff computed");

        self.phase = Phase::Auditing;
        for change in diff {
            let record = NewProfileChange::self_service(&self.identity, change);
            AuditRecorder::best_effort(
                self.recorder
                    .record_profile_field_change(&self.caller, &record)
                    .await,
            );
        }

        self.phase = Phase::Committing;
        let update = values.into_update(Utc::now());
        if let Err(err) = self
            .store
            .update_profile(&self.caller, &self.identity, &update)
            .await
        {
            error!("Failed to update profile: {err}");
            self.phase = Phase::Loaded;
            self.notice = Some(Notice::SaveFailed);
            return Err(AccountError::from_commit(err));
        }

        self.phase = Phase::Reloading;
        let reloaded = match self.reload().await {
            Ok(()) => {
                self.notice = Some(Notice::Saved);
                true
            }
            Err(err) => {
                warn!("Profile saved but reload failed: {err}");
                self.notice = Some(Notice::SavedStale);
                false
            }
        };
        self.phase = Phase::Loaded;

        Ok(SubmitReport { changed, reloaded })
    }
}

async fn fetch_snapshot(
    store: &dyn RecordStore,
    caller: &Caller,
    identity: &Identity,
) -> Result<Profile, AccountError> {
    match store.fetch_profile(caller, identity).await {
        Ok(Some(profile)) => Ok(profile),
        Ok(None) => Err(AccountError::Load(StoreError::NotFound)),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            Err(AccountError::Load(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Faults, MemoryBackend};
    use anyhow::Result;

    fn form(first: &str, last: &str, phone: Option<&str>) -> ProfileForm {
        ProfileForm {
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone: phone.map(str::to_string),
        }
    }

    async fn coordinator() -> Result<(Arc<MemoryBackend>, ProfileCoordinator)> {
        let backend = Arc::new(MemoryBackend::new().with_journal());
        let id = backend.seed_account("U1", "ada@example.com", "pw", "Ada", "Lovelace", None)?;
        let coordinator = ProfileCoordinator::load(backend.clone(), id).await?;
        Ok((backend, coordinator))
    }

    #[tokio::test]
    async fn load_fills_snapshot() -> Result<()> {
        let (_, coordinator) = coordinator().await?;
        assert_eq!(coordinator.snapshot().first_name, "Ada");
        assert!(coordinator.changes().is_empty());
        assert_eq!(coordinator.phase(), Phase::Loaded);
        assert_eq!(coordinator.notice(), None);
        Ok(())
    }

    #[tokio::test]
    async fn load_missing_profile_fails() -> Result<()> {
        let backend: Arc<dyn RecordStore> = Arc::new(MemoryBackend::new());
        let result = ProfileCoordinator::load(backend, Identity::new("ghost")?).await;
        assert!(matches!(
            result,
            Err(AccountError::Load(StoreError::NotFound))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_form_writes_nothing() -> Result<()> {
        let (backend, mut coordinator) = coordinator().await?;
        backend.clear_journal();

        let result = coordinator.submit(&form("", "Lovelace", None)).await;
        assert!(matches!(result, Err(AccountError::Validation(_))));
        assert!(backend.journal().is_empty());
        assert_eq!(coordinator.phase(), Phase::Loaded);
        Ok(())
    }

    #[tokio::test]
    async fn save_updates_snapshot_and_history() -> Result<()> {
        let (_, mut coordinator) = coordinator().await?;
        let report = coordinator
            .submit(&form("Ada", "King", Some("555-0100")))
            .await?;

        assert_eq!(
            report.changed,
            vec![ProfileField::LastName, ProfileField::Phone]
        );
        assert!(report.reloaded);
        assert_eq!(coordinator.snapshot().last_name, "King");
        assert_eq!(coordinator.changes().len(), 2);
        assert_eq!(coordinator.notice(), Some(Notice::Saved));
        Ok(())
    }

    #[tokio::test]
    async fn reload_failure_after_commit_is_saved_stale() -> Result<()> {
        let (backend, mut coordinator) = coordinator().await?;
        backend.set_faults(Faults {
            reads: true,
            ..Faults::default()
        });

        let report = coordinator.submit(&form("Augusta", "Lovelace", None)).await?;
        assert!(!report.reloaded);
        assert_eq!(coordinator.notice(), Some(Notice::SavedStale));
        assert_eq!(coordinator.snapshot().first_name, "Ada");

        let stored = backend.profile(coordinator.identity());
        assert_eq!(stored.map(|p| p.first_name), Some("Augusta".to_string()));
        Ok(())
    }
}
