//! PostgreSQL record store.
//!
//! Each call runs in its own transaction that first sets `app.caller_id`
//! (transaction-local). The row level security policies in `sql/schema.sql`
//! compare row subjects against that setting, so scoping holds even for
//! statements that forget a `WHERE` clause. Client addresses on login history
//! come from `inet_client_addr()` as a column default.

use super::{Caller, RecordStore, StoreError};
use crate::model::{
    Identity, LoginHistoryRecord, LoginSubject, NewLoginAttempt, NewProfileChange, Profile,
    ProfileChangeRecord, ProfileField, ProfileUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgPool, Postgres, Transaction};
use tracing::{Instrument, Span};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    first_name: String,
    last_name: String,
    phone_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LoginHistoryRow {
    id: Uuid,
    subject_id: String,
    attempted_at: DateTime<Utc>,
    ip_address: Option<String>,
    client_descriptor: Option<String>,
    success: bool,
    failure_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ProfileChangeRow {
    id: Uuid,
    subject_id: String,
    actor_id: String,
    field_name: String,
    old_value: Option<String>,
    new_value: Option<String>,
    changed_at: DateTime<Utc>,
}

fn query_span(operation: &str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn decode<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

impl TryFrom<ProfileRow> for Profile {
    type Error = sqlx::Error;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Identity::new(row.id).map_err(decode)?,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone_number,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<LoginHistoryRow> for LoginHistoryRecord {
    fn from(row: LoginHistoryRow) -> Self {
        Self {
            id: row.id,
            subject: LoginSubject::from_row(row.subject_id, row.success),
            attempted_at: row.attempted_at,
            ip_address: row.ip_address,
            client_descriptor: row.client_descriptor,
            success: row.success,
            failure_reason: row.failure_reason,
        }
    }
}

impl TryFrom<ProfileChangeRow> for ProfileChangeRecord {
    type Error = sqlx::Error;

    fn try_from(row: ProfileChangeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            subject: Identity::new(row.subject_id).map_err(decode)?,
            field: row.field_name.parse::<ProfileField>().map_err(decode)?,
            old_value: row.old_value,
            new_value: row.new_value,
            changed_at: row.changed_at,
            actor: Identity::new(row.actor_id).map_err(decode)?,
        })
    }
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a transaction bound to `caller` for the row level policies.
    async fn scoped(&self, caller: &Caller) -> Result<Transaction<'_, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('app.caller_id', $1, true)")
            .bind(caller.identity().map_or("", Identity::as_str))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch_profile(
        &self,
        caller: &Caller,
        id: &Identity,
    ) -> Result<Option<Profile>, StoreError> {
        if !caller.owns(id.as_str()) {
            return Err(StoreError::Forbidden);
        }

        let query = r"
            SELECT id, first_name, last_name, phone_number, created_at, updated_at
            FROM profiles
            WHERE id = $1
        ";
        let mut tx = self.scoped(caller).await?;
        let row = sqlx::query_as::<_, ProfileRow>(query)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", query))
            .await?;
        tx.commit().await?;

        Ok(row.map(Profile::try_from).transpose()?)
    }

    async fn update_profile(
        &self,
        caller: &Caller,
        id: &Identity,
        update: &ProfileUpdate,
    ) -> Result<(), StoreError> {
        if !caller.owns(id.as_str()) {
            return Err(StoreError::Forbidden);
        }

        let query = r"
            UPDATE profiles
            SET first_name = $1, last_name = $2, phone_number = $3, updated_at = $4
            WHERE id = $5
        ";
        let mut tx = self.scoped(caller).await?;
        let result = sqlx::query(query)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(update.phone.as_deref())
            .bind(update.updated_at)
            .bind(id.as_str())
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await?;

        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_login_attempt(
        &self,
        caller: &Caller,
        attempt: &NewLoginAttempt,
    ) -> Result<(), StoreError> {
        if !caller.may_record(attempt) {
            return Err(StoreError::Forbidden);
        }

        let query = r"
            INSERT INTO login_history (subject_id, client_descriptor, success, failure_reason)
            VALUES ($1, $2, $3, $4)
        ";
        let mut tx = self.scoped(caller).await?;
        sqlx::query(query)
            .bind(attempt.subject().as_str())
            .bind(attempt.client_descriptor())
            .bind(attempt.success())
            .bind(attempt.failure_reason())
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_profile_change(
        &self,
        caller: &Caller,
        change: &NewProfileChange,
    ) -> Result<(), StoreError> {
        if !caller.owns(change.subject.as_str()) {
            return Err(StoreError::Forbidden);
        }

        let query = r"
            INSERT INTO profile_changes (subject_id, actor_id, field_name, old_value, new_value)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let mut tx = self.scoped(caller).await?;
        sqlx::query(query)
            .bind(change.subject.as_str())
            .bind(change.actor.as_str())
            .bind(change.field.as_str())
            .bind(change.old_value.as_deref())
            .bind(change.new_value.as_deref())
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_login_history(
        &self,
        caller: &Caller,
        subject: &Identity,
    ) -> Result<Vec<LoginHistoryRecord>, StoreError> {
        if !caller.owns(subject.as_str()) {
            return Err(StoreError::Forbidden);
        }

        let query = r"
            SELECT
                id,
                subject_id,
                attempted_at,
                host(ip_address) AS ip_address,
                client_descriptor,
                success,
                failure_reason
            FROM login_history
            WHERE subject_id = $1
            ORDER BY attempted_at DESC
        ";
        let mut tx = self.scoped(caller).await?;
        let rows = sqlx::query_as::<_, LoginHistoryRow>(query)
            .bind(subject.as_str())
            .fetch_all(&mut *tx)
            .instrument(query_span("SELECT", query))
            .await?;
        tx.commit().await?;

        Ok(rows.into_iter().map(LoginHistoryRecord::from).collect())
    }

    async fn list_profile_changes(
        &self,
        caller: &Caller,
        subject: &Identity,
    ) -> Result<Vec<ProfileChangeRecord>, StoreError> {
        if !caller.owns(subject.as_str()) {
            return Err(StoreError::Forbidden);
        }

        let query = r"
            SELECT id, subject_id, actor_id, field_name, old_value, new_value, changed_at
            FROM profile_changes
            WHERE subject_id = $1
            ORDER BY changed_at DESC
        ";
        let mut tx = self.scoped(caller).await?;
        let rows = sqlx::query_as::<_, ProfileChangeRow>(query)
            .bind(subject.as_str())
            .fetch_all(&mut *tx)
            .instrument(query_span("SELECT", query))
            .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|row| ProfileChangeRecord::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(tracing::info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await?;
        conn.ping()
            .instrument(tracing::info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

    fn lazy_store() -> Result<PgStore> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/acctrail")?;
        Ok(PgStore::new(pool))
    }

    #[tokio::test]
    async fn foreign_profile_is_refused_before_query() -> Result<()> {
        let store = lazy_store()?;
        let caller = Caller::from(Identity::new("U1")?);
        let result = store.fetch_profile(&caller, &Identity::new("U2")?).await;
        assert!(matches!(result, Err(StoreError::Forbidden)));
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_success_is_refused_before_query() -> Result<()> {
        let store = lazy_store()?;
        let attempt = NewLoginAttempt::succeeded(Identity::new("U1")?, None);
        let result = store
            .insert_login_attempt(&Caller::Anonymous, &attempt)
            .await;
        assert!(matches!(result, Err(StoreError::Forbidden)));
        Ok(())
    }

    /// Statements of `SCHEMA_SQL` with comments stripped and whitespace collapsed.
    fn schema_statements() -> Vec<String> {
        let without_comments: String = SCHEMA_SQL
            .lines()
            .map(|line| line.split("--").next().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ");
        without_comments
            .split(';')
            .map(|stmt| stmt.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|stmt| !stmt.is_empty())
            .collect()
    }

    #[test]
    fn signup_hook_can_insert_profiles_under_forced_rls() {
        let statements = schema_statements();
        let has = |needle: &str| statements.iter().any(|stmt| stmt.contains(needle));

        assert!(has("ALTER TABLE profiles FORCE ROW LEVEL SECURITY"));
        assert!(has("LANGUAGE sql SECURITY DEFINER"));
        assert!(has(
            "ALTER FUNCTION create_profile_for_identity(text, text, text, text) OWNER TO acctrail_signup_hook"
        ));
        assert!(has("GRANT INSERT ON profiles TO acctrail_signup_hook"));

        let insert_policies: Vec<&String> = statements
            .iter()
            .filter(|stmt| {
                stmt.starts_with("CREATE POLICY")
                    && stmt.contains(" ON profiles ")
                    && stmt.contains("FOR INSERT")
            })
            .collect();
        assert_eq!(insert_policies.len(), 1);
        assert!(insert_policies[0].contains("FOR INSERT TO acctrail_signup_hook WITH CHECK (true)"));
    }

    #[test]
    fn change_row_with_unknown_field_fails_to_decode() {
        let row = ProfileChangeRow {
            id: Uuid::new_v4(),
            subject_id: "U1".to_string(),
            actor_id: "U1".to_string(),
            field_name: "email".to_string(),
            old_value: None,
            new_value: None,
            changed_at: Utc::now(),
        };
        assert!(matches!(
            ProfileChangeRecord::try_from(row),
            Err(sqlx::Error::Decode(_))
        ));
    }
}
