//! Read-only audit trail views for the signed-in identity, newest first.

use super::{error_response, require_session};
use crate::account::AccountService;
use crate::model::{LoginHistoryRecord, ProfileChangeRecord};
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginHistoryEntry {
    pub id: Uuid,
    pub subject_id: String,
    /// The subject is an identity resolved by the provider.
    pub verified: bool,
    pub attempted_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub client_descriptor: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

impl From<LoginHistoryRecord> for LoginHistoryEntry {
    fn from(record: LoginHistoryRecord) -> Self {
        Self {
            id: record.id,
            subject_id: record.subject.as_str().to_string(),
            verified: record.subject.is_verified(),
            attempted_at: record.attempted_at,
            ip_address: record.ip_address,
            client_descriptor: record.client_descriptor,
            success: record.success,
            failure_reason: record.failure_reason,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileChangeEntry {
    pub id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub actor_id: String,
}

impl From<ProfileChangeRecord> for ProfileChangeEntry {
    fn from(record: ProfileChangeRecord) -> Self {
        Self {
            id: record.id,
            field_name: record.field.as_str().to_string(),
            old_value: record.old_value,
            new_value: record.new_value,
            changed_at: record.changed_at,
            actor_id: record.actor.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/login-history",
    responses(
        (status = 200, description = "Login attempts of the signed-in identity", body = [LoginHistoryEntry]),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Failed to load account data", body = String)
    ),
    tag = "me"
)]
pub async fn login_history(
    headers: HeaderMap,
    service: Extension<AccountService>,
) -> impl IntoResponse {
    let session = match require_session(&headers, &service).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match service.login_history(&session.identity).await {
        Ok(records) => Json(
            records
                .into_iter()
                .map(LoginHistoryEntry::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/profile-changes",
    responses(
        (status = 200, description = "Profile changes of the signed-in identity", body = [ProfileChangeEntry]),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Failed to load account data", body = String)
    ),
    tag = "me"
)]
pub async fn profile_changes(
    headers: HeaderMap,
    service: Extension<AccountService>,
) -> impl IntoResponse {
    let session = match require_session(&headers, &service).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match service.profile_changes(&session.identity).await {
        Ok(records) => Json(
            records
                .into_iter()
                .map(ProfileChangeEntry::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => error_response(&err),
    }
}
