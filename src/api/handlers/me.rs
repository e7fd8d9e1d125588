//! Profile view and edit for the signed-in identity.

use super::{error_response, require_session};
use crate::account::AccountService;
use crate::coordinator::{Notice, ProfileCoordinator};
use crate::model::{Profile, ProfileForm};
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProfileResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Profile> for ProfileResponse {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id.to_string(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            phone_number: profile.phone.clone(),
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

#[derive(ToSchema, Deserialize)]
pub struct ProfileUpdateBody {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileSaveResponse {
    /// Profile after the save, or the pre-save snapshot when `stale`.
    pub profile: ProfileResponse,
    /// Fields that differed from the stored profile, in audit order.
    pub changed: Vec<String>,
    /// The save committed but the follow-up reload failed.
    pub stale: bool,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Profile of the signed-in identity", body = ProfileResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Failed to load account data", body = String)
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, service: Extension<AccountService>) -> impl IntoResponse {
    let session = match require_session(&headers, &service).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match ProfileCoordinator::load(service.store(), session.identity).await {
        Ok(coordinator) => Json(ProfileResponse::from(coordinator.snapshot())).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    request_body = ProfileUpdateBody,
    responses(
        (status = 200, description = "Profile saved", body = ProfileSaveResponse),
        (status = 400, description = "Invalid profile values", body = String),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Update refused by the record store", body = String),
        (status = 500, description = "Failed to save profile", body = String)
    ),
    tag = "me"
)]
pub async fn patch_me(
    headers: HeaderMap,
    service: Extension<AccountService>,
    Json(body): Json<ProfileUpdateBody>,
) -> impl IntoResponse {
    let session = match require_session(&headers, &service).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let mut coordinator = match ProfileCoordinator::load(service.store(), session.identity).await
    {
        Ok(coordinator) => coordinator,
        Err(err) => return error_response(&err),
    };

    let form = ProfileForm {
        first_name: body.first_name,
        last_name: body.last_name,
        phone: body.phone_number,
    };

    match coordinator.submit(&form).await {
        Ok(report) => {
            info!(identity = %coordinator.identity(), changed = report.changed.len(), "profile saved");
            Json(ProfileSaveResponse {
                profile: ProfileResponse::from(coordinator.snapshot()),
                changed: report
                    .changed
                    .iter()
                    .map(|field| field.as_str().to_string())
                    .collect(),
                stale: coordinator.notice() == Some(Notice::SavedStale),
            })
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}
