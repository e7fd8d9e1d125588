//! Sign-up, sign-in and sign-out endpoints.

use super::{client_descriptor, error_response, extract_bearer_token};
use crate::account::AccountService;
use crate::identity::{SessionContext, SignUpRequest};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct SignUpBody {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignUpResponse {
    pub id: String,
}

#[derive(ToSchema, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignUpBody,
    responses(
        (status = 201, description = "Identity registered", body = SignUpResponse),
        (status = 400, description = "Invalid input or rejected by the identity provider", body = String),
        (status = 502, description = "Identity provider unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn sign_up(
    service: Extension<AccountService>,
    Json(body): Json<SignUpBody>,
) -> impl IntoResponse {
    let request = SignUpRequest {
        email: body.email,
        password: SecretString::from(body.password),
        first_name: body.first_name,
        last_name: body.last_name,
        phone: body.phone_number,
    };

    match service.sign_up(request).await {
        Ok(identity) => (
            StatusCode::CREATED,
            Json(SignUpResponse {
                id: identity.to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginBody,
    responses(
        (status = 200, description = "Signed in; the attempt is recorded", body = LoginResponse),
        (status = 400, description = "Blank email or password", body = String),
        (status = 401, description = "Invalid login credentials; the attempt is recorded", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    service: Extension<AccountService>,
    Json(body): Json<LoginBody>,
) -> impl IntoResponse {
    let mut context = SessionContext::new();
    let password = SecretString::from(body.password);

    match service
        .sign_in(&mut context, &body.email, &password, client_descriptor(&headers))
        .await
    {
        Ok(session) => Json(LoginResponse {
            access_token: session.access_token.expose_secret().to_string(),
            token_type: "bearer".to_string(),
            user_id: session.identity.to_string(),
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "Missing bearer token")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, service: Extension<AccountService>) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let mut context = match service.resolve_session(&token).await {
        Ok(context) => context,
        Err(err) => return error_response(&err),
    };
    if context.identity().is_none() {
        debug!("logout with unknown token");
    }
    service.sign_out(&mut context).await;

    StatusCode::NO_CONTENT.into_response()
}
