//! HTTP client for a GoTrue-compatible auth API (the Supabase auth service).
//!
//! Endpoints are resolved relative to the configured base URL, for example
//! `https://<project>.supabase.co/auth/v1/`. Every request carries the project
//! API key in the `apikey` header.

use super::{AuthError, IdentityProvider, Session, SignUpRequest};
use crate::{APP_USER_AGENT, model::Identity};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

#[derive(Clone)]
pub struct GoTrueProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for GoTrueProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoTrueProvider")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"***")
            .finish()
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: ProfileAttributes<'a>,
}

#[derive(Serialize)]
struct ProfileAttributes<'a> {
    first_name: &'a str,
    last_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
}

#[derive(Deserialize)]
struct UserBody {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenBody {
    access_token: String,
    user: UserBody,
}

impl GoTrueProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, api_key: SecretString) -> Result<Self, AuthError> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path)
            .map_err(|e| AuthError::UnexpectedResponse(format!("invalid endpoint {path}: {e}")))
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", self.api_key.expose_secret())
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    #[instrument(skip_all, fields(email = %request.email))]
    async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity, AuthError> {
        let body = SignUpBody {
            email: &request.email,
            password: request.password.expose_secret(),
            data: ProfileAttributes {
                first_name: &request.first_name,
                last_name: &request.last_name,
                phone_number: request.phone.as_deref(),
            },
        };
        let response = self
            .request(self.client.post(self.endpoint("signup")?))
            .json(&body)
            .send()
            .await?;
        let json: Value = success_json(response).await?;

        // Depending on confirmation settings the user is returned bare or
        // nested next to a session.
        let id = json
            .get("user")
            .and_then(|user| user.get("id"))
            .or_else(|| json.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::UnexpectedResponse("sign-up response without id".into()))?;

        identity(id.to_string())
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, AuthError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .request(self.client.post(url))
            .json(&Credentials {
                email,
                password: password.expose_secret(),
            })
            .send()
            .await?;
        let token: TokenBody = serde_json::from_value(success_json(response).await?)
            .map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?;

        debug!("sign-in accepted");

        Ok(Session {
            identity: identity(token.user.id)?,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: SecretString::from(token.access_token),
        })
    }

    #[instrument(skip_all, fields(identity = %session.identity))]
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        let response = self
            .request(self.client.post(self.endpoint("logout")?))
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    #[instrument(skip_all)]
    async fn session(&self, access_token: &str) -> Result<Option<Session>, AuthError> {
        let response = self
            .request(self.client.get(self.endpoint("user")?))
            .bearer_auth(access_token)
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }
        let user: UserBody = serde_json::from_value(success_json(response).await?)
            .map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?;

        Ok(Some(Session {
            identity: identity(user.id)?,
            email: user.email.unwrap_or_default(),
            access_token: SecretString::from(access_token.to_string()),
        }))
    }
}

fn identity(id: String) -> Result<Identity, AuthError> {
    Identity::new(id).map_err(|e| AuthError::UnexpectedResponse(e.to_string()))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

async fn success_json(response: Response) -> Result<Value, AuthError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(rejection(response).await)
    }
}

async fn rejection(response: Response) -> AuthError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    AuthError::Rejected {
        message: error_message(&body).unwrap_or_else(|| format!("request failed ({status})")),
    }
}

/// Pull the human readable message out of an auth API error body.
fn error_message(body: &Value) -> Option<String> {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}
