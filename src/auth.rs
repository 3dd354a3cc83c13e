//! Login against the meeting backend.
//!
//! Admins have a single route. Regular users try the local user table first
//! and fall back to the directory (LDAP) route when that answers non-2xx.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, StoreError};
use crate::session::{Role, Session, UserProfile};
use crate::store::client::{join_segments, parse_base_url, send};

const DEFAULT_FAILURE: &str = "Invalid username or password";

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

pub struct AuthClient {
    client: reqwest::Client,
    base_url: Url,
}

impl AuthClient {
    pub fn new(api_url: &str, timeout: Option<Duration>) -> Result<Self, StoreError> {
        let base_url = parse_base_url(api_url)?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| StoreError::Transport {
            url: base_url.to_string(),
            source: e,
        })?;
        Ok(Self { client, base_url })
    }

    /// Authenticates and returns the session to install. Nothing is sent when
    /// either credential is blank.
    pub async fn login(
        &self,
        role: Role,
        username: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let creds = Credentials { username, password };

        let response = match role {
            Role::Admin => self.post(&["admin", "login"], &creds).await?,
            Role::User => match self.post(&["users", "login"], &creds).await {
                Ok(resp) => resp,
                Err(AuthError::InvalidCredentials(reason)) => {
                    log::info!(
                        "Auth: user login for {} rejected ({}), trying directory login",
                        username,
                        reason
                    );
                    self.post(&["ldap", "login"], &creds).await?
                }
                Err(e) => return Err(e),
            },
        };

        let resolved_name = response
            .user
            .as_ref()
            .map(|u| u.username.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(username)
            .to_string();

        log::info!("Auth: {} authenticated as {:?}", resolved_name, role);
        Ok(Session {
            username: resolved_name,
            role,
            token: response.token.filter(|t| !t.is_empty()),
            user: response.user,
        })
    }

    /// Non-2xx answers become `InvalidCredentials` with the backend's message;
    /// transport failures stay `Store` errors and do not trigger a fallback.
    async fn post(
        &self,
        segments: &[&str],
        creds: &Credentials<'_>,
    ) -> Result<LoginResponse, AuthError> {
        let url = join_segments(&self.base_url, segments);
        let rb = self.client.post(url.clone()).json(creds);

        let resp = match send(rb, &url).await {
            Ok(resp) => resp,
            Err(StoreError::Http { status, message, .. }) => {
                log::warn!("Auth: {} answered {}", url.path(), status);
                let message = if message.is_empty() || message == "Unauthorized" {
                    DEFAULT_FAILURE.to_string()
                } else {
                    message
                };
                return Err(AuthError::InvalidCredentials(message));
            }
            Err(e) => return Err(e.into()),
        };

        // Some backends answer 200 with an empty body.
        let text = resp.text().await.map_err(|e| StoreError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        if text.trim().is_empty() {
            return Ok(LoginResponse::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| AuthError::Store(StoreError::Decode(format!("{} from {}", e, url))))
    }
}
