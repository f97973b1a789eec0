//! Arduino IoT Cloud Authentication
//!
//! OAuth2 client-credentials flow. Tokens are cached and refreshed shortly
//! before they expire; a 401 from a data request invalidates the cache so
//! the next request fetches a fresh token.
//!
//! # Token Flow
//!
//! 1. `POST {api}/iot/v1/clients/token` with form fields `grant_type`,
//!    `client_id`, `client_secret` and `audience`
//! 2. Receive `{"access_token":"...","expires_in":300}`
//! 3. Send `Authorization: Bearer <token>` on every API call

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::{Client, StatusCode};

use super::messages::{ApiErrorBody, TokenRequest, TokenResponse};
use crate::application::ports::CloudError;
use crate::infrastructure::config::Credentials;

/// Lifetime assumed when the token response omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// Refresh this long before the reported expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Fetches and caches bearer tokens.
pub struct TokenManager {
    client: Client,
    token_url: String,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    /// Create a manager for `{api_url}/iot/v1/clients/token`.
    #[must_use]
    pub fn new(client: Client, api_url: &str, credentials: Credentials) -> Self {
        Self {
            client,
            token_url: format!("{api_url}/iot/v1/clients/token"),
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// A valid bearer token, fetching a new one if needed.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::Auth` if the credentials are rejected, or a
    /// request/decode error if the token endpoint cannot be reached.
    pub async fn bearer(&self) -> Result<String, CloudError> {
        let cached = self
            .cached
            .lock()
            .as_ref()
            .filter(|t| Instant::now() < t.refresh_at)
            .map(|t| t.value.clone());

        match cached {
            Some(token) => Ok(token),
            None => self.refresh().await,
        }
    }

    /// Drop the cached token.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    /// Fetch a new token unconditionally.
    ///
    /// # Errors
    ///
    /// Same as [`TokenManager::bearer`].
    pub async fn refresh(&self) -> Result<String, CloudError> {
        let form = TokenRequest::client_credentials(
            self.credentials.client_id(),
            self.credentials.client_secret(),
        );

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CloudError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(token_error(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CloudError::Decode(format!("token response: {e}")))?;

        if token.access_token.is_empty() {
            return Err(CloudError::Auth("token endpoint returned an empty token".into()));
        }

        let lifetime = token
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
        let refresh_at = Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN);

        tracing::debug!(expires_in_secs = lifetime.as_secs(), "Obtained Arduino API token");

        *self.cached.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });
        Ok(token.access_token)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("credentials", &self.credentials)
            .field("cached", &self.cached.lock().is_some())
            .finish_non_exhaustive()
    }
}

fn token_error(status: StatusCode, body: &str) -> CloudError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message().map(str::to_string))
        .unwrap_or_else(|| truncate(body));

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::BAD_REQUEST
    {
        CloudError::Auth(format!("{status}: {detail}"))
    } else {
        CloudError::Status {
            status: status.as_u16(),
            body: detail,
        }
    }
}

/// Shorten a response body for error messages.
pub(crate) fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
