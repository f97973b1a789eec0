//! Arduino IoT Cloud API Messages
//!
//! Request and response bodies for the two endpoints the relay uses:
//!
//! - `POST /iot/v1/clients/token` (OAuth2 client credentials)
//! - `GET /iot/v2/things/{id}/properties`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audience requested for every token.
pub const TOKEN_AUDIENCE: &str = "https://api2.arduino.cc/iot";

// =============================================================================
// Token Exchange
// =============================================================================

/// Client-credentials token request, sent form-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    /// Always `client_credentials`.
    pub grant_type: &'static str,
    /// API client id.
    pub client_id: &'a str,
    /// API client secret.
    pub client_secret: &'a str,
    /// Always [`TOKEN_AUDIENCE`].
    pub audience: &'static str,
}

impl<'a> TokenRequest<'a> {
    /// Build a request for the given credentials.
    #[must_use]
    pub const fn client_credentials(client_id: &'a str, client_secret: &'a str) -> Self {
        Self {
            grant_type: "client_credentials",
            client_id,
            client_secret,
            audience: TOKEN_AUDIENCE,
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

// =============================================================================
// Thing Properties
// =============================================================================

/// One variable of a thing, as listed by the properties endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ThingProperty {
    /// Property id.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Name of the variable in the device sketch.
    #[serde(default)]
    pub variable_name: Option<String>,
    /// Last reported value, any JSON type.
    #[serde(default)]
    pub last_value: Option<serde_json::Value>,
    /// When `last_value` was reported.
    #[serde(default)]
    pub value_updated_at: Option<DateTime<Utc>>,
}

impl ThingProperty {
    /// Variable name used to match monitored properties.
    #[must_use]
    pub fn key(&self) -> &str {
        self.variable_name
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.name)
    }

    /// Numeric last value. Booleans map to 0 and 1.
    #[must_use]
    pub fn numeric_value(&self) -> Option<f64> {
        match self.last_value.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Error body returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Error detail.
    #[serde(default)]
    pub detail: Option<String>,
    /// OAuth error code.
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    /// Best human-readable message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.detail.as_deref().or(self.error.as_deref())
    }
}
