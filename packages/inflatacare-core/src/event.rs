//! Push Channel Events
//!
//! Server-to-client frames carried over the dashboard WebSocket. Each frame
//! is a JSON object with an `event` name and a `data` payload:
//!
//! - `all-properties`: full snapshot, sent once when a session opens
//! - `property-update`: a single property, sent for every cloud update
//!
//! No client-to-server frames are defined.

use serde::{Deserialize, Serialize};

use crate::property::{PropertyName, PropertySnapshot, PropertyValue};

/// A single property change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    /// Property that changed.
    pub property: PropertyName,
    /// Reported value.
    pub value: PropertyValue,
}

/// A frame pushed from the relay to a dashboard client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PushEvent {
    /// Complete set of known values.
    AllProperties(PropertySnapshot),
    /// One property update.
    PropertyUpdate(PropertyUpdate),
}

impl PushEvent {
    /// Build a single-property update frame.
    #[must_use]
    pub const fn update(property: PropertyName, value: PropertyValue) -> Self {
        Self::PropertyUpdate(PropertyUpdate { property, value })
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AllProperties(_) => "all-properties",
            Self::PropertyUpdate(_) => "property-update",
        }
    }
}

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was not a JSON object.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// JSON codec for push-channel frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushCodec;

impl PushCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode an event as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, event: &PushEvent) -> Result<String, CodecError> {
        Ok(serde_json::to_string(event)?)
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object, names an unknown
    /// event, or a `property-update` names an unknown property.
    pub fn decode(&self, text: &str) -> Result<PushEvent, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFrame(format!(
                "expected JSON object, got: {}",
                trimmed.chars().take(50).collect::<String>()
            )));
        }
        Ok(serde_json::from_str(trimmed)?)
    }
}
