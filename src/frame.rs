//! Frame — the JSON event envelope carried over the chat websocket.
//!
//! ARCHITECTURE
//! ============
//! Every websocket text message is one Frame: `{"event": "...", "data": ...}`.
//! The websocket handler routes on the `event` prefix (`"chat:"`) and hands
//! `data` to the matching service. Outbound broadcasts use the same shape so
//! clients only ever parse one envelope.
//!
//! DESIGN
//! ======
//! - `data` is an arbitrary JSON value: inbound chat carries a bare string,
//!   outbound chat carries an object.
//! - Frames carry no correlation ids; chat is fire-and-forget and the sender
//!   learns of success by receiving its own broadcast.

use serde::{Deserialize, Serialize};

// =============================================================================
// EVENT NAMES
// =============================================================================

/// Chat message event, used in both directions.
pub const EVENT_CHAT_MESSAGE: &str = "chat:message";

// =============================================================================
// TYPES
// =============================================================================

/// The universal websocket envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code attached to structured log lines.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<serde_json::Value>) -> Self {
        Self { event: event.into(), data: data.into() }
    }

    /// Build a frame whose payload is any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `payload` cannot be represented as JSON.
    pub fn with_payload<T: Serialize>(event: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event, serde_json::to_value(payload)?))
    }
}

// =============================================================================
// ROUTING
// =============================================================================

impl Frame {
    /// Extract the event prefix (everything before the first ':').
    #[must_use]
    pub fn prefix(&self) -> &str {
        let Some((prefix, _)) = self.event.split_once(':') else {
            return &self.event;
        };
        prefix
    }

    /// Coerce `data` to the text a client meant to send.
    ///
    /// Strings pass through, scalars are stringified, and `null`, arrays, or
    /// objects become the empty string (which chat validation then rejects).
    #[must_use]
    pub fn text_payload(&self) -> String {
        match &self.data {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => String::new(),
        }
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
