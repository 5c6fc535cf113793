//! Server response types.
//!
//! All backend REST responses follow a common envelope format with status,
//! message, and optional data/error fields.

use serde::{Deserialize, Serialize};

/// Standard server response envelope.
///
/// Every REST response from the PrayLock backend follows this format:
/// ```json
/// { "status": 200, "message": "Success!", "data": { ... } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse<T = serde_json::Value> {
    /// HTTP-like status code from the server.
    pub status: u16,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Response payload data (type varies by endpoint).
    pub data: Option<T>,
    /// Error details (present only on error responses).
    pub error: Option<ServerErrorDetail>,
}

/// Server error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerErrorDetail {
    /// Error type identifier.
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Error message.
    pub message: Option<String>,
}

impl<T> ServerResponse<T> {
    /// Whether the response indicates success (status 200).
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Get the error message if this is an error response.
    pub fn error_message(&self) -> Option<String> {
        if self.is_success() {
            None
        } else {
            self.error
                .as_ref()
                .and_then(|e| e.message.clone())
                .or_else(|| Some(self.message.clone()))
        }
    }
}
