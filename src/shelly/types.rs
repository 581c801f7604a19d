//! Shelly RPC Wire Types
//!
//! Request envelopes and response helpers for the Gen2 JSON-RPC protocol.
//!
//! # Request
//!
//! ```text
//! { "id": 0, "src": "shelly-exporter", "method": "Switch.GetStatus", "params": {"id": 0}, "auth": {...} }
//! ```
//!
//! # Responses
//!
//! - [`RpcReply::Json`] - Any well-formed JSON reply, including error replies
//! - [`RpcReply::Raw`] - Text that failed to parse; handed to the caller as-is
//!
//! An authentication challenge arrives as an error with code 401 whose
//! `message` is itself a JSON document (see [`AuthChallenge`]).

use crate::error::{ExporterError, Result};
use crate::shelly::auth::AuthCredential;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error code the device uses to request (or re-request) digest credentials
pub const AUTH_REQUIRED_CODE: i64 = 401;

/// One outgoing RPC request, reused for every call of the same method
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestEnvelope {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    pub method: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthCredential>,
}

impl RequestEnvelope {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            src: None,
            method: method.into(),
            params,
            auth: None,
        }
    }

    pub fn with_src(mut self, src: Option<String>) -> Self {
        self.src = src;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error object carried in an RPC response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A reply received for one request
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    Json(Value),
    Raw(String),
}

impl RpcReply {
    /// Parse a frame, keeping the raw text if it is not JSON
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => RpcReply::Json(value),
            Err(_) => RpcReply::Raw(text.to_string()),
        }
    }

    pub fn error(&self) -> Option<RpcError> {
        match self {
            RpcReply::Json(value) => value
                .get("error")
                .and_then(|error| RpcError::deserialize(error).ok()),
            RpcReply::Raw(_) => None,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            RpcReply::Json(value) => value.get("result"),
            RpcReply::Raw(_) => None,
        }
    }

    /// A reply counts as successful when it is JSON without an error object.
    pub fn is_success(&self) -> bool {
        matches!(self, RpcReply::Json(value) if value.get("error").is_none())
    }
}

/// Challenge issued inside a 401 error message
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: u64,
    #[serde(default = "default_nc")]
    pub nc: u64,
}

fn default_nc() -> u64 {
    1
}

impl AuthChallenge {
    /// Decode the JSON document embedded in a 401 error message.
    pub fn from_error(error: &RpcError) -> Result<Self> {
        serde_json::from_str(&error.message).map_err(|e| {
            ExporterError::Auth(format!("Malformed auth challenge ({}): {}", e, error.message))
        })
    }
}
