//! Gen1 HTTP Status Client
//!
//! Older devices expose their readings as one JSON document at a fixed path
//! (`GET /status`), optionally behind HTTP Basic credentials. There is no
//! challenge-response handshake: a `401` is terminal.
//!
//! Replies are shaped like RPC replies so one poller serves both transports:
//!
//! - 2xx with JSON body → `{"result": <body>}`
//! - 2xx with other body → [`RpcReply::Raw`]
//! - non-2xx → `{"error": {"code": <status>, "message": <body>}}`

use crate::error::{ExporterError, Result};
use crate::shelly::client::{MethodCall, RequestSource};
use crate::shelly::types::RpcReply;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Status path polled on Gen1 devices
pub const STATUS_PATH: &str = "/status";

/// Normalize a Gen1 base URL: default to `http://` and drop trailing slashes.
pub fn normalize_base_url(url: &str) -> Result<String> {
    let url = url.trim().trim_end_matches('/');
    if url.contains(['?', '#']) {
        return Err(ExporterError::Config(format!(
            "Query or fragment not supported in device URL: {}",
            url
        )));
    }
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("http".to_string(), url),
    };

    if scheme != "http" && scheme != "https" {
        return Err(ExporterError::Config(format!(
            "Unsupported URL scheme '{}' for HTTP device: {}",
            scheme, url
        )));
    }
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ExporterError::Config(format!("Missing host in URL: {}", url)));
    }

    Ok(format!("{}://{}", scheme, rest))
}

pub struct HttpStatusClient {
    device: String,
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: Option<SecretString>,
    timeout: Duration,
}

impl HttpStatusClient {
    /// `client` is shared and owned by the caller.
    pub fn new(
        device: impl Into<String>,
        client: reqwest::Client,
        base_url: &str,
        username: impl Into<String>,
        password: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            device: device.into(),
            client,
            base_url: normalize_base_url(base_url)?,
            username: username.into(),
            password,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RequestSource for HttpStatusClient {
    async fn request(&mut self, call: &MethodCall) -> Result<RpcReply> {
        let url = format!("{}{}", self.base_url, call.method);
        debug!("{}: GET {}", self.device, url);

        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(password) = &self.password {
            request = request.basic_auth(&self.username, Some(password.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!("{}: {} returned HTTP {}", self.device, url, status);
            return Ok(RpcReply::Json(json!({
                "error": { "code": status.as_u16(), "message": body }
            })));
        }

        Ok(match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => RpcReply::Json(json!({ "result": value })),
            Err(_) => RpcReply::Raw(body),
        })
    }
}
