//! Shelly Gen2 RPC Client
//!
//! Performs one logical request/response exchange per call over a persistent
//! [`Connection`], handling the digest-auth handshake transparently.
//!
//! # Request Cycle
//!
//! 1. Serialize the method's envelope, attaching a fresh credential if a
//!    challenge is held
//! 2. Send (with bounded reconnection) and wait for the matching reply
//! 3. On a first `401`, accept the embedded challenge and send once more
//! 4. Any other reply, error-coded or not, is returned as-is
//!
//! A missing reply (send, receive or timeout failure) is an `Err`. An error
//! reply from the device is an `Ok` whose payload carries the `error` object.

use crate::error::{ExporterError, Result};
use crate::shelly::auth::{AuthCredential, AuthState};
use crate::shelly::connection::{Connection, Transport};
use crate::shelly::types::{AuthChallenge, RequestEnvelope, RpcReply, AUTH_REQUIRED_CODE};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Client identifier sent as `src` so the device routes replies back to us
pub const DEFAULT_CLIENT_ID: &str = "shelly-exporter";

/// Retries granted after an authentication challenge
const AUTH_RETRIES: u32 = 1;

/// One method invocation the poller drives each refresh
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Anything able to answer a [`MethodCall`] for a device.
///
/// `Err` means no response was obtained at all.
#[async_trait]
pub trait RequestSource: Send {
    async fn request(&mut self, call: &MethodCall) -> Result<RpcReply>;
}

/// Authenticated JSON-RPC client for one device
pub struct RpcClient<T: Transport> {
    device: String,
    connection: Connection<T>,
    password: Option<SecretString>,
    timeout: Duration,
    src: Option<String>,
    envelopes: HashMap<String, RequestEnvelope>,
    auth: AuthState,
    credential: Option<Arc<AuthCredential>>,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(
        device: impl Into<String>,
        transport: T,
        password: Option<SecretString>,
        timeout: Duration,
    ) -> Self {
        Self {
            device: device.into(),
            connection: Connection::new(transport),
            password,
            timeout,
            src: Some(DEFAULT_CLIENT_ID.to_string()),
            envelopes: HashMap::new(),
            auth: AuthState::default(),
            credential: None,
        }
    }

    /// The credential most recently attached to a request
    pub fn current_credential(&self) -> Option<Arc<AuthCredential>> {
        self.credential.clone()
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth
    }

    /// Envelope for `method`, created on first use and reused afterwards
    fn take_envelope(&mut self, method: &str, params: Value) -> RequestEnvelope {
        match self.envelopes.remove(method) {
            Some(mut envelope) => {
                envelope.params = params;
                envelope
            }
            None => RequestEnvelope::new(self.envelopes.len() as u64, method, params)
                .with_src(self.src.clone()),
        }
    }

    /// Run one request cycle for `method`.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<RpcReply> {
        let mut envelope = self.take_envelope(method, params);
        let outcome = self.run_cycle(&mut envelope).await;
        self.envelopes.insert(method.to_string(), envelope);
        outcome
    }

    async fn run_cycle(&mut self, envelope: &mut RequestEnvelope) -> Result<RpcReply> {
        let mut attempt = 0;

        loop {
            let credential = self.auth.next_credential();
            envelope.auth = credential.as_deref().cloned();
            if credential.is_some() {
                self.credential = credential;
            }

            let frame = envelope.to_json()?;
            debug!("{}: sending {} (id {})", self.device, envelope.method, envelope.id);
            let reply = self.exchange(envelope.id, &frame).await?;

            let Some(rpc_error) = reply.error() else {
                if reply.is_success() {
                    self.auth.confirm();
                }
                return Ok(reply);
            };

            if attempt >= AUTH_RETRIES || rpc_error.code != AUTH_REQUIRED_CODE {
                debug!(
                    "{}: {} returned error {}: {}",
                    self.device, envelope.method, rpc_error.code, rpc_error.message
                );
                return Ok(reply);
            }

            let Some(password) = &self.password else {
                error!(
                    "{}: device requires authentication but no password is configured",
                    self.device
                );
                return Ok(reply);
            };

            match AuthChallenge::from_error(&rpc_error) {
                Ok(challenge) => {
                    info!(
                        "{}: received auth challenge for realm {}",
                        self.device, challenge.realm
                    );
                    self.auth.challenge(password, challenge);
                }
                Err(e) => {
                    warn!("{}: {}", self.device, e);
                    return Ok(reply);
                }
            }

            attempt += 1;
        }
    }

    /// Send one frame and wait for its reply, bounded by the request timeout.
    async fn exchange(&mut self, id: u64, frame: &str) -> Result<RpcReply> {
        let timeout = self.timeout;
        let outcome = tokio::time::timeout(timeout, self.send_and_receive(id, frame)).await;
        match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                // A late reply must not be read as the answer to the next request
                self.connection.reset().await;
                Err(ExporterError::Timeout(timeout))
            }
        }
    }

    async fn send_and_receive(&mut self, id: u64, frame: &str) -> Result<RpcReply> {
        self.connection.send(frame).await?;

        loop {
            let text = self.connection.receive().await?;
            let reply = RpcReply::parse(&text);
            if is_unrelated(&reply, id) {
                debug!("{}: skipping unrelated frame", self.device);
                continue;
            }
            return Ok(reply);
        }
    }
}

/// Notifications and replies to other request ids
fn is_unrelated(reply: &RpcReply, id: u64) -> bool {
    match reply {
        // A null id answers a frame the device could not parse
        RpcReply::Json(value) => match value.get("id") {
            Some(Value::Null) | None => value.get("method").is_some(),
            Some(reply_id) => reply_id.as_u64() != Some(id),
        },
        RpcReply::Raw(_) => false,
    }
}

#[async_trait]
impl<T: Transport> RequestSource for RpcClient<T> {
    async fn request(&mut self, call: &MethodCall) -> Result<RpcReply> {
        self.call(&call.method, call.params.clone()).await
    }
}
