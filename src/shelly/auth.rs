//! Digest Authentication
//!
//! Challenge-response credentials for Gen2 devices. The device answers an
//! unauthenticated request with a 401 carrying `realm`, `nonce` and `nc`;
//! the client proves knowledge of the password by hashing it with the
//! challenge and its own counter (`cnonce`).
//!
//! ```text
//! ha1      = sha256("admin:" + realm + ":" + password)
//! ha2      = sha256("dummy_method:dummy_uri")
//! response = sha256(ha1 + ":" + nonce + ":" + nc + ":" + cnonce + ":auth:" + ha2)
//! ```
//!
//! The device does not check the method/URI binding, so `ha2` is a constant.

use crate::shelly::types::AuthChallenge;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const AUTH_USERNAME: &str = "admin";
pub const AUTH_ALGORITHM: &str = "SHA-256";
const HA2_SOURCE: &str = "dummy_method:dummy_uri";

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Credential block attached to a request envelope
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthCredential {
    pub realm: String,
    pub username: String,
    pub nonce: u64,
    pub cnonce: u64,
    #[serde(skip_serializing)]
    pub nc: u64,
    pub response: String,
    pub algorithm: String,
}

/// Produces credentials for one accepted challenge
#[derive(Debug, Clone)]
pub struct DigestAuthenticator {
    challenge: AuthChallenge,
    ha1: String,
    ha2: String,
    cnonce: u64,
}

impl DigestAuthenticator {
    pub fn new(password: &SecretString, challenge: AuthChallenge) -> Self {
        let ha1 = sha256_hex(&format!(
            "{}:{}:{}",
            AUTH_USERNAME,
            challenge.realm,
            password.expose_secret()
        ));

        Self {
            challenge,
            ha1,
            ha2: sha256_hex(HA2_SOURCE),
            cnonce: 0,
        }
    }

    pub fn cnonce(&self) -> u64 {
        self.cnonce
    }

    /// Advance `cnonce` and sign a fresh credential with it.
    pub fn next_credential(&mut self) -> AuthCredential {
        self.cnonce += 1;

        let response = sha256_hex(&format!(
            "{}:{}:{}:{}:auth:{}",
            self.ha1, self.challenge.nonce, self.challenge.nc, self.cnonce, self.ha2
        ));

        AuthCredential {
            realm: self.challenge.realm.clone(),
            username: AUTH_USERNAME.to_string(),
            nonce: self.challenge.nonce,
            cnonce: self.cnonce,
            nc: self.challenge.nc,
            response,
            algorithm: AUTH_ALGORITHM.to_string(),
        }
    }
}

/// Authentication progress of one device connection
#[derive(Debug, Default)]
pub enum AuthState {
    /// No challenge seen yet; requests go out without credentials
    #[default]
    NoAuth,
    /// A challenge was accepted but no request has succeeded with it yet
    Challenged(DigestAuthenticator),
    /// The device accepted credentials derived from the current challenge
    Authenticated(DigestAuthenticator),
}

impl AuthState {
    /// Replace whatever came before with a freshly accepted challenge.
    pub fn challenge(&mut self, password: &SecretString, challenge: AuthChallenge) {
        *self = AuthState::Challenged(DigestAuthenticator::new(password, challenge));
    }

    /// Record that the device accepted the current credentials.
    pub fn confirm(&mut self) {
        if let AuthState::Challenged(_) = self {
            if let AuthState::Challenged(authenticator) = std::mem::take(self) {
                *self = AuthState::Authenticated(authenticator);
            }
        }
    }

    /// Credential for the next outgoing request, if a challenge is held
    pub fn next_credential(&mut self) -> Option<Arc<AuthCredential>> {
        match self {
            AuthState::NoAuth => None,
            AuthState::Challenged(authenticator) | AuthState::Authenticated(authenticator) => {
                Some(Arc::new(authenticator.next_credential()))
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}
