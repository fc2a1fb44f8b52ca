//! Kiosk Token Check
//!
//! Both kiosks share one password. The server keeps only its SHA-256 digest
//! and compares digests in constant time. With no password configured every
//! `connect` is accepted.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// SHA-256 of the kiosk password. `None` disables the check.
    pub token_digest: Option<[u8; 32]>,
}

impl AuthConfig {
    /// Create config from environment variables.
    ///
    /// `PASSWORD` is hashed on startup; `PASSWORD_SHA256` supplies the hex
    /// digest directly and wins when both are set.
    pub fn from_env() -> Self {
        if let Ok(hex_digest) = std::env::var("PASSWORD_SHA256") {
            match parse_digest(&hex_digest) {
                Some(digest) => return Self { token_digest: Some(digest) },
                None => warn!("PASSWORD_SHA256 is not a 32-byte hex digest, ignoring"),
            }
        }
        match std::env::var("PASSWORD") {
            Ok(password) if !password.is_empty() => Self::with_password(&password),
            _ => Self::default(),
        }
    }

    /// Require `password`.
    pub fn with_password(password: &str) -> Self {
        Self {
            token_digest: Some(digest(password)),
        }
    }

    /// Check if a password is configured.
    pub fn is_configured(&self) -> bool {
        self.token_digest.is_some()
    }

    /// Validate the token supplied with `connect`.
    pub fn check(&self, token: Option<&str>) -> Result<(), AuthError> {
        let Some(expected) = &self.token_digest else {
            return Ok(());
        };
        let token = token.ok_or(AuthError::Missing)?;
        if constant_time_eq(&digest(token), expected) {
            Ok(())
        } else {
            Err(AuthError::Invalid)
        }
    }
}

/// Token check failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A password is configured but none was sent.
    #[error("token required")]
    Missing,
    /// The password was wrong.
    #[error("invalid token")]
    Invalid,
}

fn digest(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let hash = hasher.finalize();

    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    out
}

fn parse_digest(hex_digest: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_digest.trim()).ok()?;
    bytes.try_into().ok()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// =============================================================================
// TESTS
// =============================================================================
