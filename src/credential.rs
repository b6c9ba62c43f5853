//! Stored user secrets and password verification.
//!
//! A secret that starts with one of the bcrypt markers is verified as a bcrypt
//! hash; anything else is compared as a plain string. Secrets never show up in
//! `Debug` or `Display` output.

use crate::constants::REDACTED;
use std::fmt;

/// Markers accepted as bcrypt. All of them are rewritten to
/// [`CANONICAL_BCRYPT_MARKER`] before verification.
const BCRYPT_MARKERS: [&str; 3] = ["$2a$", "$2b$", "$2y$"];
const CANONICAL_BCRYPT_MARKER: &str = "$2b$";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("blank password")]
pub struct BlankSecret;

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Plain(String),
    Bcrypt(String),
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Result<Self, BlankSecret> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(BlankSecret);
        }
        if let Some(rest) = BCRYPT_MARKERS
            .iter()
            .find_map(|marker| secret.strip_prefix(marker))
        {
            return Ok(Self::Bcrypt(format!("{CANONICAL_BCRYPT_MARKER}{rest}")));
        }
        Ok(Self::Plain(secret))
    }

    pub fn is_hashed(&self) -> bool {
        matches!(self, Self::Bcrypt(_))
    }

    /// Checks `presented` against the stored secret. Malformed hashes verify
    /// as `false`.
    pub fn verify(&self, presented: &str) -> bool {
        match self {
            Self::Plain(stored) => {
                constant_time_eq::constant_time_eq(stored.as_bytes(), presented.as_bytes())
            }
            Self::Bcrypt(hash) => match bcrypt::verify(presented, hash) {
                Ok(matched) => matched,
                Err(err) => {
                    tracing::warn!(error = %err, "stored bcrypt hash could not be verified");
                    false
                }
            },
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Produces a hash that [`Credential::new`] recognizes as bcrypt.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}
