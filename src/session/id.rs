//! Session identifier codec
//!
//! An identifier is laid out as
//!
//! ```text
//! random bytes (size) | expiry, f64 big-endian epoch ms (if expires_in) | HMAC (if key)
//! ```
//!
//! and travels as `percent-encode(base64(bytes))`. Verification re-derives the
//! whole identifier from its random bytes and expiry and compares it with what
//! the client presented, which authenticates every segment at once.

use std::borrow::Cow;

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::TryRngCore;
use subtle::ConstantTimeEq;

use crate::session::config::{MacAlgorithm, SessionConfig};

/// Width of the serialized expiry timestamp
pub const EXPIRY_LEN: usize = 8;

/// Incoming identifier could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("identifier is not valid percent-encoded UTF-8")]
    PercentEncoding(#[from] std::string::FromUtf8Error),

    #[error("identifier is not valid base64")]
    Base64(#[from] base64::DecodeError),
}

/// A fresh identifier could not be produced
#[derive(Debug, thiserror::Error)]
pub enum IdGenerationError {
    #[error("entropy source failed: {0}")]
    Entropy(String),

    #[error("MAC key rejected by {0}")]
    InvalidKey(MacAlgorithm),
}

/// Why an incoming identifier was not accepted
#[derive(Debug)]
pub enum Rejection {
    Malformed(DecodeError),
    TooShort { len: usize, min: usize },
    Expired { expires_at: f64 },
    Mismatch,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed identifier: {err}"),
            Self::TooShort { len, min } => {
                write!(f, "decoded identifier is {len} bytes, at least {min} required")
            }
            Self::Expired { expires_at } => write!(f, "identifier expired at {expires_at}"),
            Self::Mismatch => f.write_str("identifier does not match its re-derived form"),
        }
    }
}

/// Current time in epoch milliseconds
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// Percent-encode the base64 form of `raw`
#[must_use]
pub fn encode(raw: &[u8]) -> String {
    urlencoding::encode(&general_purpose::STANDARD.encode(raw)).into_owned()
}

/// Reverse [`encode`]
///
/// # Errors
///
/// Returns an error if `encoded` is not valid percent-encoding or not valid base64
pub fn decode(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let base64 = urlencoding::decode(encoded)?;
    Ok(general_purpose::STANDARD.decode(base64.as_bytes())?)
}

/// Builds and verifies identifiers for one configuration
#[derive(Debug, Clone)]
pub struct SessionIdCodec {
    algorithm: MacAlgorithm,
    key: Option<Vec<u8>>,
    expires_in_ms: Option<f64>,
    size: usize,
}

impl SessionIdCodec {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            algorithm: config.algorithm(),
            key: config.key().map(<[u8]>::to_vec),
            expires_in_ms: config.expires_in().map(|ttl| ttl.as_millis() as f64),
            size: config.size(),
        }
    }

    /// Smallest decoded length an identifier can have
    #[must_use]
    pub fn min_len(&self) -> usize {
        if self.expires_in_ms.is_some() {
            self.size + EXPIRY_LEN
        } else {
            self.size
        }
    }

    /// Build an encoded identifier
    ///
    /// `random` defaults to `size` fresh bytes from the OS RNG and `expires_at`
    /// to now plus `expires_in`. Given the same inputs the output is identical.
    ///
    /// # Errors
    ///
    /// Returns an error if the entropy source fails or the MAC key is rejected
    pub fn build(
        &self,
        random: Option<&[u8]>,
        expires_at: Option<f64>,
    ) -> Result<String, IdGenerationError> {
        let random: Cow<'_, [u8]> = match random {
            Some(bytes) => Cow::Borrowed(bytes),
            None => Cow::Owned(self.random_bytes()?),
        };

        let expiry = self.expires_in_ms.map(|expires_in| {
            expires_at
                .unwrap_or_else(|| now_millis() + expires_in)
                .to_be_bytes()
        });

        let mut raw = random.into_owned();
        if let Some(expiry) = expiry {
            raw.extend_from_slice(&expiry);
        }
        if let Some(key) = &self.key {
            let tag = self
                .algorithm
                .sign(key, &[raw.as_slice()])
                .map_err(|_| IdGenerationError::InvalidKey(self.algorithm))?;
            raw.extend_from_slice(&tag);
        }

        Ok(encode(&raw))
    }

    /// Check structure, expiry and MAC of an encoded identifier
    ///
    /// # Errors
    ///
    /// Returns the reason the identifier was rejected
    pub fn verify(&self, encoded: &str) -> Result<(), Rejection> {
        let decoded = decode(encoded).map_err(Rejection::Malformed)?;
        let min = self.min_len();
        if decoded.len() < min {
            return Err(Rejection::TooShort {
                len: decoded.len(),
                min,
            });
        }

        let (random, rest) = decoded.split_at(self.size);
        let expires_at = match self.expires_in_ms {
            Some(_) => {
                let mut bytes = [0u8; EXPIRY_LEN];
                bytes.copy_from_slice(&rest[..EXPIRY_LEN]);
                let expires_at = f64::from_be_bytes(bytes);
                if now_millis() >= expires_at {
                    return Err(Rejection::Expired { expires_at });
                }
                Some(expires_at)
            }
            None => None,
        };

        let expected = self
            .build(Some(random), expires_at)
            .map_err(|_| Rejection::Mismatch)?;
        if bool::from(expected.as_bytes().ct_eq(encoded.as_bytes())) {
            Ok(())
        } else {
            Err(Rejection::Mismatch)
        }
    }

    #[must_use]
    pub fn is_valid(&self, encoded: &str) -> bool {
        self.verify(encoded).is_ok()
    }

    fn random_bytes(&self) -> Result<Vec<u8>, IdGenerationError> {
        let mut bytes = vec![0u8; self.size];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| IdGenerationError::Entropy(e.to_string()))?;
        Ok(bytes)
    }
}
