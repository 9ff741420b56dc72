//! Session configuration
//!
//! [`SessionOptions`] is the loose, defaultable shape callers fill in (directly or via
//! [`crate::settings::EasySessionSettings`]). It is validated exactly once, when it is
//! turned into a [`SessionConfig`], which is what the coordinator reads from for the
//! rest of its life.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use actix_web::http::header::InvalidHeaderValue;
use hmac::digest::{InvalidLength, KeyInit};
use hmac::{Hmac, Mac};
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::session::cookie::{CookieFactory, CookieOptions, DEFAULT_COOKIE_NAME};
use crate::session::ignore::IgnorePaths;

/// Number of random bytes per identifier unless configured otherwise
pub const DEFAULT_ID_SIZE: usize = 16;

/// Largest TTL the cache accepts: 2^31 - 1 milliseconds
pub const MAX_CACHE_TTL: Duration = Duration::from_millis((1 << 31) - 1);

/// Errors raised while validating session configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The \"expires_in\" option requires the \"key\" option")]
    ExpiresInRequiresKey,

    #[error("Identifier size must be at least one byte")]
    InvalidSize,

    #[error("Cookie name must not be empty")]
    EmptyCookieName,

    #[error("Unsupported MAC algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Unsupported SameSite value: {0}")]
    InvalidSameSite(String),

    #[error("Session cookie cannot be sent as a header")]
    InvalidCookie(#[source] InvalidHeaderValue),

    #[error("Invalid ignore path pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Digest used for the identifier's HMAC tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl MacAlgorithm {
    /// Length in bytes of the tag this algorithm produces
    #[must_use]
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Compute the HMAC of `segments`, fed to the MAC in order
    ///
    /// # Errors
    ///
    /// Returns an error if the key is rejected by the MAC implementation
    pub fn sign(self, key: &[u8], segments: &[&[u8]]) -> Result<Vec<u8>, InvalidLength> {
        match self {
            Self::Sha224 => hmac_digest::<Hmac<Sha224>>(key, segments),
            Self::Sha256 => hmac_digest::<Hmac<Sha256>>(key, segments),
            Self::Sha384 => hmac_digest::<Hmac<Sha384>>(key, segments),
            Self::Sha512 => hmac_digest::<Hmac<Sha512>>(key, segments),
        }
    }
}

fn hmac_digest<M: Mac + KeyInit>(key: &[u8], segments: &[&[u8]]) -> Result<Vec<u8>, InvalidLength> {
    let mut mac = <M as Mac>::new_from_slice(key)?;
    for segment in segments {
        mac.update(segment);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

impl FromStr for MacAlgorithm {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(ConfigError::UnsupportedAlgorithm(name.to_string())),
        }
    }
}

impl fmt::Display for MacAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

/// Unvalidated session options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub algorithm: MacAlgorithm,
    /// Secret for the identifier MAC. Required when `expires_in` is set.
    pub key: Option<String>,
    /// How long an issued identifier is accepted
    pub expires_in: Option<Duration>,
    /// Random bytes per identifier
    pub size: usize,
    pub cookie_name: String,
    /// Attributes forwarded to every session cookie
    pub cookie: CookieOptions,
    /// TTL for cache entries. Derived from `expires_in` when unset.
    pub cache_expires_in: Option<Duration>,
    pub ignore_paths: IgnorePaths,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            algorithm: MacAlgorithm::default(),
            key: None,
            expires_in: None,
            size: DEFAULT_ID_SIZE,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie: CookieOptions::default(),
            cache_expires_in: None,
            ignore_paths: IgnorePaths::default(),
        }
    }
}

/// Validated, immutable session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    algorithm: MacAlgorithm,
    key: Option<Vec<u8>>,
    expires_in: Option<Duration>,
    size: usize,
    cookie_name: String,
    cookie: CookieOptions,
    cache_expires_in: Duration,
    ignore_paths: IgnorePaths,
}

impl TryFrom<SessionOptions> for SessionConfig {
    type Error = ConfigError;

    fn try_from(options: SessionOptions) -> Result<Self, Self::Error> {
        if options.expires_in.is_some() && options.key.is_none() {
            return Err(ConfigError::ExpiresInRequiresKey);
        }
        if options.size == 0 {
            return Err(ConfigError::InvalidSize);
        }
        if options.cookie_name.is_empty() {
            return Err(ConfigError::EmptyCookieName);
        }
        CookieFactory::new(options.cookie_name.as_str(), options.cookie.clone())
            .validate()
            .map_err(ConfigError::InvalidCookie)?;

        let cache_expires_in = options
            .cache_expires_in
            .or(options.expires_in)
            .map_or(MAX_CACHE_TTL, |ttl| ttl.min(MAX_CACHE_TTL));

        Ok(Self {
            algorithm: options.algorithm,
            key: options.key.map(String::into_bytes),
            expires_in: options.expires_in,
            size: options.size,
            cookie_name: options.cookie_name,
            cookie: options.cookie,
            cache_expires_in,
            ignore_paths: options.ignore_paths,
        })
    }
}

impl SessionConfig {
    #[must_use]
    pub fn algorithm(&self) -> MacAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn cookie(&self) -> &CookieOptions {
        &self.cookie
    }

    /// TTL applied to every cache write
    #[must_use]
    pub fn cache_expires_in(&self) -> Duration {
        self.cache_expires_in
    }

    #[must_use]
    pub fn ignore_paths(&self) -> &IgnorePaths {
        &self.ignore_paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::try_from(SessionOptions::default()).unwrap();
        assert_eq!(config.algorithm(), MacAlgorithm::Sha256);
        assert_eq!(config.size(), 16);
        assert_eq!(config.cookie_name(), "easySession");
        assert!(config.key().is_none());
        assert!(config.expires_in().is_none());
        assert_eq!(config.cache_expires_in(), MAX_CACHE_TTL);
    }

    #[test]
    fn test_expires_in_requires_key() {
        let options = SessionOptions {
            expires_in: Some(Duration::from_millis(1000)),
            ..Default::default()
        };
        let err = SessionConfig::try_from(options).unwrap_err();
        assert!(matches!(err, ConfigError::ExpiresInRequiresKey));
    }

    #[test]
    fn test_cache_ttl_follows_expires_in() {
        let options = SessionOptions {
            key: Some("test".to_string()),
            expires_in: Some(Duration::from_millis(1000)),
            ..Default::default()
        };
        let config = SessionConfig::try_from(options).unwrap();
        assert_eq!(config.cache_expires_in(), Duration::from_millis(1000));
    }

    #[test]
    fn test_cache_ttl_is_capped() {
        let options = SessionOptions {
            key: Some("test".to_string()),
            expires_in: Some(Duration::from_secs(60 * 60 * 24 * 365)),
            ..Default::default()
        };
        let config = SessionConfig::try_from(options).unwrap();
        assert_eq!(config.cache_expires_in(), MAX_CACHE_TTL);

        let options = SessionOptions {
            cache_expires_in: Some(Duration::from_secs(u64::from(u32::MAX))),
            ..Default::default()
        };
        let config = SessionConfig::try_from(options).unwrap();
        assert_eq!(config.cache_expires_in(), MAX_CACHE_TTL);
    }

    #[test]
    fn test_explicit_cache_ttl_wins() {
        let options = SessionOptions {
            key: Some("test".to_string()),
            expires_in: Some(Duration::from_millis(1000)),
            cache_expires_in: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        let config = SessionConfig::try_from(options).unwrap();
        assert_eq!(config.cache_expires_in(), Duration::from_millis(5));
    }

    #[test]
    fn test_rejects_zero_size_and_empty_name() {
        let options = SessionOptions {
            size: 0,
            ..Default::default()
        };
        assert!(matches!(
            SessionConfig::try_from(options),
            Err(ConfigError::InvalidSize)
        ));

        let options = SessionOptions {
            cookie_name: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            SessionConfig::try_from(options),
            Err(ConfigError::EmptyCookieName)
        ));
    }

    #[test]
    fn test_rejects_unsendable_cookie_attributes() {
        let options = SessionOptions {
            cookie: CookieOptions {
                path: Some("/app\n".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            SessionConfig::try_from(options),
            Err(ConfigError::InvalidCookie(_))
        ));
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("SHA512".parse::<MacAlgorithm>().unwrap(), MacAlgorithm::Sha512);
        assert_eq!(MacAlgorithm::Sha384.to_string(), "sha384");
        assert!(matches!(
            "invalid".parse::<MacAlgorithm>(),
            Err(ConfigError::UnsupportedAlgorithm(name)) if name == "invalid"
        ));
    }

    #[test]
    fn test_tag_lengths_match_output() {
        for algorithm in [
            MacAlgorithm::Sha224,
            MacAlgorithm::Sha256,
            MacAlgorithm::Sha384,
            MacAlgorithm::Sha512,
        ] {
            let tag = algorithm
                .sign(b"test", &[b"abc".as_slice(), b"def".as_slice()])
                .unwrap();
            assert_eq!(tag.len(), algorithm.output_len());
        }
    }

    #[test]
    fn test_sign_is_incremental() {
        let split = MacAlgorithm::Sha256
            .sign(b"key", &[b"abc".as_slice(), b"def".as_slice()])
            .unwrap();
        let whole = MacAlgorithm::Sha256.sign(b"key", &[b"abcdef".as_slice()]).unwrap();
        assert_eq!(split, whole);
    }
}
