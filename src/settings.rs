use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use actix_web::cookie::SameSite;

use crate::session::config::{ConfigError, MacAlgorithm, SessionOptions, DEFAULT_ID_SIZE};
use crate::session::cookie::{CookieOptions, DEFAULT_COOKIE_NAME};
use crate::session::ignore::{IgnorePath, IgnorePaths};

/// Directory searched for an overriding `Settings.toml`
pub const CONFIG_DIR_ENV: &str = "EASY_SESSION_CONFIG_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EasySessionSettings {
    pub application: ApplicationSettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// MAC secret. Identifiers are unsigned when absent.
    pub key: Option<String>,
    /// Identifier validity window in milliseconds
    pub expires_in_ms: Option<u64>,
    pub id_size: usize,
    pub cookie_name: String,
    pub algorithm: String,
    /// Paths exempt from session handling, matched exactly
    pub ignore_paths: Vec<String>,
    /// Paths exempt from session handling, matched as regular expressions
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub path: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL for cached session data in milliseconds
    pub expires_in_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            key: None,
            expires_in_ms: None,
            id_size: DEFAULT_ID_SIZE,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            algorithm: MacAlgorithm::default().to_string(),
            ignore_paths: Vec::new(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            http_only: true,
            same_site: None,
            path: Some("/".to_string()),
            domain: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EasySessionSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file cannot be read or parsed
    /// - Logger initialization fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        settings.logging.logger_builder().try_init()?;
        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    ///
    /// Later sources replace earlier ones:
    /// 1. Default settings
    /// 2. `Settings.toml` in the current directory
    /// 3. `Settings.toml` in `EASY_SESSION_CONFIG_DIR`
    ///
    /// Environment variables are applied afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or is not valid TOML
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        if let Some(local) = Self::read_settings_file(Path::new("Settings.toml"))? {
            settings = local;
        }

        if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV) {
            let path = Path::new(&config_dir).join("Settings.toml");
            match Self::read_settings_file(&path)? {
                Some(overriding) => settings = overriding,
                None => log::info!(
                    "{CONFIG_DIR_ENV} set but no Settings.toml found at: {}",
                    path.display()
                ),
            }
        }

        Ok(settings)
    }

    fn read_settings_file(path: &Path) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let settings = basic_toml::from_str(&content)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(Some(settings))
    }

    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_cookie_env_overrides(&mut settings.cookies);
        Self::apply_cache_env_overrides(&mut settings.cache);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        Self::apply_parsed_env_override("PORT", &mut app_settings.port);
    }

    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        if let Ok(key) = std::env::var("SESSION_KEY") {
            session_settings.key = Some(key).filter(|key| !key.is_empty());
        }
        Self::apply_optional_env_override(
            "SESSION_EXPIRES_IN_MS",
            &mut session_settings.expires_in_ms,
        );
        Self::apply_parsed_env_override("SESSION_ID_SIZE", &mut session_settings.id_size);
        if let Ok(name) = std::env::var("SESSION_COOKIE_NAME") {
            session_settings.cookie_name = name;
        }
        if let Ok(algorithm) = std::env::var("SESSION_ALGORITHM") {
            session_settings.algorithm = algorithm;
        }
    }

    fn apply_cookie_env_overrides(cookie_settings: &mut CookieSettings) {
        Self::apply_parsed_env_override("COOKIE_SECURE", &mut cookie_settings.secure);
    }

    fn apply_cache_env_overrides(cache_settings: &mut CacheSettings) {
        Self::apply_optional_env_override("CACHE_EXPIRES_IN_MS", &mut cache_settings.expires_in_ms);
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Replace `target` with the parsed value of `env_var`, if set and parseable
    fn apply_parsed_env_override<T: FromStr>(env_var: &str, target: &mut T) {
        if let Ok(value_str) = std::env::var(env_var) {
            match value_str.parse::<T>() {
                Ok(value) => *target = value,
                Err(_) => log::warn!("Ignoring unparseable {env_var}={value_str}"),
            }
        }
    }

    /// Like [`Self::apply_parsed_env_override`]; an empty value unsets `target`
    fn apply_optional_env_override<T: FromStr>(env_var: &str, target: &mut Option<T>) {
        match std::env::var(env_var) {
            Ok(value_str) if value_str.is_empty() => *target = None,
            Ok(value_str) => match value_str.parse::<T>() {
                Ok(value) => *target = Some(value),
                Err(_) => log::warn!("Ignoring unparseable {env_var}={value_str}"),
            },
            Err(_) => {}
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if line.trim_start().starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Build coordinator options from these settings
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown algorithm, an unknown `SameSite` value or an
    /// ignore pattern that is not a valid regular expression
    pub fn to_session_options(&self) -> Result<SessionOptions, ConfigError> {
        let session = &self.session;

        let literals = session
            .ignore_paths
            .iter()
            .map(|path| IgnorePath::from(path.as_str()));
        let patterns = session
            .ignore_patterns
            .iter()
            .map(|pattern| IgnorePath::pattern(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SessionOptions {
            algorithm: session.algorithm.parse()?,
            key: session.key.clone(),
            expires_in: session.expires_in_ms.map(Duration::from_millis),
            size: session.id_size,
            cookie_name: session.cookie_name.clone(),
            cookie: self.cookies.to_cookie_options()?,
            cache_expires_in: self.cache.expires_in_ms.map(Duration::from_millis),
            ignore_paths: literals.chain(patterns).collect::<IgnorePaths>(),
        })
    }
}

impl LoggingSettings {
    /// Logger filtered by `level`, in `RUST_LOG` syntax
    #[must_use]
    pub fn logger_builder(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&self.level);
        builder
    }
}

impl CookieSettings {
    /// Cookie attributes for the session cookie
    ///
    /// # Errors
    ///
    /// Returns an error if `same_site` is not one of `strict`, `lax` or `none`
    pub fn to_cookie_options(&self) -> Result<CookieOptions, ConfigError> {
        let same_site = self
            .same_site
            .as_deref()
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "strict" => Ok(SameSite::Strict),
                "lax" => Ok(SameSite::Lax),
                "none" => Ok(SameSite::None),
                _ => Err(ConfigError::InvalidSameSite(value.to_string())),
            })
            .transpose()?;

        Ok(CookieOptions {
            http_only: self.http_only,
            secure: self.secure,
            same_site,
            path: self.path.clone(),
            domain: self.domain.clone(),
            max_age: None,
        })
    }
}
