//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAZAAR_API_BASE_URL` - Base URL of the backend API (e.g., `https://api.example.com/api`)
//!
//! ## Optional
//! - `BAZAAR_API_TOKEN` - Bearer token, when not obtained through sign-in
//! - `BAZAAR_STORAGE_PATH` - Local storage file (default: `.bazaar/storage.json`)
//! - `BAZAAR_HTTP_TIMEOUT_SECS` - Request timeout in seconds (default: none)
//! - `BAZAAR_ETA_SPEED_KMH` - Average courier speed (default: 30)
//! - `BAZAAR_ETA_PREP_MINUTES` - Store preparation time (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use bazaar_core::EtaModel;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_STORAGE_PATH: &str = ".bazaar/storage.json";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Client application configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend API configuration
    pub api: ApiConfig,
    /// Local storage file
    pub storage_path: PathBuf,
    /// Delivery time estimation parameters
    pub eta: EtaModel,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Backend API configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: Url,
    /// Bearer token sent on every request
    pub token: Option<SecretString>,
    /// Client-wide request timeout; `None` leaves reqwest's default (no timeout)
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Configuration for `base_url` with no token and no timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url, "base_url")?,
            token: None,
            timeout: None,
        })
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api = ApiConfig::from_env()?;
        let storage_path = PathBuf::from(get_env_or_default(
            "BAZAAR_STORAGE_PATH",
            DEFAULT_STORAGE_PATH,
        ));
        let eta = eta_from_env()?;

        Ok(Self {
            api,
            storage_path,
            eta,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url(
            &get_required_env("BAZAAR_API_BASE_URL")?,
            "BAZAAR_API_BASE_URL",
        )?;

        let token = get_optional_env("BAZAAR_API_TOKEN")
            .map(|value| {
                validate_token(&value, "BAZAAR_API_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(value))
            })
            .transpose()?;

        let timeout = get_optional_env("BAZAAR_HTTP_TIMEOUT_SECS")
            .map(|raw| parse_env::<u64>("BAZAAR_HTTP_TIMEOUT_SECS", &raw))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            base_url,
            token,
            timeout,
        })
    }
}

fn eta_from_env() -> Result<EtaModel, ConfigError> {
    let speed = get_optional_env("BAZAAR_ETA_SPEED_KMH")
        .map(|raw| parse_env::<f64>("BAZAAR_ETA_SPEED_KMH", &raw))
        .transpose()?
        .unwrap_or(EtaModel::DEFAULT_SPEED_KMH);
    let prep = get_optional_env("BAZAAR_ETA_PREP_MINUTES")
        .map(|raw| parse_env::<u32>("BAZAAR_ETA_PREP_MINUTES", &raw))
        .transpose()?
        .unwrap_or(EtaModel::DEFAULT_PREPARATION_MINUTES);

    EtaModel::new(speed, prep)
        .map_err(|e| ConfigError::InvalidEnvVar("BAZAAR_ETA_SPEED_KMH".to_string(), e.to_string()))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a base URL, requiring an http(s) scheme.
fn parse_base_url(raw: &str, var_name: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Reject tokens that are obviously copied from a template.
fn validate_token(token: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = token.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}
