//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BACKEND_API_URL` - Base URL of the bakery backend REST API
//! - `GSA_VALIDATION_URL` - Salesperson (GSA) validation endpoint
//! - `LIFF_ID` - LIFF app id of the points storefront (`{channelId}-{suffix}`)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: `http://{host}:{port}`)
//! - `LIFF_SALES_ID` - LIFF app id of the sales portal (default: `LIFF_ID`)
//! - `LINE_CHANNEL_ACCESS_TOKEN` - Messaging API token used to send purchase notifications
//! - `LINE_API_BASE_URL` - LINE platform API (default: `https://api.line.me`)
//! - `LIFF_LOGIN_ON_EXTERNAL_BROWSER` - Force login outside the LINE app (default: true)
//! - `NOTIFICATION_COUNTDOWN_SECS` - Countdown before sending a LINE message (default: 3)
//! - `NOTIFICATION_CLOSE_DELAY_MS` - Delay between send and window close (default: 1500)
//! - `POINTS_HISTORY_LIMIT` - Rows fetched for purchase/transaction history (default: 10)
//! - `HTTP_TIMEOUT_SECS` - Timeout for outbound HTTP calls (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

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
    "enter-",
    "put-your",
    "add-your",
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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Backend REST API configuration
    pub backend: BackendConfig,
    /// Salesperson validation endpoint configuration
    pub gsa: GsaConfig,
    /// LINE / LIFF configuration
    pub line: LineConfig,
    /// Points flow tuning
    pub points: PointsConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Error event sample rate
    pub sentry_sample_rate: f32,
    /// Transaction sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Backend REST API configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://api.bakery.example/`
    pub base_url: Url,
    /// Timeout applied to every outbound request
    pub timeout: Duration,
}

/// Salesperson (GSA) validation endpoint configuration.
#[derive(Debug, Clone)]
pub struct GsaConfig {
    /// Full URL the `{userId}` body is posted to
    pub validation_url: Url,
    /// Timeout applied to the exchange call
    pub timeout: Duration,
}

/// LINE platform configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct LineConfig {
    /// LIFF app id for the points storefront
    pub liff_id: String,
    /// LIFF app id for the sales portal
    pub sales_liff_id: String,
    /// Messaging API channel access token (server-side only)
    pub channel_access_token: Option<SecretString>,
    /// Whether LIFF should force login when opened outside LINE
    pub login_on_external_browser: bool,
    /// LINE platform API base URL
    pub api_base_url: Url,
}

impl std::fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineConfig")
            .field("liff_id", &self.liff_id)
            .field("sales_liff_id", &self.sales_liff_id)
            .field(
                "channel_access_token",
                &self.channel_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("login_on_external_browser", &self.login_on_external_browser)
            .field("api_base_url", &self.api_base_url.as_str())
            .finish()
    }
}

impl LineConfig {
    /// The LINE Login channel id a LIFF id belongs to.
    ///
    /// LIFF ids have the form `{channelId}-{suffix}`; access tokens verified
    /// against LINE report that channel id as their `client_id`.
    #[must_use]
    pub fn channel_id(liff_id: &str) -> &str {
        liff_id.split_once('-').map_or(liff_id, |(channel, _)| channel)
    }
}

/// Points flow tuning.
#[derive(Debug, Clone)]
pub struct PointsConfig {
    /// Rows fetched for purchase and transaction history
    pub history_limit: u32,
    /// Countdown shown before a LINE message is sent
    pub notification_countdown: Duration,
    /// Delay between a successful send and closing the LIFF window
    pub close_delay: Duration,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            notification_countdown: Duration::from_secs(3),
            close_delay: Duration::from_millis(1500),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host: IpAddr = parse_env_or_default("STOREFRONT_HOST", "127.0.0.1")?;
        let port: u16 = parse_env_or_default("STOREFRONT_PORT", "3000")?;
        let base_url = get_optional_env("STOREFRONT_BASE_URL")
            .unwrap_or_else(|| format!("http://{host}:{port}"));
        let timeout = Duration::from_secs(parse_env_or_default("HTTP_TIMEOUT_SECS", "15")?);

        let backend = BackendConfig {
            base_url: get_required_url("BACKEND_API_URL")?,
            timeout,
        };
        let gsa = GsaConfig {
            validation_url: get_required_url("GSA_VALIDATION_URL")?,
            timeout,
        };
        let line = LineConfig::from_env()?;
        let points = PointsConfig::from_env()?;

        Ok(Self {
            host,
            port,
            base_url,
            backend,
            gsa,
            line,
            points,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl LineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let liff_id = get_required_env("LIFF_ID")?;
        validate_liff_id(&liff_id, "LIFF_ID")?;
        let sales_liff_id = match get_optional_env("LIFF_SALES_ID") {
            Some(id) => {
                validate_liff_id(&id, "LIFF_SALES_ID")?;
                id
            }
            None => liff_id.clone(),
        };
        let channel_access_token = match get_optional_env("LINE_CHANNEL_ACCESS_TOKEN") {
            Some(token) => {
                validate_secret_strength(&token, "LINE_CHANNEL_ACCESS_TOKEN")?;
                Some(SecretString::from(token))
            }
            None => None,
        };

        Ok(Self {
            liff_id,
            sales_liff_id,
            channel_access_token,
            login_on_external_browser: parse_env_or_default(
                "LIFF_LOGIN_ON_EXTERNAL_BROWSER",
                "true",
            )?,
            api_base_url: parse_url(
                &get_env_or_default("LINE_API_BASE_URL", "https://api.line.me"),
                "LINE_API_BASE_URL",
            )?,
        })
    }
}

impl PointsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            history_limit: parse_env_or_default("POINTS_HISTORY_LIMIT", "10")?,
            notification_countdown: Duration::from_secs(parse_env_or_default(
                "NOTIFICATION_COUNTDOWN_SECS",
                "3",
            )?),
            close_delay: Duration::from_millis(parse_env_or_default(
                "NOTIFICATION_CLOSE_DELAY_MS",
                "1500",
            )?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable and parse it as an absolute URL.
fn get_required_url(key: &str) -> Result<Url, ConfigError> {
    let value = get_required_env(key)?;
    parse_url(&value, key)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_url(value: &str, key: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Validate the `{channelId}-{suffix}` shape of a LIFF id.
fn validate_liff_id(liff_id: &str, var_name: &str) -> Result<(), ConfigError> {
    let valid = liff_id.split_once('-').is_some_and(|(channel, suffix)| {
        !channel.is_empty()
            && channel.chars().all(|c| c.is_ascii_digit())
            && !suffix.is_empty()
            && suffix.chars().all(|c| c.is_ascii_alphanumeric())
    });
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "expected '{channelId}-{suffix}'".to_string(),
        ))
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the token issued in the LINE Developers console."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-channel-token", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_liff_id() {
        assert!(validate_liff_id("1657000000-AbCdEf12", "LIFF_ID").is_ok());
        assert!(validate_liff_id("1657000000", "LIFF_ID").is_err());
        assert!(validate_liff_id("abc-def", "LIFF_ID").is_err());
        assert!(validate_liff_id("1657000000-", "LIFF_ID").is_err());
    }

    #[test]
    fn test_channel_id() {
        assert_eq!(LineConfig::channel_id("1657000000-AbCdEf12"), "1657000000");
        assert_eq!(LineConfig::channel_id("1657000000"), "1657000000");
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        assert!(parse_url("https://api.example.test/", "BACKEND_API_URL").is_ok());
        assert!(parse_url("ftp://api.example.test/", "BACKEND_API_URL").is_err());
        assert!(parse_url("not a url", "BACKEND_API_URL").is_err());
    }

    #[test]
    fn test_line_config_debug_redacts_token() {
        let config = LineConfig {
            liff_id: "1657000000-AbCdEf12".to_string(),
            sales_liff_id: "1657000000-AbCdEf12".to_string(),
            channel_access_token: Some(SecretString::from("super_secret_channel_token")),
            login_on_external_browser: true,
            api_base_url: Url::parse("https://api.line.me").unwrap(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("1657000000-AbCdEf12"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_channel_token"));
    }

    #[test]
    fn test_points_config_default() {
        let config = PointsConfig::default();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.notification_countdown, Duration::from_secs(3));
    }
}
