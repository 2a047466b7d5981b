//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

use crate::services::rate_limiter::RateLimit;

/// Deployment environment, mirrors the `APP_ENV` variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Local,
    Development,
    Production,
    #[default]
    Default,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string; the in-memory store is used when unset
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8080
/// - `BASE_URL` (optional): public address used in verification links
/// - `APP_ENV` (optional): `local`, `development`, `production` or `default`
/// - `DISABLE_EMAIL_AND_API_KEY` (optional): trusted-deployment mode, skips identity and rate limiting
/// - `UNAUTH_LIMIT` / `AUTH_LIMIT` (optional): tier budgets as `<N>/<unit>`
/// - `MAIL_USERNAME`, `MAIL_PASSWORD`, `MAIL_FROM`, `MAIL_API_URL`: mail API credentials
/// - `VALIDATOR_PROGRAM`, `VALIDATOR_ARGS`: how the external validator is launched
/// - `DOWNLOAD_TIMEOUT_SECS` (optional): deadline for remote feed downloads, defaults to 300
/// - `TOKEN_TTL_HOURS` (optional): verification link lifetime, 1 hour to one year
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub app_env: AppEnv,

    #[serde(default)]
    pub disable_email_and_api_key: bool,

    #[serde(default = "default_unauth_limit")]
    pub unauth_limit: RateLimit,

    #[serde(default = "default_auth_limit")]
    pub auth_limit: RateLimit,

    #[serde(default)]
    pub mail_username: Option<String>,

    #[serde(default)]
    pub mail_password: Option<String>,

    #[serde(default)]
    pub mail_from: Option<String>,

    #[serde(default = "default_mail_api_url")]
    pub mail_api_url: String,

    #[serde(default = "default_validator_program")]
    pub validator_program: String,

    /// Whitespace separated arguments placed before `-i <input> -o <output>`.
    #[serde(default = "default_validator_args")]
    pub validator_args: String,

    /// Upper bound for an uploaded or downloaded feed.
    #[serde(default = "default_max_feed_bytes")]
    pub max_feed_bytes: usize,

    /// Whole-request deadline for fetching a remote feed.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_unauth_limit() -> RateLimit {
    RateLimit::per_day(5)
}

fn default_auth_limit() -> RateLimit {
    RateLimit::per_day(50)
}

fn default_mail_api_url() -> String {
    "https://api.mailjet.com/v3.1/send".to_string()
}

fn default_validator_program() -> String {
    "java".to_string()
}

fn default_validator_args() -> String {
    "-jar /opt/gtfs-validator.jar".to_string()
}

fn default_max_feed_bytes() -> usize {
    200 * 1024 * 1024
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_token_ttl_hours() -> i64 {
    24
}

/// Longest accepted verification token lifetime (one year).
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366;

// argon2 crate defaults (m=19 MiB, t=2).
fn default_argon2_memory_kib() -> u32 {
    19 * 1024
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_notification_queue_capacity() -> usize {
    256
}

/// Mail API credentials, present only when all three variables are set.
#[derive(Debug, Clone)]
pub struct MailCredentials {
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Environment variable values cannot be parsed into expected types
    /// - A rate limit string does not match `<N>/<unit>`
    /// - The configuration fails [`Config::validate`]
    pub fn from_env() -> anyhow::Result<Self> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from explicit key/value pairs.
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if url::Url::parse(&self.base_url).is_err() {
            anyhow::bail!("BASE_URL is not a valid URL: {}", self.base_url);
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            anyhow::bail!("TOKEN_TTL_HOURS must be between 1 and {MAX_TOKEN_TTL_HOURS}");
        }
        if self.download_timeout_secs == 0 {
            anyhow::bail!("DOWNLOAD_TIMEOUT_SECS must be positive");
        }
        if self.app_env == AppEnv::Production
            && !self.disable_email_and_api_key
            && self.mail_credentials().is_none()
        {
            anyhow::bail!("MAIL_USERNAME, MAIL_PASSWORD and MAIL_FROM are required in production");
        }
        Ok(())
    }

    pub fn mail_credentials(&self) -> Option<MailCredentials> {
        match (&self.mail_username, &self.mail_password, &self.mail_from) {
            (Some(username), Some(password), Some(from)) => Some(MailCredentials {
                username: username.clone(),
                password: password.clone(),
                from: from.clone(),
            }),
            _ => None,
        }
    }

    pub fn validator_args(&self) -> Vec<String> {
        self.validator_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            server_port: default_port(),
            base_url: default_base_url(),
            app_env: AppEnv::default(),
            disable_email_and_api_key: false,
            unauth_limit: default_unauth_limit(),
            auth_limit: default_auth_limit(),
            mail_username: None,
            mail_password: None,
            mail_from: None,
            mail_api_url: default_mail_api_url(),
            validator_program: default_validator_program(),
            validator_args: default_validator_args(),
            max_feed_bytes: default_max_feed_bytes(),
            download_timeout_secs: default_download_timeout_secs(),
            token_ttl_hours: default_token_ttl_hours(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            notification_queue_capacity: default_notification_queue_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_vars(Vec::new()).unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.unauth_limit, RateLimit::per_day(5));
        assert_eq!(config.auth_limit, RateLimit::per_day(50));
        assert!(!config.disable_email_and_api_key);
        assert_eq!(config.validator_args(), vec!["-jar", "/opt/gtfs-validator.jar"]);
    }

    #[test]
    fn parses_rate_limits_and_flags() {
        let config = Config::from_vars(vars(&[
            ("UNAUTH_LIMIT", "10/minute"),
            ("AUTH_LIMIT", "1000/week"),
            ("DISABLE_EMAIL_AND_API_KEY", "true"),
            ("APP_ENV", "development"),
        ]))
        .unwrap();

        assert_eq!(config.unauth_limit.to_string(), "10/minute");
        assert_eq!(config.auth_limit.to_string(), "1000/week");
        assert!(config.disable_email_and_api_key);
        assert_eq!(config.app_env, AppEnv::Development);
    }

    #[test]
    fn rejects_malformed_rate_limit() {
        let result = Config::from_vars(vars(&[("AUTH_LIMIT", "50 per day")]));
        assert!(result.is_err());
    }

    #[test]
    fn token_ttl_is_bounded() {
        assert!(Config::from_vars(vars(&[("TOKEN_TTL_HOURS", "0")])).is_err());
        assert!(Config::from_vars(vars(&[("TOKEN_TTL_HOURS", "9223372036854775807")])).is_err());

        let config = Config::from_vars(vars(&[("TOKEN_TTL_HOURS", "48")])).unwrap();
        assert_eq!(config.token_ttl_hours, 48);
    }

    #[test]
    fn download_timeout_defaults_and_parses() {
        assert_eq!(Config::from_vars(Vec::new()).unwrap().download_timeout_secs, 300);

        let config = Config::from_vars(vars(&[("DOWNLOAD_TIMEOUT_SECS", "30")])).unwrap();
        assert_eq!(config.download_timeout_secs, 30);
        assert!(Config::from_vars(vars(&[("DOWNLOAD_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn production_requires_mail_credentials() {
        let result = Config::from_vars(vars(&[("APP_ENV", "production")]));
        assert!(result.is_err());

        let config = Config::from_vars(vars(&[
            ("APP_ENV", "production"),
            ("MAIL_USERNAME", "key"),
            ("MAIL_PASSWORD", "secret"),
            ("MAIL_FROM", "noreply@example.com"),
        ]))
        .unwrap();
        assert!(config.mail_credentials().is_some());
    }
}
