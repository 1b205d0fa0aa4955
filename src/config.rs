use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_MESSAGE_QUEUE_BACKEND: &str = "in-memory";
const DEFAULT_MESSAGE_QUEUE_NAMESPACE: &str = "rentals:mq";
const DEFAULT_MESSAGE_QUEUE_BLOCK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CHECKOUT_DRAFT_TTL_SECS: u64 = 3600;
const DEFAULT_REMINDER_HOUR: u32 = 9;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (queue backend and webhook de-duplication)
    pub redis_url: String,

    /// JWT secret key for staff tokens (minimum 64 characters)
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Staff JWT lifetime in seconds
    pub jwt_expiration: usize,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Message queue backend selection ("in-memory" or "redis")
    #[serde(default = "default_message_queue_backend")]
    #[validate(custom = "validate_message_queue_backend")]
    pub message_queue_backend: String,

    /// Namespace prefix for queue keys when using Redis backend
    #[serde(default = "default_message_queue_namespace")]
    pub message_queue_namespace: String,

    /// Blocking timeout (seconds) for queue subscriptions
    #[serde(default = "default_message_queue_block_timeout_secs")]
    pub message_queue_block_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    // ========== Payments ==========
    /// Payment provider secret key; unset means intents cannot be created
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Publishable key handed to the browser alongside the client secret
    #[serde(default)]
    pub stripe_publishable_key: Option<String>,

    /// Base URL of the payment provider API
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Webhook secret for verifying payment gateway callbacks
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default)]
    pub payment_webhook_tolerance_secs: Option<u64>,

    /// Currency used for payment intents
    #[serde(default = "default_currency")]
    pub default_currency: String,

    // ========== Checkout ==========
    /// Lifetime of a checkout draft after its last update
    #[serde(default = "default_checkout_draft_ttl_secs")]
    pub checkout_draft_ttl_secs: u64,

    // ========== Notifications ==========
    /// Email provider endpoint (SendGrid-compatible v3 mail/send)
    #[serde(default)]
    pub email_api_url: Option<String>,

    #[serde(default)]
    pub email_api_key: Option<String>,

    #[serde(default = "default_email_from_address")]
    pub email_from_address: String,

    /// SMS provider base URL (Twilio-compatible)
    #[serde(default = "default_sms_api_base")]
    pub sms_api_base: String,

    #[serde(default)]
    pub sms_account_sid: Option<String>,

    #[serde(default)]
    pub sms_auth_token: Option<String>,

    #[serde(default)]
    pub sms_from_number: Option<String>,

    /// Country code prepended to phone numbers without a leading '+'
    #[serde(default = "default_sms_country_code")]
    pub sms_default_country_code: String,

    /// Brand name used in message templates
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// Public base URL used for links in emails
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Hour of day (UTC) at which reminder sweeps run
    #[serde(default = "default_reminder_hour")]
    pub reminder_hour: u32,

    /// Disable the background reminder scheduler (tests, one-off tooling)
    #[serde(default = "default_true_bool")]
    pub scheduler_enabled: bool,

    // ========== Circuit Breaker Configuration ==========
    /// Number of failures before the notification queue circuit opens
    #[serde(default = "default_circuit_breaker_failures")]
    pub circuit_breaker_failure_threshold: u32,

    /// Circuit breaker reset timeout in seconds
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_secs: u64,

    // ========== Auth Configuration ==========
    /// JWT issuer name
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    /// JWT audience
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,
}

impl AppConfig {
    /// Creates a new configuration
    pub fn new(
        database_url: String,
        redis_url: String,
        jwt_secret: String,
        jwt_expiration: usize,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            jwt_secret,
            jwt_expiration,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            message_queue_backend: default_message_queue_backend(),
            message_queue_namespace: default_message_queue_namespace(),
            message_queue_block_timeout_secs: default_message_queue_block_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            stripe_secret_key: None,
            stripe_publishable_key: None,
            stripe_api_base: default_stripe_api_base(),
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: None,
            default_currency: default_currency(),
            checkout_draft_ttl_secs: default_checkout_draft_ttl_secs(),
            email_api_url: None,
            email_api_key: None,
            email_from_address: default_email_from_address(),
            sms_api_base: default_sms_api_base(),
            sms_account_sid: None,
            sms_auth_token: None,
            sms_from_number: None,
            sms_default_country_code: default_sms_country_code(),
            site_name: default_site_name(),
            public_base_url: default_public_base_url(),
            reminder_hour: default_reminder_hour(),
            scheduler_enabled: default_true_bool(),
            circuit_breaker_failure_threshold: default_circuit_breaker_failures(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn checkout_draft_ttl(&self) -> Duration {
        Duration::from_secs(self.checkout_draft_ttl_secs)
    }

    /// Whether an email provider is fully configured
    pub fn email_configured(&self) -> bool {
        matches!(
            (&self.email_api_url, &self.email_api_key),
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty()
        )
    }

    /// Whether an SMS provider is fully configured
    pub fn sms_configured(&self) -> bool {
        self.sms_account_sid.is_some() && self.sms_auth_token.is_some() && self.sms_from_number.is_some()
    }

    pub(crate) fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique, secure value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.reminder_hour > 23 {
            let mut err = ValidationError::new("reminder_hour");
            err.message = Some("reminder_hour must be between 0 and 23".into());
            errors.add("reminder_hour", err);
        }

        if self.checkout_draft_ttl_secs == 0 {
            let mut err = ValidationError::new("checkout_draft_ttl_secs");
            err.message = Some("checkout_draft_ttl_secs must be greater than 0".into());
            errors.add("checkout_draft_ttl_secs", err);
        }

        if self.is_production() && self.payment_webhook_secret.is_none() {
            let mut err = ValidationError::new("payment_webhook_secret_required");
            err.message =
                Some("Set APP__PAYMENT_WEBHOOK_SECRET so payment callbacks can be verified".into());
            errors.add("payment_webhook_secret", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_message_queue_backend() -> String {
    DEFAULT_MESSAGE_QUEUE_BACKEND.to_string()
}
fn default_message_queue_namespace() -> String {
    DEFAULT_MESSAGE_QUEUE_NAMESPACE.to_string()
}
fn default_message_queue_block_timeout_secs() -> u64 {
    DEFAULT_MESSAGE_QUEUE_BLOCK_TIMEOUT_SECS
}
fn default_true_bool() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_checkout_draft_ttl_secs() -> u64 {
    DEFAULT_CHECKOUT_DRAFT_TTL_SECS
}

fn default_email_from_address() -> String {
    "bookings@localhost".to_string()
}

fn default_sms_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_sms_country_code() -> String {
    "+1".to_string()
}

fn default_site_name() -> String {
    "Rental Services".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_reminder_hour() -> u32 {
    DEFAULT_REMINDER_HOUR
}

fn default_circuit_breaker_failures() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    60
}

fn default_auth_issuer() -> String {
    "rental-booking-api".to_string()
}

fn default_auth_audience() -> String {
    "rental-booking-staff".to_string()
}

fn validate_message_queue_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("message_queue_backend");
            err.message = Some("Must be one of: in-memory, redis".into());
            Err(err)
        }
    }
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 64 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must be at least 64 characters for adequate security".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    let weak_fragments = ["changeme", "password", "12345", "abcdef"];
    if weak_fragments.iter().any(|pattern| lower.contains(pattern)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some(
            "JWT secret appears to be weak; use a cryptographically strong random string".into(),
        );
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("rental_booking_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default; it must come from a file or APP__JWT_SECRET.
    let config = Config::builder()
        .set_default("database_url", "sqlite://rentals.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET environment variable with a secure random string (minimum 64 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    fn base_config() -> AppConfig {
        let mut cfg = AppConfig::new(
            "sqlite://rentals.db?mode=memory".into(),
            "redis://127.0.0.1:6379".into(),
            "k3Jd9vQ2mXz7LpR4tWb8NcY6hFs1GaE5uKo0iVj3qZx9rTn2wMy7pLc4dBh8fSg6".into(),
            3600,
            "127.0.0.1".into(),
            8080,
            "production".into(),
        );
        cfg.payment_webhook_secret = Some("whsec_test".into());
        cfg
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn production_requires_webhook_secret() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.payment_webhook_secret = None;
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("payment_webhook_secret"));
    }

    #[test]
    fn webhook_secret_only_required_in_production() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.payment_webhook_secret = None;
        cfg.environment = "staging".into();
        assert!(!cfg.is_production());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn zero_event_channel_capacity_is_rejected() {
        let mut cfg = base_config();
        assert!(cfg.validate().is_ok());
        cfg.event_channel_capacity = 0;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("event_channel_capacity"));
    }

    #[test]
    fn reminder_hour_out_of_range_is_rejected() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.reminder_hour = 24;
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("reminder_hour"));
    }

    #[test]
    fn weak_jwt_secret_is_rejected() {
        assert!(validate_jwt_secret("short").is_err());
        assert!(validate_jwt_secret(&"a".repeat(80)).is_err());
        assert!(validate_jwt_secret(DEV_DEFAULT_JWT_SECRET).is_ok());
    }

    #[test]
    fn queue_backend_accepts_known_values_only() {
        assert!(validate_message_queue_backend("redis").is_ok());
        assert!(validate_message_queue_backend("In-Memory").is_ok());
        assert!(validate_message_queue_backend("kafka").is_err());
    }

    #[test]
    fn provider_configuration_flags() {
        let mut cfg = base_config();
        assert!(!cfg.email_configured());
        assert!(!cfg.sms_configured());
        cfg.email_api_url = Some("https://mail.example.com/v3/mail/send".into());
        cfg.email_api_key = Some("key".into());
        cfg.sms_account_sid = Some("AC1".into());
        cfg.sms_auth_token = Some("tok".into());
        cfg.sms_from_number = Some("+15550001111".into());
        assert!(cfg.email_configured());
        assert!(cfg.sms_configured());
    }
}
