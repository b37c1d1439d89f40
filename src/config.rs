use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_ESTIMATED_DELIVERY_MINUTES: i64 = 45;
const DEFAULT_COUPON_CODE_MAX_LENGTH: usize = 32;
const CONFIG_DIR: &str = "config";

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_estimated_delivery_minutes() -> i64 {
    DEFAULT_ESTIMATED_DELIVERY_MINUTES
}

fn default_coupon_code_max_length() -> usize {
    DEFAULT_COUPON_CODE_MAX_LENGTH
}

/// Checkout core configuration, layered from `config/*.toml` files with a
/// `CHECKOUT__`-prefixed environment overlay.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Deployment environment name ("development", "production", ...)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Default tracing filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// ISO currency code used for display rounding
    #[validate(length(min = 3, max = 3))]
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Window added to the placement time for ASAP estimated delivery
    #[validate(range(min = 1, max = 1440))]
    #[serde(default = "default_estimated_delivery_minutes")]
    pub estimated_delivery_minutes: i64,

    /// Upper bound on accepted coupon code length after trimming
    #[validate(range(min = 1, max = 128))]
    #[serde(default = "default_coupon_code_max_length")]
    pub coupon_code_max_length: usize,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            currency: default_currency(),
            estimated_delivery_minutes: default_estimated_delivery_minutes(),
            coupon_code_max_length: default_coupon_code_max_length(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl CheckoutConfig {
    /// Loads configuration from `config/default.toml`, an optional
    /// environment-specific file, and `CHECKOUT__*` environment variables,
    /// in increasing precedence.
    pub fn load() -> Result<Self, CheckoutConfigError> {
        let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let settings = Config::builder()
            .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
            .add_source(Environment::with_prefix("CHECKOUT").separator("__"))
            .build()?;

        let config: CheckoutConfig = settings.try_deserialize()?;
        config.validate()?;

        info!(environment = %config.environment, "Loaded checkout configuration");
        Ok(config)
    }
}
