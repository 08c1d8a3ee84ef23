use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::{info, warn};
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Wallet payment gateway settings. Credentials are optional at startup;
/// checkout fails with a configuration error when they are missing.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    #[serde(default)]
    pub partner_code: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Synchronous create-payment endpoint.
    #[serde(default = "default_gateway_api_url")]
    pub api_url: String,

    /// Where the gateway sends the user after payment.
    #[serde(default)]
    pub redirect_url: Option<String>,
    /// Server-to-server notification (IPN) endpoint.
    #[serde(default)]
    pub ipn_url: Option<String>,

    /// Bound on the create-payment HTTP call.
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn has_credentials(&self) -> bool {
        self.partner_code.is_some() && self.access_key.is_some() && self.secret_key.is_some()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            partner_code: None,
            access_key: None,
            secret_key: None,
            api_url: default_gateway_api_url(),
            redirect_url: None,
            ipn_url: None,
            request_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

fn default_gateway_api_url() -> String {
    "https://test-payment.momo.vn/v2/gateway/api/create".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    15
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret used to verify bearer tokens issued by the auth service
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Create tables from entity definitions on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Frontend base URL for post-payment redirects
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Payment gateway settings
    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Loads configuration from layered files and environment variables.
///
/// Precedence, lowest first: `config/default.toml`, `config/{environment}.toml`,
/// then `APP__`-prefixed environment variables (`APP__GATEWAY__SECRET_KEY=...`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }
    let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    if !app_config.gateway.has_credentials() {
        warn!("Payment gateway credentials are incomplete; checkout will be rejected until APP__GATEWAY__PARTNER_CODE / ACCESS_KEY / SECRET_KEY are set");
    }

    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Tracing initialized at level {}", log_level);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            frontend_url: default_frontend_url(),
            gateway: GatewayConfig::default(),
        }
    }

    #[test]
    fn gateway_credentials_detection() {
        let mut cfg = base_config();
        assert!(!cfg.gateway.has_credentials());

        cfg.gateway.partner_code = Some("MOMO".into());
        cfg.gateway.access_key = Some("key".into());
        assert!(!cfg.gateway.has_credentials());

        cfg.gateway.secret_key = Some("secret".into());
        assert!(cfg.gateway.has_credentials());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "too-short".into();
        assert!(cfg.validate().is_err());
    }
}
