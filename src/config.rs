use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CURRENCY: &str = "INR";
const CONFIG_DIR: &str = "config";

/// Application configuration with validation. Values are layered from
/// `config/default.toml`, an environment-specific file, and `APP__`-prefixed
/// environment variables (highest precedence).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key used to verify actor bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Payment provider key id (public half, returned to clients when
    /// initiating a payment intent)
    #[serde(default)]
    pub payment_key_id: Option<String>,

    /// Payment provider secret used for signature verification
    #[validate(length(min = 16))]
    pub payment_key_secret: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment ("development", "test", "production")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Currency code stamped on orders and ledger rows
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Push notification endpoint; no endpoint disables outbound pushes
    #[serde(default)]
    pub push_endpoint: Option<String>,

    /// Push notification server key
    #[serde(default)]
    pub push_server_key: Option<String>,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
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
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Construct a configuration programmatically (used by tests).
    pub fn new(database_url: String, jwt_secret: String, payment_key_secret: String) -> Self {
        Self {
            database_url,
            jwt_secret,
            payment_key_id: None,
            payment_key_secret,
            host: default_host(),
            port: default_port(),
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            currency: default_currency(),
            push_endpoint: None,
            push_server_key: None,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Loads configuration from files and environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    let config_dir = env::var("APP_CONFIG_DIR").unwrap_or_else(|_| CONFIG_DIR.to_string());

    let mut builder = Config::builder();

    let default_file = Path::new(&config_dir).join("default.toml");
    if default_file.exists() {
        builder = builder.add_source(File::from(default_file));
    }
    let env_file = Path::new(&config_dir).join(format!("{run_env}.toml"));
    if env_file.exists() {
        builder = builder.add_source(File::from(env_file));
    }

    let settings = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let cfg: AppConfig = settings.try_deserialize()?;
    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %cfg.environment, "Configuration loaded");
    Ok(cfg)
}

/// Initializes the tracing subscriber. Safe to call once at startup.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
