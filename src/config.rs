use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const SESSION_FILE_NAME: &str = "session.json";
const SESSION_DIR_NAME: &str = ".pharmacy-putaway";
pub const CLI_HOME_ENV: &str = "PUTAWAY_CLI_HOME";

/// Client configuration, layered from defaults, `config/*.toml` and `APP__*` variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the inventory API, including the `/api` prefix
    #[validate(custom = "validate_base_url")]
    pub api_base_url: String,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Page size for the pending queues
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub default_page_size: u32,

    /// Page size used when loading the location cache
    #[serde(default = "default_location_page_size")]
    #[validate(range(min = 1, max = 1000))]
    pub location_page_size: u32,

    /// Maximum number of autocomplete suggestions
    #[serde(default = "default_location_suggestion_limit")]
    #[validate(range(min = 1, max = 50))]
    pub location_suggestion_limit: usize,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Where the CLI keeps its bearer token
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// Colour the commit audit log
    #[serde(default = "default_true_bool")]
    pub audit_color: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            request_timeout_secs: default_request_timeout_secs(),
            default_page_size: default_page_size(),
            location_page_size: default_location_page_size(),
            location_suggestion_limit: default_location_suggestion_limit(),
            event_channel_capacity: default_event_channel_capacity(),
            session_file: None,
            audit_color: true,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Session file location, falling back to `$PUTAWAY_CLI_HOME` and then `$HOME`.
    pub fn session_path(&self) -> Option<PathBuf> {
        resolve_session_path(
            self.session_file.as_deref(),
            env::var_os(CLI_HOME_ENV).map(PathBuf::from),
            env::var_os("HOME").map(PathBuf::from),
        )
    }
}

fn resolve_session_path(
    explicit: Option<&Path>,
    cli_home: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(dir) = cli_home.filter(|d| !d.as_os_str().is_empty()) {
        return Some(dir.join(SESSION_FILE_NAME));
    }
    home.filter(|d| !d.as_os_str().is_empty())
        .map(|dir| dir.join(SESSION_DIR_NAME).join(SESSION_FILE_NAME))
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    10
}

fn default_location_page_size() -> u32 {
    1000
}

fn default_location_suggestion_limit() -> usize {
    10
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_true_bool() -> bool {
    true
}

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => {
            let mut err = ValidationError::new("api_base_url");
            err.message = Some("Must be an absolute http or https URL".into());
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
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("pharmacy_putaway={},putaway={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
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
    load_config_from(Path::new(CONFIG_DIR))
}

pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let defaults = AppConfig::default();
    let config = Config::builder()
        .set_default("api_base_url", defaults.api_base_url)?
        .set_default("environment", run_env.clone())?
        .set_default("log_level", defaults.log_level)?
        .set_default("log_json", defaults.log_json)?
        .add_source(File::with_name(&config_dir.join("default").to_string_lossy()).required(false))
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
