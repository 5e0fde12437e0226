//! Configuration for Barbercast

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "BARBERCAST_CONFIG";

/// Prefix for environment overrides, e.g. `BARBERCAST__DATABASE__URL`
pub const ENV_PREFIX: &str = "BARBERCAST";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Campaign dispatcher configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Shared token required on non-health routes. Auth is off when unset.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            auth_token: None,
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Campaign dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// IANA timezone used for sending hours and the daily counter rollover
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Country calling code enforced on recipient numbers
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Timeout for each gateway HTTP call in seconds
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// A campaign stuck in `sending` without progress for this long may be
    /// claimed by a new run
    #[serde(default = "default_claim_stale_after")]
    pub claim_stale_after_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            country_code: default_country_code(),
            gateway_timeout_secs: default_gateway_timeout(),
            claim_stale_after_secs: default_claim_stale_after(),
        }
    }
}

impl DispatcherConfig {
    /// Parse the configured timezone
    pub fn tz(&self) -> crate::Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            crate::Error::Config(format!("Invalid timezone '{}': {}", self.timezone, e))
        })
    }
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

fn default_country_code() -> String {
    crate::types::DEFAULT_COUNTRY_CODE.to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_claim_stale_after() -> u64 {
    1800
}

impl Config {
    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, layered with environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        Self::build(Some(path))
    }

    /// Load configuration from the default locations and the environment
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(Path::new(&path));
        }

        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/barbercast/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // Environment-only deployments
        Self::build(None)
    }

    fn build(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> crate::Result<()> {
        if self.database.url.is_empty() {
            return Err(crate::Error::Config("database.url must be set".to_string()));
        }
        self.dispatcher.tz()?;
        if self.dispatcher.country_code.is_empty()
            || !self.dispatcher.country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(crate::Error::Config(format!(
                "dispatcher.country_code must be digits, got '{}'",
                self.dispatcher.country_code
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_address, "0.0.0.0");

        let dispatcher = DispatcherConfig::default();
        assert_eq!(dispatcher.timezone, "America/Sao_Paulo");
        assert_eq!(dispatcher.country_code, "55");
        assert_eq!(dispatcher.tz().unwrap(), chrono_tz::America::Sao_Paulo);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "postgres://localhost/barbercast"

[api]
port = 9090
auth_token = "secret"

[dispatcher]
timezone = "America/Manaus"
"#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/barbercast");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.api.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.dispatcher.timezone, "America/Manaus");
        assert_eq!(config.dispatcher.gateway_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let toml = r#"
[database]
url = "postgres://localhost/barbercast"

[dispatcher]
timezone = "Mars/Olympus_Mons"
"#;

        let err = Config::from_toml_str(toml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_rejects_non_digit_country_code() {
        let toml = r#"
[database]
url = "postgres://localhost/barbercast"

[dispatcher]
country_code = "+55"
"#;

        assert!(Config::from_toml_str(toml).is_err());
    }
}
