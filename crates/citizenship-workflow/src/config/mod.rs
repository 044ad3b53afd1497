use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let reference_prefix = env::var("APP_REFERENCE_PREFIX")
            .unwrap_or_else(|_| WorkflowConfig::DEFAULT_REFERENCE_PREFIX.to_string());
        let workflow = WorkflowConfig::new(reference_prefix)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            workflow,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the application workflow itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    reference_prefix: String,
}

impl WorkflowConfig {
    pub const DEFAULT_REFERENCE_PREFIX: &'static str = "SPK";

    pub fn new(reference_prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let reference_prefix = reference_prefix.into().trim().to_ascii_uppercase();
        if reference_prefix.is_empty()
            || !reference_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::InvalidReferencePrefix(reference_prefix));
        }

        Ok(Self { reference_prefix })
    }

    /// Leading segment of every application reference number.
    pub fn reference_prefix(&self) -> &str {
        &self.reference_prefix
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            reference_prefix: Self::DEFAULT_REFERENCE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidReferencePrefix(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidReferencePrefix(value) => write!(
                f,
                "APP_REFERENCE_PREFIX must be non-empty ASCII alphanumeric (found '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidReferencePrefix(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
