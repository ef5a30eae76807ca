use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::allocation::{AllocationPolicy, MAX_COURSES_PER_FACULTY};

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

/// Top-level configuration for the allocation service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub allocation: AllocationConfig,
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
        let with_targets = match env::var("APP_LOG_TARGETS") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                var: "APP_LOG_TARGETS",
            })?,
            Err(_) => false,
        };

        let max_courses_per_faculty = match env::var("APP_MAX_COURSES_PER_FACULTY") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidNumber {
                    var: "APP_MAX_COURSES_PER_FACULTY",
                })
                .and_then(|value| {
                    if value > MAX_COURSES_PER_FACULTY {
                        Err(ConfigError::OutOfRange {
                            var: "APP_MAX_COURSES_PER_FACULTY",
                            max: MAX_COURSES_PER_FACULTY,
                        })
                    } else {
                        Ok(value)
                    }
                })?,
            Err(_) => MAX_COURSES_PER_FACULTY,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                with_targets,
            },
            allocation: AllocationConfig {
                max_courses_per_faculty,
            },
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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
    pub with_targets: bool,
}

/// Workload limits applied by the allocation engine and the override operations.
#[derive(Debug, Clone, Copy)]
pub struct AllocationConfig {
    pub max_courses_per_faculty: usize,
}

impl AllocationConfig {
    pub fn policy(&self) -> AllocationPolicy {
        AllocationPolicy::new(self.max_courses_per_faculty)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    OutOfRange { var: &'static str, max: usize },
    InvalidFlag { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a positive integer")
            }
            ConfigError::OutOfRange { var, max } => {
                write!(f, "{var} must not exceed {max}")
            }
            ConfigError::InvalidFlag { var } => {
                write!(f, "{var} must be one of true/false/1/0/yes/no/on/off")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. }
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
