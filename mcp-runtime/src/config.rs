//! Command-line and environment configuration.
//!
//! Flags win over environment variables (clap `env` fallbacks); `.env` is
//! loaded by the binary before parsing.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use thiserror::Error;
use url::Url;

use crate::client::{
    ClientOptions, DEFAULT_ENDPOINT, DEFAULT_RATE_LIMIT_PER_SEC, HttpTransport, ValidationMode,
    VendorClient,
};
use crate::resilience::{DEFAULT_MAX_RETRIES, RetryPolicy};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 300;
pub const MAX_RETRIES_LIMIT: u32 = 10;
pub const MAX_RATE_LIMIT: u32 = 1000;

#[derive(Args, Clone, Default)]
pub struct RuntimeConfig {
    /// Replicated vendor-portal API token
    #[arg(long, env = "REPLICATED_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
    /// Log level: fatal, error, info, debug or trace
    #[arg(long, env = "LOG_LEVEL", default_value = "fatal")]
    pub log_level: String,
    /// Per-request timeout in seconds (1-300)
    #[arg(long, env = "TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
    /// Vendor API base URL
    #[arg(long, env = "ENDPOINT", hide = true)]
    pub endpoint: Option<String>,
    /// Retries for throttled or unavailable responses (0-10)
    #[arg(long, env = "REPLICATED_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    /// Outbound requests per second (1-1000)
    #[arg(long, env = "REPLICATED_RATE_LIMIT", default_value_t = DEFAULT_RATE_LIMIT_PER_SEC)]
    pub rate_limit: u32,
    /// Fail calls whose decoded entities violate validation rules
    #[arg(long, env = "REPLICATED_STRICT_VALIDATION")]
    pub strict_validation: bool,
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("api_token", &self.api_token.as_deref().map(redact))
            .field("log_level", &self.log_level)
            .field("timeout", &self.timeout)
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .field("rate_limit", &self.rate_limit)
            .field("strict_validation", &self.strict_validation)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration validation errors:\n  - {}", .problems.join("\n  - "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl ConfigError {
    fn single(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Fatal,
    Error,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const VALID: [&'static str; 5] = ["fatal", "error", "info", "debug", "trace"];

    /// `tracing` has no fatal level; fatal-only logging is the error filter.
    pub fn filter_directive(self) -> &'static str {
        match self {
            LogLevel::Fatal | LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fatal" => Ok(LogLevel::Fatal),
            "error" => Ok(LogLevel::Error),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "invalid log level '{raw}'. Valid levels are: {}",
                LogLevel::VALID.join(", ")
            )),
        }
    }
}

/// First four characters, then a mask.
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{prefix}****")
    }
}

/// Configuration that passed validation, in typed form.
#[derive(Clone)]
pub struct Settings {
    pub api_token: String,
    pub log_level: LogLevel,
    pub timeout: Duration,
    pub endpoint: Url,
    pub endpoint_overridden: bool,
    pub max_retries: u32,
    pub rate_limit: NonZeroU32,
    pub validation: ValidationMode,
}

impl RuntimeConfig {
    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let mut problems = Vec::new();

        let api_token = self
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if api_token.is_none() {
            problems.push(
                "API token is required. Set REPLICATED_API_TOKEN environment variable or use --api-token flag"
                    .to_string(),
            );
        }

        let log_level = match self.log_level.parse::<LogLevel>() {
            Ok(level) => Some(level),
            Err(problem) => {
                problems.push(problem);
                None
            }
        };

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            problems.push(format!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {}",
                self.timeout
            ));
        }

        let endpoint = match self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            None => Url::parse(DEFAULT_ENDPOINT).ok(),
            Some(raw) => match parse_endpoint(raw) {
                Ok(url) => Some(url),
                Err(problem) => {
                    problems.push(problem);
                    None
                }
            },
        };

        if self.max_retries > MAX_RETRIES_LIMIT {
            problems.push(format!(
                "max retries must be between 0 and {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            ));
        }

        let rate_limit = NonZeroU32::new(self.rate_limit).filter(|r| r.get() <= MAX_RATE_LIMIT);
        if rate_limit.is_none() {
            problems.push(format!(
                "rate limit must be between 1 and {MAX_RATE_LIMIT} requests per second, got {}",
                self.rate_limit
            ));
        }

        match (api_token, log_level, endpoint, rate_limit) {
            (Some(api_token), Some(log_level), Some(endpoint), Some(rate_limit))
                if problems.is_empty() =>
            {
                Ok(Settings {
                    api_token: api_token.to_string(),
                    log_level,
                    timeout: Duration::from_secs(self.timeout),
                    endpoint,
                    endpoint_overridden: self.endpoint.is_some(),
                    max_retries: self.max_retries,
                    rate_limit,
                    validation: if self.strict_validation {
                        ValidationMode::Strict
                    } else {
                        ValidationMode::Advisory
                    },
                })
            }
            _ => Err(ConfigError { problems }),
        }
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, String> {
    let hint = "must include scheme and host (e.g., https://api.example.com)";
    let url = Url::parse(raw).map_err(|e| format!("invalid endpoint URL '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(format!("invalid endpoint URL '{raw}': {hint}"));
    }
    Ok(url)
}

impl Settings {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
            rate_limit: Some(self.rate_limit),
            validation: self.validation,
            ..ClientOptions::default()
        }
    }

    pub fn build_client(&self) -> Result<VendorClient<HttpTransport>, ConfigError> {
        let transport = HttpTransport::new(self.endpoint.clone(), &self.api_token)
            .map_err(|e| ConfigError::single(e.to_string()))?;
        Ok(VendorClient::new(transport, self.client_options()))
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Config{{APIToken: {}, LogLevel: {}, Timeout: {}s, Endpoint: {}, MaxRetries: {}, RateLimit: {}/s, Validation: {}}}",
            redact(&self.api_token),
            self.log_level.as_str(),
            self.timeout.as_secs(),
            self.endpoint,
            self.max_retries,
            self.rate_limit,
            match self.validation {
                ValidationMode::Advisory => "advisory",
                ValidationMode::Strict => "strict",
            }
        )
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
