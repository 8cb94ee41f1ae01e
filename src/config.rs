//! Gateway configuration.
//!
//! A [`GatewayConfig`] is resolved once, when the gateway is constructed, from
//! three layers: built-in defaults, environment variables (with optional
//! `.env` support) and host-supplied overrides such as CLI flags. It is
//! read-only afterwards.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use thiserror::Error;

/// Model used when neither the host nor the environment picks one.
pub const DEFAULT_MODEL_NAME: &str = "openai/gpt-4.1-mini";

/// Default DOM settle timeout, in milliseconds.
pub const DEFAULT_DOM_SETTLE_TIMEOUT_MS: u64 = 3_000;

/// Verbosity level for gateway logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Minimal,
    #[default]
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }

    /// Map a repeated `-v` flag count onto a level, saturating at detailed.
    pub fn from_flag_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Medium,
            _ => Verbosity::Detailed,
        }
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Resolved, immutable configuration for one gateway instance.
#[derive(Clone, PartialEq)]
pub struct GatewayConfig {
    pub model_name: String,
    pub model_api_key: Option<String>,
    /// OpenAI-compatible endpoint used instead of the default API base.
    pub model_base_url: Option<String>,
    pub executable_path: Option<PathBuf>,
    pub headless: bool,
    /// Remote-debugging endpoint of an already running browser.
    pub cdp_url: Option<String>,
    pub verbose: Verbosity,
    pub dom_settle_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_api_key: env_var("OPENAI_API_KEY"),
            model_base_url: None,
            executable_path: None,
            headless: false,
            cdp_url: None,
            verbose: Verbosity::default(),
            dom_settle_timeout_ms: DEFAULT_DOM_SETTLE_TIMEOUT_MS,
        }
    }
}

impl GatewayConfig {
    /// Apply defaults to host-supplied overrides.
    pub fn resolve(overrides: GatewayConfigOverrides) -> Self {
        GatewayConfig::default().with_overrides(overrides)
    }

    /// Construct a configuration by reading relevant environment variables, after
    /// loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = GatewayConfig::default();

        if let Some(value) = env_var("MODEL_NAME") {
            config.model_name = value;
        }

        if let Some(value) = env_var("MODEL_API_KEY").or_else(|| env_var("OPENAI_API_KEY")) {
            config.model_api_key = Some(value);
        }

        if let Some(value) = env_var("MODEL_BASE_URL") {
            config.model_base_url = Some(value);
        }

        if let Some(value) = env_var("STAGEHAND_EXECUTABLE_PATH") {
            config.executable_path = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("STAGEHAND_HEADLESS") {
            config.headless = parse_bool("STAGEHAND_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("STAGEHAND_CDP_URL") {
            config.cdp_url = Some(value);
        }

        if let Some(value) = env_var("STAGEHAND_VERBOSE") {
            let parsed = parse_u8("STAGEHAND_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                ConfigError::InvalidEnumVariant {
                    field: "STAGEHAND_VERBOSE",
                    value: parsed.to_string(),
                }
            })?;
        }

        if let Some(value) = env_var("STAGEHAND_DOM_SETTLE_TIMEOUT_MS") {
            config.dom_settle_timeout_ms = parse_u64("STAGEHAND_DOM_SETTLE_TIMEOUT_MS", &value)?;
        }

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    ///
    /// Blank strings in `overrides` are treated as unset.
    pub fn with_overrides(&self, overrides: GatewayConfigOverrides) -> GatewayConfig {
        let mut next = self.clone();

        if let Some(value) = non_blank(overrides.model_name) {
            next.model_name = value;
        }
        if let Some(value) = non_blank(overrides.model_api_key) {
            next.model_api_key = Some(value);
        }
        if let Some(value) = non_blank(overrides.model_base_url) {
            next.model_base_url = Some(value);
        }
        if let Some(value) = non_blank(overrides.executable_path) {
            next.executable_path = Some(PathBuf::from(value));
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = non_blank(overrides.cdp_url) {
            next.cdp_url = Some(value);
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.dom_settle_timeout_ms {
            next.dom_settle_timeout_ms = value;
        }

        next
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("model_name", &self.model_name)
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "<redacted>"))
            .field("model_base_url", &self.model_base_url)
            .field("executable_path", &self.executable_path)
            .field("headless", &self.headless)
            .field("cdp_url", &self.cdp_url)
            .field("verbose", &self.verbose)
            .field("dom_settle_timeout_ms", &self.dom_settle_timeout_ms)
            .finish()
    }
}

/// Host-supplied configuration; every field is optional.
#[derive(Default, Clone, PartialEq)]
pub struct GatewayConfigOverrides {
    pub model_name: Option<String>,
    pub model_api_key: Option<String>,
    pub model_base_url: Option<String>,
    pub executable_path: Option<String>,
    pub headless: Option<bool>,
    pub cdp_url: Option<String>,
    pub verbose: Option<Verbosity>,
    pub dom_settle_timeout_ms: Option<u64>,
}

impl fmt::Debug for GatewayConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfigOverrides")
            .field("model_name", &self.model_name)
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "<redacted>"))
            .field("model_base_url", &self.model_base_url)
            .field("executable_path", &self.executable_path)
            .field("headless", &self.headless)
            .field("cdp_url", &self.cdp_url)
            .field("verbose", &self.verbose)
            .field("dom_settle_timeout_ms", &self.dom_settle_timeout_ms)
            .finish()
    }
}

impl GatewayConfigOverrides {
    pub fn model_name(mut self, value: impl Into<String>) -> Self {
        self.model_name = Some(value.into());
        self
    }

    pub fn model_api_key(mut self, value: impl Into<String>) -> Self {
        self.model_api_key = Some(value.into());
        self
    }

    pub fn headless(mut self, value: bool) -> Self {
        self.headless = Some(value);
        self
    }

    pub fn cdp_url(mut self, value: impl Into<String>) -> Self {
        self.cdp_url = Some(value.into());
        self
    }
}

/// Errors that can arise while constructing a [`GatewayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

fn env_var(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}
