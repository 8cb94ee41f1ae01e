//! Structured gateway logging.
//!
//! Components log through a [`GatewayLogger`], which filters by
//! [`Verbosity`], tags each record with a category and optional auxiliary JSON,
//! and hands the record either to an external callback or to the `log` facade.
//! Nothing here writes to stdout: stdout carries protocol frames.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Verbosity;

/// `log` target used by the default sink.
pub const LOG_TARGET: &str = "stagehand_mcp";

/// Convenience alias for external logging callbacks.
pub type LogCallback = Arc<dyn Fn(&GatewayLogRecord) + Send + Sync + 'static>;

#[derive(Clone, Default)]
pub struct LogConfig {
    pub verbose: Verbosity,
    pub external_logger: Option<LogCallback>,
}

impl LogConfig {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level == LogLevel::Error || level.as_u8() <= self.verbose.as_u8()
    }
}

/// Log severity used across the gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

/// Structured log entry shared with external callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayLogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Value>,
}

impl GatewayLogRecord {
    pub fn new(
        message: impl Into<String>,
        level: LogLevel,
        category: Option<String>,
        auxiliary: Option<Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
            category,
            auxiliary,
        }
    }
}

/// Default sink: forward the record to the `log` facade.
pub fn forward_to_log(record: &GatewayLogRecord) {
    let level = record.level.as_log_level();
    let category = record.category.as_deref().unwrap_or("gateway");
    match record.auxiliary.as_ref().filter(|aux| !aux.is_null()) {
        Some(aux) => log::log!(target: LOG_TARGET, level, "[{category}] {} {aux}", record.message),
        None => log::log!(target: LOG_TARGET, level, "[{category}] {}", record.message),
    }
}

#[derive(Clone)]
pub struct GatewayLogger {
    config: LogConfig,
    default_handler: LogCallback,
}

impl fmt::Debug for GatewayLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayLogger")
            .field("verbosity", &self.config.verbose)
            .field("external_logger", &self.config.external_logger.is_some())
            .finish()
    }
}

impl Default for GatewayLogger {
    fn default() -> Self {
        Self::new(Verbosity::default())
    }
}

impl GatewayLogger {
    pub fn with_config(config: LogConfig) -> Self {
        Self {
            config,
            default_handler: Arc::new(forward_to_log),
        }
    }

    pub fn new(verbose: Verbosity) -> Self {
        Self::with_config(LogConfig::new(verbose))
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn set_external_logger(&mut self, logger: Option<LogCallback>) {
        self.config.external_logger = logger;
    }

    pub fn log(
        &self,
        message: impl Into<String>,
        level: LogLevel,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        if !self.config.should_log(level) {
            return;
        }

        let record =
            GatewayLogRecord::new(message, level, category.map(|c| c.to_string()), auxiliary);

        if let Some(callback) = &self.config.external_logger {
            callback(&record);
        } else {
            (self.default_handler)(&record);
        }
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Error, category, auxiliary);
    }

    pub fn info(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Info, category, auxiliary);
    }

    pub fn debug(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Debug, category, auxiliary);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Logger that captures every record regardless of verbosity.
    pub(crate) fn capturing_logger() -> (GatewayLogger, Arc<Mutex<Vec<GatewayLogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&records);
        let mut logger = GatewayLogger::new(Verbosity::Detailed);
        logger.set_external_logger(Some(Arc::new(move |record: &GatewayLogRecord| {
            capture.lock().unwrap().push(record.clone());
        })));
        (logger, records)
    }

    #[test]
    fn respects_verbosity() {
        let logger = GatewayLogger::new(Verbosity::Minimal);
        assert!(logger.config().should_log(LogLevel::Error));
        assert!(!logger.config().should_log(LogLevel::Info));
        assert!(!logger.config().should_log(LogLevel::Debug));

        let logger = GatewayLogger::new(Verbosity::Medium);
        assert!(logger.config().should_log(LogLevel::Info));
        assert!(!logger.config().should_log(LogLevel::Debug));
    }

    #[test]
    fn external_logger_is_invoked() {
        let (logger, records) = capturing_logger();

        logger.info(
            "Tool called",
            Some("tool"),
            Some(serde_json::json!({ "name": "navigate" })),
        );

        let values = records.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].message, "Tool called");
        assert_eq!(values[0].category.as_deref(), Some("tool"));
        assert_eq!(values[0].level, LogLevel::Info);
        assert_eq!(
            values[0].auxiliary.as_ref().unwrap(),
            &serde_json::json!({ "name": "navigate" })
        );
    }

    #[test]
    fn filtered_records_never_reach_the_sink() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&records);
        let mut config = LogConfig::new(Verbosity::Minimal);
        config.external_logger = Some(Arc::new(move |record: &GatewayLogRecord| {
            capture.lock().unwrap().push(record.clone());
        }));
        let logger = GatewayLogger::with_config(config);

        logger.debug("noise", None, None);
        logger.info("still noise", None, None);
        logger.error("close failed", Some("session"), None);

        let values = records.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].level, LogLevel::Error);
    }

    #[test]
    fn record_serialises_without_empty_fields() {
        let record = GatewayLogRecord::new("hello", LogLevel::Debug, None, None);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["level"], "debug");
        assert!(value.get("category").is_none());
        assert!(value.get("auxiliary").is_none());
    }
}
