//! Logging configuration for tval-guard.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary through [`setup::init_logging`].

/// Controls how much detail the validation stages log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to log each check's query text before it runs
    pub log_check_queries: bool,
    /// Whether to log file-level load operations
    pub log_load_operations: bool,
    /// Maximum length for logged field values such as SQL text
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_check_queries: false,
            log_load_operations: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging rule definitions.
    pub fn verbose() -> Self {
        Self {
            log_check_queries: true,
            log_load_operations: true,
            max_field_length: 1024,
        }
    }

    /// Truncates `value` with this configuration's field limit.
    pub fn field(&self, value: &str) -> String {
        truncate_field(value, self.max_field_length)
    }
}

/// Truncates a string to the maximum field length if needed.
///
/// The cut always lands on a char boundary, so multi-byte text is safe.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Subscriber installation for the `tval` binary.
pub mod setup {
    use crate::error::{Result, TvalError};
    use tracing::Level;

    /// Configuration for installing the global subscriber.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for dependencies such as DataFusion
        pub level: Level,
        /// Log level for tval-guard itself
        pub tval_level: Level,
        /// Whether to use JSON output format
        pub json_format: bool,
        /// Environment filter override
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::WARN,
                tval_level: Level::INFO,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// Creates a JSON configuration for log shippers.
        pub fn structured() -> Self {
            Self {
                level: Level::WARN,
                tval_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        /// Sets the log level for tval-guard components.
        pub fn with_tval_level(mut self, level: Level) -> Self {
            self.tval_level = level;
            self
        }

        /// Sets whether to use JSON output format.
        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        /// Sets a custom environment filter.
        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Builds the environment filter string.
        pub fn env_filter(&self) -> String {
            match &self.env_filter {
                Some(filter) => filter.clone(),
                None => format!(
                    "{},tval_guard={},tval={}",
                    self.level.as_str().to_lowercase(),
                    self.tval_level.as_str().to_lowercase(),
                    self.tval_level.as_str().to_lowercase()
                ),
            }
        }
    }

    /// Installs the global subscriber. `RUST_LOG` takes precedence over the
    /// configured filter.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use tval_guard::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::default().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TvalError::Configuration(format!("failed to install logger: {e}")))
    }
}
