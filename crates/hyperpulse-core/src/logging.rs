//! Logging configuration
//!
//! The core only emits `tracing` events; hosts install a subscriber
//! configured from [`LogConfig`].

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Logging settings shared by hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level ("error", "warn", "info", "debug", "trace")
    pub level: String,
    /// Write log lines to stderr
    pub console_output: bool,
    /// Colorize console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Parse the configured level, falling back to INFO
    pub fn parse_level(&self) -> LevelFilter {
        self.level.trim().parse().unwrap_or(LevelFilter::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        let mut config = LogConfig::default();
        assert_eq!(config.parse_level(), LevelFilter::INFO);

        config.level = "debug".to_string();
        assert_eq!(config.parse_level(), LevelFilter::DEBUG);

        config.level = "loud".to_string();
        assert_eq!(config.parse_level(), LevelFilter::INFO);
    }
}
