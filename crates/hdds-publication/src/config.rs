// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration.
//!
//! Passed explicitly to `PublicationEngine::new`; there is no process-wide
//! mutable state. With the `config-loaders` feature it can be read from
//! YAML:
//!
//! ```yaml
//! liveliness_factor: 80
//! publisher_content_filter: true
//! max_blocking_time_ms: 100
//! log:
//!   verbose: true
//!   tag: sensor_writer
//! ```

use std::time::Duration;

/// Verbose diagnostics switch, threaded through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub verbose: bool,
    /// Prefix for verbose messages.
    pub tag: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            tag: "writer".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Percent of the liveliness lease after which the writer asserts.
    pub liveliness_factor: u32,
    /// Evaluate reader content filters on the writer side.
    pub publisher_content_filter: bool,
    /// Used when the writer QoS leaves max_blocking_time at zero.
    pub max_blocking_time_default: Duration,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            liveliness_factor: 80,
            publisher_content_filter: true,
            max_blocking_time_default: Duration::from_millis(100),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn liveliness_factor(mut self, percent: u32) -> Self {
        self.liveliness_factor = percent;
        self
    }

    #[must_use]
    pub fn publisher_content_filter(mut self, enabled: bool) -> Self {
        self.publisher_content_filter = enabled;
        self
    }

    #[must_use]
    pub fn max_blocking_time_default(mut self, duration: Duration) -> Self {
        self.max_blocking_time_default = duration;
        self
    }

    #[must_use]
    pub fn verbose(mut self, tag: &str) -> Self {
        self.log = LogConfig {
            verbose: true,
            tag: tag.to_string(),
        };
        self
    }
}

#[cfg(feature = "config-loaders")]
mod yaml {
    use super::{EngineConfig, LogConfig};
    use crate::error::{Error, Result};
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct YamlEngineConfig {
        liveliness_factor: Option<u32>,
        publisher_content_filter: Option<bool>,
        max_blocking_time_ms: Option<u64>,
        log: Option<YamlLogConfig>,
    }

    #[derive(Debug, Deserialize, Default)]
    #[serde(default)]
    struct YamlLogConfig {
        verbose: Option<bool>,
        tag: Option<String>,
    }

    impl EngineConfig {
        /// Parse a YAML document; absent keys keep their defaults.
        pub fn from_yaml_str(content: &str) -> Result<Self> {
            let doc: YamlEngineConfig = serde_yaml::from_str(content)
                .map_err(|e| Error::BadParameter(format!("engine config: {}", e)))?;
            let mut config = EngineConfig::default();
            if let Some(factor) = doc.liveliness_factor {
                if factor == 0 || factor > 100 {
                    return Err(Error::BadParameter(format!(
                        "liveliness_factor {} out of range 1..=100",
                        factor
                    )));
                }
                config.liveliness_factor = factor;
            }
            if let Some(enabled) = doc.publisher_content_filter {
                config.publisher_content_filter = enabled;
            }
            if let Some(ms) = doc.max_blocking_time_ms {
                config.max_blocking_time_default = Duration::from_millis(ms);
            }
            if let Some(log) = doc.log {
                let defaults = LogConfig::default();
                config.log = LogConfig {
                    verbose: log.verbose.unwrap_or(defaults.verbose),
                    tag: log.tag.unwrap_or(defaults.tag),
                };
            }
            Ok(config)
        }

        pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
            let content = fs::read_to_string(path.as_ref())?;
            Self::from_yaml_str(&content)
        }
    }

}
