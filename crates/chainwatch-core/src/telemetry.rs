//! Tracing / logging initialisation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::ConfigError;

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Global default level or a full directive string
    /// ("info", "warn,chainwatch_ws=debug").
    pub level: String,
    /// Per-crate overrides, e.g. `chainwatch-ws → debug`.
    pub components: BTreeMap<String, String>,
    /// JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Parse `LOG_COMPONENTS`: comma-separated `crate=level` pairs.
    pub fn parse_components(spec: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        spec.split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((component, level)) if !component.trim().is_empty() && !level.trim().is_empty() => {
                    Ok((component.trim().to_string(), level.trim().to_ascii_lowercase()))
                }
                _ => Err(ConfigError::Invalid {
                    var: "LOG_COMPONENTS",
                    reason: format!("expected 'crate=level', got '{pair}'"),
                }),
            })
            .collect()
    }

    /// The `EnvFilter` directive string, e.g. `"info,chainwatch_ws=debug"`.
    pub fn directives(&self) -> String {
        self.components
            .iter()
            .fold(self.level.clone(), |mut acc, (component, level)| {
                acc.push_str(&format!(",{}={}", component.replace('-', "_"), level));
                acc
            })
    }

    pub fn filter(&self) -> Result<EnvFilter, ConfigError> {
        EnvFilter::try_new(self.directives()).map_err(|e| ConfigError::Invalid {
            var: "LOG_LEVEL",
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber. A subscriber that is already installed
/// (tests, embedding binaries) is left in place.
pub fn init_tracing(config: &LogConfig) -> Result<(), ConfigError> {
    let filter = config.filter()?;
    let output = if config.json {
        fmt::layer().json().flatten_event(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    if tracing_subscriber::registry().with(filter).with(output).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_overrides_use_crate_names() {
        let config = LogConfig {
            components: LogConfig::parse_components("chainwatch-ws=debug, chainwatch-http=TRACE").unwrap(),
            ..LogConfig::default()
        };
        assert_eq!(
            config.directives(),
            "info,chainwatch_http=trace,chainwatch_ws=debug"
        );
        assert!(config.filter().is_ok());
    }

    #[test]
    fn malformed_component_pair_is_rejected() {
        let err = LogConfig::parse_components("chainwatch_ws").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "LOG_COMPONENTS", .. }));
        assert!(LogConfig::parse_components("").unwrap().is_empty());
    }

    #[test]
    fn bad_directive_is_a_config_error() {
        let config = LogConfig {
            level: "info,chainwatch_ws=loud".into(),
            ..LogConfig::default()
        };
        assert!(config.filter().is_err());
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn repeated_init_is_harmless() {
        assert!(init_tracing(&LogConfig::default()).is_ok());
        assert!(init_tracing(&LogConfig::default()).is_ok());
    }
}
