//! Controller process configuration from environment variables
//!
//! - `EDS_HEALTH_PORT`: port of the health and metrics server (default 8080)
//! - `EDS_WATCH_NAMESPACE`: restrict both controllers to one namespace (default: all)

use thiserror::Error;

pub const DEFAULT_HEALTH_PORT: u16 = 8080;

pub const ENV_HEALTH_PORT: &str = "EDS_HEALTH_PORT";
pub const ENV_WATCH_NAMESPACE: &str = "EDS_WATCH_NAMESPACE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a port number, got {value:?}")]
    InvalidPort { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub health_port: u16,
    /// None watches every namespace
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            health_port: DEFAULT_HEALTH_PORT,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let health_port = match get(ENV_HEALTH_PORT) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort {
                    name: ENV_HEALTH_PORT,
                    value,
                })?,
            None => DEFAULT_HEALTH_PORT,
        };

        Ok(Self {
            health_port,
            watch_namespace: get(ENV_WATCH_NAMESPACE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<ControllerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(from(&[]), Ok(ControllerConfig::default()));
    }

    #[test]
    fn test_reads_port_and_namespace() {
        let config = from(&[(ENV_HEALTH_PORT, "9090"), (ENV_WATCH_NAMESPACE, "agents")]);
        assert_eq!(
            config,
            Ok(ControllerConfig {
                health_port: 9090,
                watch_namespace: Some("agents".to_string()),
            })
        );
    }

    #[test]
    fn test_empty_namespace_watches_all() {
        let config = from(&[(ENV_WATCH_NAMESPACE, " ")]);
        assert_eq!(config.map(|c| c.watch_namespace), Ok(None));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert_eq!(
            from(&[(ENV_HEALTH_PORT, "http")]),
            Err(ConfigError::InvalidPort {
                name: ENV_HEALTH_PORT,
                value: "http".to_string(),
            })
        );
    }
}
