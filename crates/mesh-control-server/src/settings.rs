//! Server settings
//!
//! Loaded from an optional TOML file, then overridden by `MESHCTL__*`
//! environment variables (`__` separates nesting levels, e.g.
//! `MESHCTL__CONTROL_PLANE__REGISTRY__PROBE_INTERVAL_SECS=5`).

use config::{Config, Environment, File};
use mesh_control_service::ControlPlaneConfig;
use serde::Deserialize;
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MESHCTL";

/// Default config file looked up in the working directory
const DEFAULT_CONFIG_FILE: &str = "mesh-control";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub bind_address: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub url: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://mesh-control.db".to_string(),
        }
    }
}

/// Everything the server binary needs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub broker: BrokerSettings,
    pub database: DatabaseSettings,
    pub control_plane: ControlPlaneConfig,
}

impl Settings {
    /// Load settings from `path` (or `./mesh-control.toml` if present) and
    /// the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_control_service::FailurePolicy;

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("mesh-control-{}-{}.toml", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::load_with_prefix(None, "MESHCTL_TEST_EMPTY").unwrap();
        assert_eq!(settings.http.bind_address, "0.0.0.0:9081");
        assert_eq!(settings.broker.url, "nats://localhost:4222");
        assert_eq!(settings.control_plane.ingestion.subject, "meshery.>");
    }

    #[test]
    fn test_file_values() {
        let path = write_config(
            "file",
            r#"
[http]
bind_address = "127.0.0.1:8080"

[control_plane.ingestion]
failure_policy = "halt"

[[control_plane.clusters]]
name = "kind-dev"
kubeconfig_path = "/etc/kube/kind.yaml"
"#,
        );

        let settings = Settings::load_with_prefix(Some(&path), "MESHCTL_TEST_FILE").unwrap();
        assert_eq!(settings.http.bind_address, "127.0.0.1:8080");
        assert_eq!(settings.control_plane.ingestion.failure_policy, FailurePolicy::Halt);
        assert_eq!(settings.control_plane.clusters.len(), 1);
        assert_eq!(settings.control_plane.registry.probe_interval_secs, 10);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("MESHCTL_TEST_ENV__BROKER__URL", "nats://broker:4222");
        std::env::set_var(
            "MESHCTL_TEST_ENV__CONTROL_PLANE__REGISTRY__PROBE_INTERVAL_SECS",
            "3",
        );

        let settings = Settings::load_with_prefix(None, "MESHCTL_TEST_ENV").unwrap();
        assert_eq!(settings.broker.url, "nats://broker:4222");
        assert_eq!(settings.control_plane.registry.probe_interval_secs, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let path = Path::new("/nonexistent/mesh-control.toml");
        assert!(Settings::load_with_prefix(Some(path), "MESHCTL_TEST_MISSING").is_err());
    }
}
