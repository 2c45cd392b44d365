//! Control plane configuration
//!
//! Typed configuration for the registry, the prober and the ingestion
//! pipeline. Every section has defaults so a missing file or section is
//! valid; durations are expressed in whole seconds or milliseconds so the
//! values can be supplied from TOML or environment variables.

use mesh_control_core::AvailableAdapter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryConfig;

/// Errors from configuration validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// What the ingestion pipeline does when a message cannot be decoded or stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop consuming at the first failure.
    Halt,
    /// Skip undecodable messages, retry failed writes with backoff, keep going.
    #[default]
    Resume,
}

/// Adapter registry and prober settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Interval between availability probes of one adapter
    pub probe_interval_secs: u64,
    /// Connection timeout of a single probe
    pub probe_timeout_ms: u64,
    /// Deadline for metadata and operation RPCs
    pub rpc_timeout_secs: u64,
    /// First port handed out by the allocator
    pub port_range_start: u16,
    /// Last port handed out by the allocator (inclusive)
    pub port_range_end: u16,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: 10,
            probe_timeout_ms: 2_000,
            rpc_timeout_secs: 30,
            port_range_start: 11_000,
            port_range_end: 11_999,
        }
    }
}

impl RegistrySettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Backoff settings for persist retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Sync ingestion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Controller name reported by the status reporter
    pub controller_name: String,
    /// Broker subject carrying synced objects
    pub subject: String,
    /// Queue group shared by all control plane replicas
    pub queue_group: String,
    pub failure_policy: FailurePolicy,
    pub persist_retry: RetrySettings,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            controller_name: "meshsync".to_string(),
            subject: "meshery.>".to_string(),
            queue_group: "meshery".to_string(),
            failure_policy: FailurePolicy::Resume,
            persist_retry: RetrySettings::default(),
        }
    }
}

/// A cluster context backed by a kubeconfig file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    pub name: String,
    pub kubeconfig_path: PathBuf,
}

/// Combined control plane configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub registry: RegistrySettings,
    pub ingestion: IngestionSettings,
    /// Catalogue served by the available-adapters endpoint
    pub available_adapters: Vec<AvailableAdapter>,
    /// Cluster contexts offered to every caller
    pub clusters: Vec<ClusterSettings>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            registry: RegistrySettings::default(),
            ingestion: IngestionSettings::default(),
            available_adapters: AvailableAdapter::defaults(),
            clusters: vec![],
        }
    }
}

impl ControlPlaneConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        let registry = &self.registry;
        if registry.port_range_start == 0 || registry.port_range_start > registry.port_range_end {
            return Err(ConfigError::ValidationFailed(format!(
                "invalid port range {}..={}",
                registry.port_range_start, registry.port_range_end
            )));
        }
        if registry.probe_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "probe_interval_secs must be greater than zero".to_string(),
            ));
        }
        if registry.rpc_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "rpc_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.ingestion.subject.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "ingestion subject must not be empty".to_string(),
            ));
        }
        let retry = &self.ingestion.persist_retry;
        if retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "persist_retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
