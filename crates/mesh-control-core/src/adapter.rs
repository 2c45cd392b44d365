//! Adapter model
//!
//! An adapter is a remote process exposing the mesh control RPC surface for
//! one mesh technology. The registry keys adapters by `host`; the locally
//! allocated `port` is an attribute and never part of the identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Capability and version metadata reported by an adapter at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    pub version: String,
    pub git_commit_sha: String,
}

/// A registered adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adapter {
    /// Network address of the adapter's RPC endpoint (unique key).
    pub host: String,
    pub name: String,
    pub version: String,
    pub git_commit_sha: String,
    /// Operation names the adapter supports.
    pub ops: BTreeSet<String>,
    /// Locally allocated port.
    pub port: u16,
    /// Liveness as last observed by the prober.
    pub available: bool,
}

impl Adapter {
    /// Build a freshly registered adapter from its reported metadata.
    pub fn new(host: impl Into<String>, info: ComponentInfo, ops: BTreeSet<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            name: info.name,
            version: info.version,
            git_commit_sha: info.git_commit_sha,
            ops,
            port,
            available: true,
        }
    }

    /// The `host:port` form used by the dispatch path.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `key` names this adapter, either by host or by `host:port`.
    pub fn matches(&self, key: &str) -> bool {
        if self.host == key {
            return true;
        }
        key.strip_prefix(self.host.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|port| port.parse::<u16>().ok())
            .is_some_and(|port| port == self.port)
    }

    /// Whether the adapter advertised `op_name`.
    pub fn supports(&self, op_name: &str) -> bool {
        self.ops.contains(op_name)
    }
}

/// An entry in the catalogue of adapters known to be deployable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableAdapter {
    pub label: String,
    pub location: String,
}

impl AvailableAdapter {
    pub fn new(label: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            location: location.into(),
        }
    }

    /// Default catalogue of mesh adapters and their conventional locations.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("meshery-istio", "localhost:10000"),
            Self::new("meshery-linkerd", "localhost:10001"),
            Self::new("meshery-consul", "localhost:10002"),
            Self::new("meshery-nsm", "localhost:10004"),
            Self::new("meshery-app-mesh", "localhost:10005"),
            Self::new("meshery-traefik-mesh", "localhost:10006"),
            Self::new("meshery-kuma", "localhost:10007"),
            Self::new("meshery-nginx-sm", "localhost:10010"),
            Self::new("meshery-cilium", "localhost:10012"),
        ]
    }
}
