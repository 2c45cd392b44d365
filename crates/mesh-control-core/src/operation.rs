//! Operation dispatch types
//!
//! An [`OperationRequest`] is assembled once per dispatch and handed to the
//! target adapter. It carries one serialized kubeconfig per active cluster
//! context of the caller and a fresh [`OperationId`].
//!
//! ```text
//! caller ──► dispatcher ──► ApplyOperation(operation_id, op_name, ..., kube_configs[])
//! ```

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace used when the caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a single dispatched operation.
///
/// Generated per dispatch and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generate a new random OperationId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an OperationId from its string representation.
    pub fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid OperationId: {}", e))
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Request
// ============================================================================

/// The fully resolved request sent to an adapter's `ApplyOperation`.
///
/// Ephemeral: it exists only for the duration of one dispatch. Kubeconfigs
/// are kept behind [`SecretString`] so they never show up in debug output.
#[derive(Debug)]
pub struct OperationRequest {
    pub operation_id: OperationId,
    pub op_name: String,
    pub username: String,
    pub namespace: String,
    pub custom_body: String,
    pub delete_op: bool,
    /// One serialized kubeconfig per active cluster context, in context order.
    pub kube_configs: Vec<SecretString>,
}

/// Resolve an optional namespace, falling back to [`DEFAULT_NAMESPACE`].
pub fn namespace_or_default(namespace: Option<&str>) -> String {
    match namespace.map(str::trim) {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => DEFAULT_NAMESPACE.to_string(),
    }
}
