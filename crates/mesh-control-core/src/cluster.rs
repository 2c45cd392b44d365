//! Cluster contexts
//!
//! A cluster context identifies one target cluster the caller has access to.
//! Loading and generating Kubernetes configs lives outside this workspace; the
//! dispatcher only needs each context to produce a serialized kubeconfig.

use secrecy::SecretString;
use thiserror::Error;

/// Errors from generating cluster credentials
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to generate kubeconfig for context {context}: {reason}")]
    Generation { context: String, reason: String },
}

impl CredentialError {
    pub fn generation(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Generation {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

/// One active cluster context of a caller.
pub trait ClusterContext: Send + Sync + std::fmt::Debug {
    /// Human-readable context name.
    fn name(&self) -> &str;

    /// Produce the serialized kubeconfig for this context.
    fn generate_kubeconfig(&self) -> Result<SecretString, CredentialError>;
}

/// A context whose kubeconfig is already materialized.
#[derive(Debug)]
pub struct StaticClusterContext {
    name: String,
    kubeconfig: SecretString,
}

impl StaticClusterContext {
    pub fn new(name: impl Into<String>, kubeconfig: SecretString) -> Self {
        Self {
            name: name.into(),
            kubeconfig,
        }
    }
}

impl ClusterContext for StaticClusterContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_kubeconfig(&self) -> Result<SecretString, CredentialError> {
        use secrecy::ExposeSecret;

        let raw = self.kubeconfig.expose_secret();
        if raw.trim().is_empty() {
            return Err(CredentialError::generation(&self.name, "kubeconfig is empty"));
        }
        Ok(SecretString::new(raw.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_static_context_returns_kubeconfig() {
        let ctx = StaticClusterContext::new("kind-dev", SecretString::new("apiVersion: v1".to_string()));
        assert_eq!(ctx.name(), "kind-dev");
        assert_eq!(ctx.generate_kubeconfig().unwrap().expose_secret(), "apiVersion: v1");
    }

    #[test]
    fn test_static_context_rejects_empty_kubeconfig() {
        let ctx = StaticClusterContext::new("broken", SecretString::new("  ".to_string()));
        let err = ctx.generate_kubeconfig().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
