//! Cluster context sources
//!
//! The dispatcher receives the caller's active contexts as a slice; this
//! module decides where those contexts come from.

use async_trait::async_trait;
use mesh_control_core::{CallerIdentity, ClusterContext, CredentialError};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::ClusterSettings;

/// Supplies the cluster contexts active for a caller
#[async_trait]
pub trait ClusterContextProvider: Send + Sync {
    async fn active_contexts(&self, caller: &CallerIdentity) -> Vec<Arc<dyn ClusterContext>>;
}

/// Context whose kubeconfig is read from a file on every generation
#[derive(Debug, Clone)]
pub struct FileClusterContext {
    name: String,
    path: PathBuf,
}

impl FileClusterContext {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClusterContext for FileClusterContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_kubeconfig(&self) -> Result<SecretString, CredentialError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            CredentialError::generation(&self.name, format!("{}: {}", self.path.display(), e))
        })?;

        if contents.trim().is_empty() {
            return Err(CredentialError::generation(
                &self.name,
                format!("{} is empty", self.path.display()),
            ));
        }

        debug!(context = %self.name, "Generated kubeconfig");
        Ok(SecretString::new(contents))
    }
}

/// The same fixed set of contexts for every caller
#[derive(Debug, Clone, Default)]
pub struct ConfiguredContexts {
    contexts: Vec<Arc<dyn ClusterContext>>,
}

impl ConfiguredContexts {
    pub fn new(contexts: Vec<Arc<dyn ClusterContext>>) -> Self {
        Self { contexts }
    }

    /// One file-backed context per configured cluster, in configuration order.
    pub fn from_settings(clusters: &[ClusterSettings]) -> Self {
        Self::new(
            clusters
                .iter()
                .map(|c| {
                    Arc::new(FileClusterContext::new(&c.name, &c.kubeconfig_path))
                        as Arc<dyn ClusterContext>
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[async_trait]
impl ClusterContextProvider for ConfiguredContexts {
    async fn active_contexts(&self, _caller: &CallerIdentity) -> Vec<Arc<dyn ClusterContext>> {
        self.contexts.clone()
    }
}
