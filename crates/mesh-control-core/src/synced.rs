//! Synced infrastructure objects
//!
//! The sync controller publishes every observed cluster object on the broker
//! wrapped in a [`SyncEnvelope`]. The pipeline decodes the envelope's `object`
//! into a [`SyncedObject`] and stores it as-is; nothing here interprets the
//! object beyond the fields needed to identify it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from decoding a broker payload
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Broker message body as published by the sync controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub object: serde_json::Value,
}

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// A decoded infrastructure object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedObject {
    pub kind: String,
    pub api_version: String,
    #[serde(default)]
    pub cluster_id: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

impl SyncedObject {
    /// Decode a raw broker payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let envelope: SyncEnvelope = serde_json::from_slice(payload)?;
        Self::from_value(envelope.object)
    }

    /// Decode an already-parsed object document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DecodeError> {
        let object: SyncedObject = serde_json::from_value(value)?;
        if object.kind.is_empty() {
            return Err(DecodeError::MissingField("kind"));
        }
        if object.metadata.name.is_empty() {
            return Err(DecodeError::MissingField("metadata.name"));
        }
        Ok(object)
    }

    /// `kind/namespace/name`, used for logging.
    pub fn display_key(&self) -> String {
        if self.metadata.namespace.is_empty() {
            format!("{}/{}", self.kind, self.metadata.name)
        } else {
            format!("{}/{}/{}", self.kind, self.metadata.namespace, self.metadata.name)
        }
    }
}
