//! Controller status as reported to callers

use serde::{Deserialize, Serialize};

/// Health state of a background controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Running,
    Degraded,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Failure detail attached to a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerError {
    pub code: String,
    pub description: String,
}

/// Point-in-time status of a named controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ControllerError>,
}

impl ControllerStatus {
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
            error: None,
        }
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::new(name, Status::Unknown)
    }

    /// Attach failure detail.
    pub fn with_error(mut self, code: impl Into<String>, description: impl Into<String>) -> Self {
        self.error = Some(ControllerError {
            code: code.into(),
            description: description.into(),
        });
        self
    }

    /// Whether no further transitions can follow this status.
    pub fn is_terminal(&self) -> bool {
        self.status == Status::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_has_no_error() {
        let status = ControllerStatus::unknown("meshsync");
        assert_eq!(status.status, Status::Unknown);
        assert!(status.error.is_none());
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_serialization_shape() {
        let status = ControllerStatus::new("meshsync", Status::Error).with_error("DECODE", "bad payload");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["description"], "bad payload");
        assert!(status.is_terminal());

        let running = serde_json::to_value(ControllerStatus::new("meshsync", Status::Running)).unwrap();
        assert!(running.get("error").is_none());
    }
}
