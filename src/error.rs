//! Error taxonomy and user-visible findings.
//!
//! [`TrailError`] is the typed error used inside the capture and integrity
//! paths. Anything that reaches a user is rendered as an [`Issue`]: a JSON
//! object with `type`, `severity`, and `message`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrailError>;

#[derive(Error, Debug)]
pub enum TrailError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("circuit breaker open, {operation} skipped")]
    CircuitOpen { operation: &'static str },

    #[error("recovery exhausted for session {session_id}: tried {attempted:?}")]
    RecoveryExhausted {
        session_id: String,
        attempted: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrailError {
    pub fn kind(&self) -> IssueKind {
        match self {
            TrailError::Validation(_) => IssueKind::Validation,
            TrailError::Corruption(_) | TrailError::Json(_) => IssueKind::Corruption,
            TrailError::Capacity(_) => IssueKind::Capacity,
            TrailError::CircuitOpen { .. } => IssueKind::CircuitOpen,
            TrailError::RecoveryExhausted { .. } => IssueKind::RecoveryExhausted,
            TrailError::Io(_) => IssueKind::Io,
        }
    }

    /// Render as a finding. Capacity errors are resolved by truncation, so
    /// they never rank above a warning.
    pub fn to_issue(&self) -> Issue {
        let severity = match self {
            TrailError::Capacity(_) => Severity::Warning,
            TrailError::CircuitOpen { .. } => Severity::Warning,
            TrailError::Corruption(_) | TrailError::Json(_) => Severity::Critical,
            TrailError::RecoveryExhausted { .. } => Severity::Critical,
            TrailError::Validation(_) | TrailError::Io(_) => Severity::Error,
        };
        Issue::new(self.kind(), severity, self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Validation,
    Corruption,
    Capacity,
    CircuitOpen,
    RecoveryExhausted,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn is_corruption(&self) -> bool {
        self.kind == IssueKind::Corruption
    }
}
