//! File-level and structural validation of persisted sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{Issue, IssueKind, Severity};
use crate::session_files::{backup_path, corrupted_path, primary_path};

/// Typed list fields every session carries besides `activities`.
pub const LIST_FIELDS: [&str; 6] = [
    "fileChanges",
    "gitCommits",
    "commands",
    "decisions",
    "problems",
    "solutions",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub session_id: String,
    pub is_valid: bool,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    pub used_corrupted_sibling: bool,
    pub has_backup: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub checked_at: DateTime<Utc>,
    /// Parsed document, when the file was readable JSON.
    #[serde(skip)]
    pub document: Option<Value>,
    /// Set when reading failed for reasons other than the file's content.
    #[serde(skip)]
    pub unexpected_failure: bool,
}

impl IntegrityReport {
    fn new(session_id: &str, path: &Path, has_backup: bool) -> Self {
        Self {
            session_id: session_id.to_string(),
            is_valid: false,
            file_path: path.display().to_string(),
            file_size: None,
            used_corrupted_sibling: false,
            has_backup,
            errors: Vec::new(),
            warnings: Vec::new(),
            checked_at: Utc::now(),
            document: None,
            unexpected_failure: false,
        }
    }

    pub fn has_corruption(&self) -> bool {
        self.errors.iter().any(Issue::is_corruption)
    }
}

pub fn validate_session_file(dir: &Path, session_id: &str) -> IntegrityReport {
    let primary = primary_path(dir, session_id);
    let corrupted = corrupted_path(dir, session_id);
    let has_backup = backup_path(dir, session_id).exists();

    let (path, from_sibling) = if primary.exists() {
        (primary, false)
    } else if corrupted.exists() {
        (corrupted, true)
    } else {
        let mut report = IntegrityReport::new(session_id, &primary, has_backup);
        report.errors.push(Issue::new(
            IssueKind::Validation,
            Severity::Critical,
            format!("session file not found: {}", primary.display()),
        ));
        return report;
    };

    let mut report = IntegrityReport::new(session_id, &path, has_backup);
    report.used_corrupted_sibling = from_sibling;
    if from_sibling {
        report.errors.push(Issue::new(
            IssueKind::Corruption,
            Severity::Critical,
            "primary file missing; only a .corrupted sibling exists",
        ));
    }

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            report.unexpected_failure = e.kind() != ErrorKind::NotFound;
            report.errors.push(Issue::new(
                IssueKind::Io,
                Severity::Critical,
                format!("failed to read {}: {}", path.display(), e),
            ));
            return report;
        }
    };
    report.file_size = Some(bytes.len() as u64);

    if bytes.is_empty() {
        report.errors.push(Issue::new(
            IssueKind::Corruption,
            Severity::Critical,
            "session file is empty (0 bytes)",
        ));
        return report;
    }

    let document: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            report.errors.push(Issue::new(
                IssueKind::Corruption,
                Severity::Critical,
                format!("JSON parse failure: {}", e),
            ));
            return report;
        }
    };

    let (errors, warnings) = validate_structure(&document);
    report.errors.extend(errors);
    report.warnings.extend(warnings);
    report.is_valid = report.errors.is_empty();
    report.document = Some(document);
    report
}

/// Required fields, array types, and non-fatal warnings for a full session.
pub fn validate_structure(doc: &Value) -> (Vec<Issue>, Vec<Issue>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(obj) = doc.as_object() else {
        errors.push(Issue::new(
            IssueKind::Corruption,
            Severity::Critical,
            "session root is not a JSON object",
        ));
        return (errors, warnings);
    };

    match obj.get("sessionId") {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(_) => errors.push(
            Issue::new(IssueKind::Corruption, Severity::Error, "sessionId is not a string")
                .with_field("sessionId"),
        ),
        None => errors.push(
            Issue::new(IssueKind::Validation, Severity::Error, "missing required field sessionId")
                .with_field("sessionId"),
        ),
    }

    check_timestamp(obj.get("start"), "start", true, &mut errors, &mut warnings);
    check_timestamp(obj.get("lastUpdate"), "lastUpdate", false, &mut errors, &mut warnings);

    match obj.get("activities") {
        Some(Value::Array(items)) => {
            if items.is_empty() {
                warnings.push(
                    Issue::new(IssueKind::Validation, Severity::Warning, "session has no activities")
                        .with_field("activities"),
                );
            }
        }
        Some(_) => errors.push(
            Issue::new(IssueKind::Corruption, Severity::Error, "activities is not an array")
                .with_field("activities"),
        ),
        None => errors.push(
            Issue::new(IssueKind::Validation, Severity::Error, "missing required field activities")
                .with_field("activities"),
        ),
    }

    for field in LIST_FIELDS {
        match obj.get(field) {
            Some(Value::Array(_)) => {}
            Some(_) => errors.push(
                Issue::new(
                    IssueKind::Corruption,
                    Severity::Error,
                    format!("{} is not an array", field),
                )
                .with_field(field),
            ),
            None => warnings.push(
                Issue::new(
                    IssueKind::Validation,
                    Severity::Warning,
                    format!("missing list field {}", field),
                )
                .with_field(field),
            ),
        }
    }

    match obj.get("metadata") {
        Some(Value::Object(_)) => {}
        Some(_) => errors.push(
            Issue::new(IssueKind::Corruption, Severity::Error, "metadata is not an object")
                .with_field("metadata"),
        ),
        None => warnings.push(
            Issue::new(IssueKind::Validation, Severity::Warning, "missing metadata")
                .with_field("metadata"),
        ),
    }

    (errors, warnings)
}

/// Backups carry reduced fields: only `sessionId` and `start` are required.
pub fn validate_backup(doc: &Value) -> Result<(), String> {
    let obj = doc.as_object().ok_or("backup root is not an object")?;
    match obj.get("sessionId") {
        Some(Value::String(s)) if !s.is_empty() => {}
        _ => return Err("backup has no sessionId".to_string()),
    }
    match obj.get("start").and_then(Value::as_str) {
        Some(s) if parse_timestamp(s).is_some() => {}
        _ => return Err("backup has no valid start timestamp".to_string()),
    }
    match obj.get("activities") {
        None | Some(Value::Array(_)) => Ok(()),
        Some(_) => Err("backup activities is not an array".to_string()),
    }
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn check_timestamp(
    value: Option<&Value>,
    field: &str,
    required: bool,
    errors: &mut Vec<Issue>,
    warnings: &mut Vec<Issue>,
) {
    match value {
        Some(Value::String(s)) if parse_timestamp(s).is_some() => {}
        Some(_) => errors.push(
            Issue::new(
                IssueKind::Validation,
                Severity::Error,
                format!("{} is not a valid timestamp", field),
            )
            .with_field(field),
        ),
        None if required => errors.push(
            Issue::new(
                IssueKind::Validation,
                Severity::Error,
                format!("missing required field {}", field),
            )
            .with_field(field),
        ),
        None => warnings.push(
            Issue::new(
                IssueKind::Validation,
                Severity::Warning,
                format!("missing field {}", field),
            )
            .with_field(field),
        ),
    }
}
