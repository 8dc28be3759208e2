//! Ordered recovery strategies for damaged sessions.
//!
//! Each strategy either reconstructs a session document or declines. The
//! first reconstruction wins; nothing is ever written over the damaged
//! file itself.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::OnceLock;

use super::validate::{parse_timestamp, validate_backup, LIST_FIELDS};
use crate::error::{Issue, Result, TrailError};
use crate::session_files::{backup_path, corrupted_path, primary_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Intact,
    RecoveredFromBackup,
    PartialRecovery,
    CompleteLoss,
}

pub enum StrategyOutcome {
    Recovered(Value),
    NotApplicable(String),
}

pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Status reported when this strategy succeeds.
    fn status(&self) -> RecoveryStatus;

    fn attempt(&self, dir: &Path, session_id: &str) -> Result<StrategyOutcome>;
}

pub fn default_strategies() -> Vec<Box<dyn RecoveryStrategy>> {
    vec![Box::new(BackupStrategy), Box::new(PartialExtraction)]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttempt {
    pub strategy: String,
    pub outcome: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub session_id: String,
    pub recoverable: bool,
    pub status: RecoveryStatus,
    pub strategies_attempted: Vec<StrategyAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_session: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    pub errors: Vec<Issue>,
    pub attempted_at: DateTime<Utc>,
}

impl RecoveryReport {
    pub fn intact(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            recoverable: true,
            status: RecoveryStatus::Intact,
            strategies_attempted: Vec::new(),
            recovered_session: None,
            output_path: None,
            errors: Vec::new(),
            attempted_at: Utc::now(),
        }
    }
}

/// Try each strategy in order until one reconstructs the session.
pub fn run_strategies(
    strategies: &[Box<dyn RecoveryStrategy>],
    dir: &Path,
    session_id: &str,
) -> RecoveryReport {
    let mut attempts = Vec::new();
    for strategy in strategies {
        match strategy.attempt(dir, session_id) {
            Ok(StrategyOutcome::Recovered(doc)) => {
                attempts.push(StrategyAttempt {
                    strategy: strategy.name().to_string(),
                    outcome: "recovered".to_string(),
                    detail: String::new(),
                });
                return RecoveryReport {
                    session_id: session_id.to_string(),
                    recoverable: true,
                    status: strategy.status(),
                    strategies_attempted: attempts,
                    recovered_session: Some(doc),
                    output_path: None,
                    errors: Vec::new(),
                    attempted_at: Utc::now(),
                };
            }
            Ok(StrategyOutcome::NotApplicable(reason)) => attempts.push(StrategyAttempt {
                strategy: strategy.name().to_string(),
                outcome: "not_applicable".to_string(),
                detail: reason,
            }),
            Err(e) => {
                tracing::warn!(strategy = strategy.name(), error = %e, "recovery strategy failed");
                attempts.push(StrategyAttempt {
                    strategy: strategy.name().to_string(),
                    outcome: "failed".to_string(),
                    detail: e.to_string(),
                });
            }
        }
    }

    let exhausted = TrailError::RecoveryExhausted {
        session_id: session_id.to_string(),
        attempted: attempts.iter().map(|a| a.strategy.clone()).collect(),
    };
    RecoveryReport {
        session_id: session_id.to_string(),
        recoverable: false,
        status: RecoveryStatus::CompleteLoss,
        strategies_attempted: attempts,
        recovered_session: None,
        output_path: None,
        errors: vec![exhausted.to_issue()],
        attempted_at: Utc::now(),
    }
}

/// Rebuild from `<id>.backup.json`.
pub struct BackupStrategy;

impl RecoveryStrategy for BackupStrategy {
    fn name(&self) -> &'static str {
        "backup"
    }

    fn status(&self) -> RecoveryStatus {
        RecoveryStatus::RecoveredFromBackup
    }

    fn attempt(&self, dir: &Path, session_id: &str) -> Result<StrategyOutcome> {
        let path = backup_path(dir, session_id);
        if !path.exists() {
            return Ok(StrategyOutcome::NotApplicable("no backup file".to_string()));
        }
        let text = std::fs::read_to_string(&path)?;
        let backup: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                return Ok(StrategyOutcome::NotApplicable(format!(
                    "backup is not valid JSON: {}",
                    e
                )))
            }
        };
        if let Err(reason) = validate_backup(&backup) {
            return Ok(StrategyOutcome::NotApplicable(reason));
        }
        Ok(StrategyOutcome::Recovered(session_from_backup(&backup)))
    }
}

/// Expand a reduced backup into the full session shape. Typed lists are
/// rebuilt from whichever activities the backup kept.
pub fn session_from_backup(backup: &Value) -> Value {
    let activities: Vec<Value> = backup
        .get("activities")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut lists: Map<String, Value> = LIST_FIELDS
        .iter()
        .map(|f| (f.to_string(), Value::Array(Vec::new())))
        .collect();
    for activity in &activities {
        let field = match activity.get("type").and_then(Value::as_str) {
            Some("file_change") => "fileChanges",
            Some("commit") => "gitCommits",
            Some("command") => "commands",
            Some("decision") => "decisions",
            Some("problem") => "problems",
            Some("solution") => "solutions",
            _ => continue,
        };
        if let Some(Value::Array(list)) = lists.get_mut(field) {
            list.push(activity.clone());
        }
    }

    let start = backup.get("start").cloned().unwrap_or(Value::Null);
    let last_update = backup.get("lastUpdate").cloned().unwrap_or(start.clone());
    let mut metadata = counts(&activities, &lists);
    if let Some(original) = backup.get("metadata") {
        metadata.insert("originalMetadata".to_string(), original.clone());
    }
    metadata.insert("recovered".to_string(), json!(true));
    metadata.insert("recoveredFrom".to_string(), json!("backup"));
    metadata.insert("recoveredAt".to_string(), json!(Utc::now()));

    let mut doc = Map::new();
    doc.insert("sessionId".to_string(), backup["sessionId"].clone());
    doc.insert("start".to_string(), start);
    doc.insert("lastUpdate".to_string(), last_update);
    doc.insert("activities".to_string(), Value::Array(activities));
    doc.extend(lists);
    doc.insert("metadata".to_string(), Value::Object(metadata));
    Value::Object(doc)
}

fn counts(activities: &[Value], lists: &Map<String, Value>) -> Map<String, Value> {
    let len = |field: &str| lists.get(field).and_then(Value::as_array).map_or(0, Vec::len);
    let mut m = Map::new();
    m.insert("activityCount".to_string(), json!(activities.len()));
    m.insert("fileChangeCount".to_string(), json!(len("fileChanges")));
    m.insert("commitCount".to_string(), json!(len("gitCommits")));
    m.insert("commandCount".to_string(), json!(len("commands")));
    m.insert("decisionCount".to_string(), json!(len("decisions")));
    m.insert("problemCount".to_string(), json!(len("problems")));
    m.insert("solutionCount".to_string(), json!(len("solutions")));
    m
}

/// Pull identifying fields out of unparseable text with regexes.
pub struct PartialExtraction;

fn field_regex(field: &str) -> Regex {
    Regex::new(&format!(r#""{}"\s*:\s*"([^"]+)""#, field)).expect("valid regex")
}

fn session_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("sessionId"))
}

fn start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("start"))
}

fn last_update_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("lastUpdate"))
}

fn activity_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("type"))
}

impl RecoveryStrategy for PartialExtraction {
    fn name(&self) -> &'static str {
        "partial_extraction"
    }

    fn status(&self) -> RecoveryStatus {
        RecoveryStatus::PartialRecovery
    }

    fn attempt(&self, dir: &Path, session_id: &str) -> Result<StrategyOutcome> {
        let source = [primary_path(dir, session_id), corrupted_path(dir, session_id)]
            .into_iter()
            .find(|p| p.exists());
        let Some(source) = source else {
            return Ok(StrategyOutcome::NotApplicable(
                "no primary or corrupted file to scan".to_string(),
            ));
        };
        let bytes = std::fs::read(&source)?;
        let text = String::from_utf8_lossy(&bytes);
        match extract_partial(&text) {
            Some(mut doc) => {
                doc["metadata"]["recoveredFrom"] =
                    json!(source.file_name().map(|n| n.to_string_lossy().into_owned()));
                Ok(StrategyOutcome::Recovered(doc))
            }
            None => Ok(StrategyOutcome::NotApplicable(
                "no sessionId found in damaged text".to_string(),
            )),
        }
    }
}

/// Minimal session from damaged text, or `None` without a `sessionId`.
pub fn extract_partial(text: &str) -> Option<Value> {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    let session_id = capture(session_id_re())?;
    let start = capture(start_re()).filter(|s| parse_timestamp(s).is_some());
    let last_update = capture(last_update_re()).filter(|s| parse_timestamp(s).is_some());
    let estimated = activity_type_re().captures_iter(text).count();

    let mut doc = json!({
        "sessionId": session_id,
        "start": start,
        "lastUpdate": last_update.or_else(|| start.clone()),
        "activities": [],
        "metadata": {
            "activityCount": 0,
            "recovered": true,
            "partial": true,
            "estimatedLostActivities": estimated,
            "recoveredAt": Utc::now(),
        }
    });
    for field in LIST_FIELDS {
        doc[field] = json!([]);
    }
    Some(doc)
}
