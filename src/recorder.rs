//! Live capture of one development session.
//!
//! An [`ActivityRecorder`] exclusively owns one [`Session`]. Each
//! `record_*` call accepts a loosely-typed JSON event (as delivered by a
//! filesystem watcher, git hook, or shell integration), normalizes it into
//! the typed model, sanitizes oversized text, and rewrites the whole session
//! file. None of these calls return an error: persistence problems degrade
//! to a minimal backup and are logged.

use anyhow::Context;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::{CaptureConfig, Config};
use crate::models::{
    first_line, Activity, CommandRecord, Commit, Decision, FileAction, FileChange,
    FileTouchCount, GitActivity, Problem, Session, SessionBackup, SessionSnapshot,
    SessionSummary, Solution, SummaryStatistics, SystemInfo,
};
use crate::serializer::BoundedSerializer;
use crate::session_files::{self, backup_path, primary_path, summary_path, write_file};
use crate::truncate::{sanitize, Content, PREVIEW_CHARS};

const SNAPSHOT_RECENT: usize = 10;
const SUMMARY_TOP_FILES: usize = 10;

/// The seven event kinds a capture feed can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventKind {
    FileChange,
    GitActivity,
    Commit,
    Command,
    Decision,
    Problem,
    Solution,
}

/// What the best-effort persist after an event managed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Full session rewritten to `<id>.json`.
    Full,
    /// Full write failed; `<id>.backup.json` holds the reduced record.
    Backup,
    /// Neither write succeeded.
    Failed,
    /// Session already finalized; the event was ignored.
    Skipped,
}

pub struct ActivityRecorder {
    session: Session,
    session_dir: PathBuf,
    capture: CaptureConfig,
    serializer: BoundedSerializer,
    finalized: bool,
}

impl ActivityRecorder {
    /// Begin a new session with a generated id and write its empty record.
    pub fn start(config: &Config, title: Option<String>) -> Self {
        Self::with_session_id(config, session_files::generate_session_id(), title)
    }

    pub fn with_session_id(config: &Config, session_id: String, title: Option<String>) -> Self {
        let title = title.map(|t| clamp_text(t, config.capture.max_content_length, "title").0);
        let mut recorder = Self::from_session(config, Session::new(session_id, title));
        tracing::info!(
            session_id = %recorder.session.session_id,
            dir = %recorder.session_dir.display(),
            "capture session started"
        );
        recorder.persist();
        recorder
    }

    /// Reopen an existing session file so more events can be appended.
    pub fn resume(config: &Config, session_id: &str) -> anyhow::Result<Self> {
        let path = primary_path(&config.capture.session_dir, session_id);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let session: Session = serde_json::from_str(&text)
            .with_context(|| format!("Session file is not a valid session: {}", path.display()))?;
        Ok(Self::from_session(config, session))
    }

    fn from_session(config: &Config, session: Session) -> Self {
        Self {
            session,
            session_dir: config.capture.session_dir.clone(),
            capture: config.capture.clone(),
            serializer: BoundedSerializer::new(config.serializer.clone()),
            finalized: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn serializer_mut(&mut self) -> &mut BoundedSerializer {
        &mut self.serializer
    }

    pub fn record(&mut self, kind: EventKind, event: &Value) -> PersistOutcome {
        match kind {
            EventKind::FileChange => self.record_file_change(event),
            EventKind::GitActivity => self.record_git_activity(event),
            EventKind::Commit => self.record_commit(event),
            EventKind::Command => self.record_command(event),
            EventKind::Decision => self.record_decision(event),
            EventKind::Problem => self.record_problem(event),
            EventKind::Solution => self.record_solution(event),
        }
    }

    pub fn record_file_change(&mut self, event: &Value) -> PersistOutcome {
        if self.is_read_only() {
            return PersistOutcome::Skipped;
        }
        let change = FileChange {
            path: self.text(event, &["path", "filePath", "file"], "path")
                .unwrap_or_else(|| "(unknown)".to_string()),
            action: str_field(event, &["action", "type", "kind"])
                .map(|a| FileAction::parse(&a))
                .unwrap_or(FileAction::Change),
            content: self.content(event, &["content"], "content"),
            diff: self.content(event, &["diff", "patch"], "diff"),
            timestamp: event_timestamp(event),
        };
        push_bounded(
            &mut self.session.file_changes,
            change.clone(),
            self.capture.max_activities,
        );
        self.push_activity(Activity::FileChange(change))
    }

    pub fn record_git_activity(&mut self, event: &Value) -> PersistOutcome {
        if self.is_read_only() {
            return PersistOutcome::Skipped;
        }
        let activity = GitActivity {
            action: self
                .text(event, &["action", "operation", "type"], "action")
                .unwrap_or_else(|| "unknown".to_string()),
            reference: self.text_opt(event, &["reference", "ref", "branch"], "reference"),
            details: self.content(event, &["details", "output"], "details"),
            timestamp: event_timestamp(event),
        };
        self.push_activity(Activity::GitActivity(activity))
    }

    pub fn record_commit(&mut self, event: &Value) -> PersistOutcome {
        if self.is_read_only() {
            return PersistOutcome::Skipped;
        }
        let commit = Commit {
            hash: self.text_opt(event, &["hash", "sha", "commit"], "hash").unwrap_or_default(),
            message: self
                .text(event, &["message", "subject"], "message")
                .unwrap_or_default(),
            author: self.text_opt(event, &["author", "authorName"], "author"),
            date: self.text_opt(event, &["date", "authorDate"], "date"),
            files: self.files(event),
            insertions: u64_field(event, &["insertions", "additions", "linesAdded"]),
            deletions: u64_field(event, &["deletions", "linesRemoved"]),
            timestamp: event_timestamp(event),
        };
        push_bounded(
            &mut self.session.git_commits,
            commit.clone(),
            self.capture.max_activities,
        );
        self.push_activity(Activity::Commit(commit))
    }

    pub fn record_command(&mut self, event: &Value) -> PersistOutcome {
        if self.is_read_only() {
            return PersistOutcome::Skipped;
        }
        let command = CommandRecord {
            command: self
                .text(event, &["command", "cmd"], "command")
                .unwrap_or_default(),
            cwd: self.text_opt(event, &["cwd", "directory"], "cwd"),
            exit_code: event
                .get("exitCode")
                .or_else(|| event.get("exit_code"))
                .and_then(Value::as_i64),
            output: self.content(event, &["output", "stdout"], "output"),
            timestamp: event_timestamp(event),
        };
        push_bounded(
            &mut self.session.commands,
            command.clone(),
            self.capture.max_activities,
        );
        self.push_activity(Activity::Command(command))
    }

    pub fn record_decision(&mut self, event: &Value) -> PersistOutcome {
        if self.is_read_only() {
            return PersistOutcome::Skipped;
        }
        let decision = Decision {
            id: self.id(event),
            decision: self
                .text(event, &["decision", "title", "description"], "decision")
                .unwrap_or_default(),
            rationale: self.text_opt(event, &["rationale", "reason"], "rationale"),
            context: self.content(event, &["context"], "context"),
            timestamp: event_timestamp(event),
        };
        push_bounded(
            &mut self.session.decisions,
            decision.clone(),
            self.capture.max_activities,
        );
        self.push_activity(Activity::Decision(decision))
    }

    pub fn record_problem(&mut self, event: &Value) -> PersistOutcome {
        if self.is_read_only() {
            return PersistOutcome::Skipped;
        }
        let problem = Problem {
            id: self.id(event),
            description: self
                .text(event, &["description", "problem", "error"], "description")
                .unwrap_or_default(),
            context: self.content(event, &["context", "stack"], "context"),
            timestamp: event_timestamp(event),
        };
        push_bounded(
            &mut self.session.problems,
            problem.clone(),
            self.capture.max_activities,
        );
        self.push_activity(Activity::Problem(problem))
    }

    pub fn record_solution(&mut self, event: &Value) -> PersistOutcome {
        if self.is_read_only() {
            return PersistOutcome::Skipped;
        }
        let description = self
            .text(event, &["description", "solution"], "description")
            .unwrap_or_default();
        let hint = self.text_opt(event, &["problem"], "problem");
        let problem_id = self.text_opt(event, &["problemId", "problem_id"], "problemId").or_else(|| {
            link_problem(&self.session.problems, hint.as_deref().unwrap_or(&description))
        });
        let solution = Solution {
            id: self.id(event),
            description,
            problem_id,
            problem: hint,
            timestamp: event_timestamp(event),
        };
        push_bounded(
            &mut self.session.solutions,
            solution.clone(),
            self.capture.max_activities,
        );
        self.push_activity(Activity::Solution(solution))
    }

    /// Cheap live status: duration, counts, and the last ten activities.
    pub fn create_snapshot(&self) -> SessionSnapshot {
        let s = &self.session;
        let recent_start = s.activities.len().saturating_sub(SNAPSHOT_RECENT);
        SessionSnapshot {
            session_id: s.session_id.clone(),
            duration_seconds: (Utc::now() - s.start).num_seconds(),
            activity_count: s.activities.len(),
            file_change_count: s.file_changes.len(),
            commit_count: s.git_commits.len(),
            command_count: s.commands.len(),
            decision_count: s.decisions.len(),
            problem_count: s.problems.len(),
            solution_count: s.solutions.len(),
            recent_activities: s.activities[recent_start..].to_vec(),
        }
    }

    pub fn generate_summary(&self) -> SessionSummary {
        let s = &self.session;
        let end = s.last_update;
        let top_files = top_files(&s.file_changes, SUMMARY_TOP_FILES);
        let unique_files = count_file_touches(&s.file_changes).len();

        SessionSummary {
            session_id: s.session_id.clone(),
            title: s
                .title
                .clone()
                .unwrap_or_else(|| format!("Session {}", s.session_id)),
            start: s.start,
            end,
            duration_seconds: (end - s.start).num_seconds(),
            statistics: SummaryStatistics {
                total_events: s.metadata.total_events,
                activities: s.activities.len(),
                file_changes: s.file_changes.len(),
                unique_files,
                commits: s.git_commits.len(),
                commands: s.commands.len(),
                decisions: s.decisions.len(),
                problems: s.problems.len(),
                solutions: s.solutions.len(),
                lines_added: s.git_commits.iter().map(|c| c.insertions).sum(),
                lines_removed: s.git_commits.iter().map(|c| c.deletions).sum(),
            },
            top_files,
            achievements: achievements(&s.git_commits),
            activities: s.activities.clone(),
            file_changes: s.file_changes.clone(),
            commits: s.git_commits.clone(),
            decisions: s.decisions.clone(),
            problems: s.problems.clone(),
            solutions: s.solutions.clone(),
        }
    }

    /// Write the summary to `summaries/<id>.json` and freeze the session.
    pub fn finalize(&mut self) -> SessionSummary {
        let summary = self.generate_summary();
        if !self.finalized {
            self.persist();
            let path = summary_path(&self.session_dir, &summary.session_id);
            let json = match self.serializer.safe_stringify(&summary) {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::warn!(error = %e, "summary serialization failed, writing unbounded");
                    serde_json::to_string_pretty(&summary).ok()
                }
            };
            if let Some(json) = json {
                if let Err(e) = write_file(&path, &json) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to write summary");
                }
            }
            self.finalized = true;
            tracing::info!(
                session_id = %summary.session_id,
                events = summary.statistics.total_events,
                "capture session finalized"
            );
        }
        summary
    }

    /// Rewrite the full session file; fall back to the minimal backup.
    pub fn persist(&mut self) -> PersistOutcome {
        self.session.refresh_counts();
        let path = primary_path(&self.session_dir, &self.session.session_id);

        let failure = match self.serializer.safe_stringify(&self.session) {
            Ok(json) => match write_file(&path, &json) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), bytes = json.len(), "session persisted");
                    return PersistOutcome::Full;
                }
                Err(e) => format!("write failed: {}", e),
            },
            Err(e) => format!("serialization failed: {}", e),
        };

        tracing::warn!(
            session_id = %self.session.session_id,
            reason = %failure,
            "full persist failed, writing minimal backup"
        );
        self.session.metadata.serialization_safe = false;
        self.write_backup(failure)
    }

    fn write_backup(&self, reason: String) -> PersistOutcome {
        let s = &self.session;
        let keep_from = s.activities.len().saturating_sub(self.capture.backup_activities);
        let backup = SessionBackup {
            session_id: s.session_id.clone(),
            start: s.start,
            last_update: s.last_update,
            metadata: s.metadata.clone(),
            activities: s.activities[keep_from..].to_vec(),
            backup: true,
            reason: Some(reason),
        };
        // Bypasses the serializer so an open breaker cannot skip it.
        let path = backup_path(&self.session_dir, &s.session_id);
        match serde_json::to_string_pretty(&backup) {
            Ok(json) => match write_file(&path, &json) {
                Ok(()) => PersistOutcome::Backup,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "backup write failed");
                    PersistOutcome::Failed
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "backup serialization failed");
                PersistOutcome::Failed
            }
        }
    }

    fn is_read_only(&self) -> bool {
        if self.finalized {
            tracing::warn!(session_id = %self.session.session_id, "event after finalize ignored");
        }
        self.finalized
    }

    fn push_activity(&mut self, activity: Activity) -> PersistOutcome {
        let now = Utc::now();
        let s = &mut self.session;
        s.activities.push(activity);
        s.metadata.total_events += 1;
        s.last_update = now;

        let max = self.capture.max_activities;
        if s.activities.len() > max {
            if matches!(s.activities.first(), Some(Activity::SystemInfo(_))) {
                s.activities.remove(0);
            }
            let keep = max.saturating_sub(1);
            if s.activities.len() > keep {
                let excess = s.activities.len() - keep;
                s.activities.drain(..excess);
                s.metadata.dropped_activities += excess as u64;
            }
            let dropped = s.metadata.dropped_activities;
            s.activities.insert(
                0,
                Activity::SystemInfo(SystemInfo {
                    message: format!("{} older activities dropped to bound memory", dropped),
                    dropped: dropped as usize,
                    timestamp: now,
                }),
            );
        }

        self.persist()
    }

    fn content(&mut self, event: &Value, keys: &[&str], context: &str) -> Option<Content> {
        let raw = raw_text(event, keys)?;
        let content = sanitize(raw, self.capture.max_content_length, Some(context));
        if content.is_truncated() {
            self.session.metadata.truncated_fields += 1;
        }
        Some(content)
    }

    fn text(&mut self, event: &Value, keys: &[&str], context: &str) -> Option<String> {
        let raw = match event {
            Value::String(s) if is_primary_text(keys) => Some(s.clone()),
            _ => str_field(event, keys),
        }?;
        Some(self.clamp(raw, context))
    }

    fn text_opt(&mut self, event: &Value, keys: &[&str], context: &str) -> Option<String> {
        let raw = str_field(event, keys)?;
        Some(self.clamp(raw, context))
    }

    fn id(&mut self, event: &Value) -> String {
        self.text_opt(event, &["id"], "id")
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn files(&mut self, event: &Value) -> Vec<String> {
        file_list(event)
            .into_iter()
            .map(|f| self.clamp(f, "file"))
            .collect()
    }

    /// Typed string fields must never reach the serializer over its limit,
    /// or the stored session no longer loads.
    fn clamp(&mut self, raw: String, context: &str) -> String {
        let (text, clamped) = clamp_text(raw, self.capture.max_content_length, context);
        if clamped {
            self.session.metadata.truncated_fields += 1;
        }
        text
    }
}

/// Cut `raw` to at most `limit` characters, marker included. Returns the
/// text and whether it was cut.
fn clamp_text(raw: String, limit: usize, context: &str) -> (String, bool) {
    if raw.len() <= limit {
        return (raw, false);
    }
    let total = raw.chars().count();
    if total <= limit {
        return (raw, false);
    }
    let marker = |omitted: usize| format!(" [... {} {} chars truncated]", omitted, context);
    // The omitted count never exceeds `total`, so this bounds the marker.
    let budget = limit.saturating_sub(marker(total).chars().count());
    let keep = PREVIEW_CHARS.min(budget);
    if keep == 0 {
        return (raw.chars().take(limit).collect(), true);
    }
    let mut clamped: String = raw.chars().take(keep).collect();
    clamped.push_str(&marker(total.saturating_sub(keep)));
    (clamped, true)
}

/// Plain-string events are treated as the main text of decisions, problems,
/// solutions, and commands.
fn is_primary_text(keys: &[&str]) -> bool {
    matches!(
        keys.first(),
        Some(&("decision" | "description" | "command" | "message" | "path"))
    )
}

fn push_bounded<T>(list: &mut Vec<T>, item: T, max: usize) {
    list.push(item);
    if list.len() > max {
        let excess = list.len() - max;
        list.drain(..excess);
    }
}

fn raw_text(event: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match event.get(*key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Null) | None => continue,
            Some(other) => return Some(other.to_string()),
        }
    }
    None
}

fn str_field(event: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| event.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn u64_field(event: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .filter_map(|k| event.get(*k))
        .find_map(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0)
}

fn file_list(event: &Value) -> Vec<String> {
    let Some(files) = event.get("files").or_else(|| event.get("filesChanged")) else {
        return Vec::new();
    };
    match files {
        Value::Array(items) => items
            .iter()
            .filter_map(|f| match f {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => str_field(f, &["path", "file", "name"]),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split(|c| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn event_timestamp(event: &Value) -> DateTime<Utc> {
    match event.get("timestamp") {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now),
        _ => Utc::now(),
    }
}

/// Most recent problem whose description contains `hint`, or is contained by
/// it (case-insensitive).
pub fn link_problem(problems: &[Problem], hint: &str) -> Option<String> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return None;
    }
    problems
        .iter()
        .rev()
        .find(|p| {
            let desc = p.description.trim().to_lowercase();
            !desc.is_empty() && (desc.contains(&hint) || hint.contains(&desc))
        })
        .map(|p| p.id.clone())
}

fn count_file_touches(changes: &[FileChange]) -> HashMap<&str, u64> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for change in changes {
        *counts.entry(change.path.as_str()).or_insert(0) += 1;
    }
    counts
}

pub fn top_files(changes: &[FileChange], limit: usize) -> Vec<FileTouchCount> {
    let mut ranked: Vec<FileTouchCount> = count_file_touches(changes)
        .into_iter()
        .map(|(path, changes)| FileTouchCount {
            path: path.to_string(),
            changes,
        })
        .collect();
    ranked.sort_by(|a, b| b.changes.cmp(&a.changes).then(a.path.cmp(&b.path)));
    ranked.truncate(limit);
    ranked
}

fn feature_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(feat|add|implement)").expect("valid regex"))
}

fn fix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(fix|bug|issue)").expect("valid regex"))
}

/// Feature and fix achievements derived from commit messages.
pub fn achievements(commits: &[Commit]) -> Vec<String> {
    let mut features = Vec::new();
    let mut fixes = Vec::new();
    for commit in commits {
        let subject = first_line(&commit.message);
        if feature_pattern().is_match(subject) {
            features.push(format!("Feature: {}", subject));
        } else if fix_pattern().is_match(subject) {
            fixes.push(format!("Fix: {}", subject));
        }
    }
    features.extend(fixes);
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn config(dir: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.capture.session_dir = dir.to_path_buf();
        cfg
    }

    fn read_session(dir: &Path, id: &str) -> Value {
        let text = std::fs::read_to_string(primary_path(dir, id)).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn start_writes_empty_session() {
        let tmp = TempDir::new().unwrap();
        let rec = ActivityRecorder::start(&config(tmp.path()), Some("payment flow".into()));
        let v = read_session(tmp.path(), rec.session_id());
        assert_eq!(v["sessionId"], json!(rec.session_id()));
        assert_eq!(v["title"], json!("payment flow"));
        assert_eq!(v["activities"], json!([]));
    }

    #[test]
    fn every_event_rewrites_file() {
        let tmp = TempDir::new().unwrap();
        let mut rec = ActivityRecorder::start(&config(tmp.path()), None);
        assert_eq!(
            rec.record_file_change(&json!({"path": "src/app.js", "action": "add"})),
            PersistOutcome::Full
        );
        rec.record_command(&json!({"command": "npm test", "exitCode": 1}));
        rec.record_decision(&json!("use sqlite for the index"));
        let v = read_session(tmp.path(), rec.session_id());
        assert_eq!(v["activities"].as_array().unwrap().len(), 3);
        assert_eq!(v["fileChanges"][0]["path"], json!("src/app.js"));
        assert_eq!(v["fileChanges"][0]["action"], json!("add"));
        assert_eq!(v["commands"][0]["exitCode"], json!(1));
        assert_eq!(v["decisions"][0]["decision"], json!("use sqlite for the index"));
        assert_eq!(v["metadata"]["activityCount"], json!(3));
        assert_eq!(v["metadata"]["totalEvents"], json!(3));
    }

    #[test]
    fn huge_diff_becomes_descriptor() {
        let tmp = TempDir::new().unwrap();
        let mut rec = ActivityRecorder::start(&config(tmp.path()), None);
        let diff = "+".repeat(50_000);
        rec.record_file_change(&json!({"path": "big.txt", "diff": diff}));
        let v = read_session(tmp.path(), rec.session_id());
        let d = &v["fileChanges"][0]["diff"];
        assert_eq!(d["truncated"], json!(true));
        assert_eq!(d["originalSize"], json!(50_000));
        assert_eq!(d["originalLength"], json!(50_000));
        assert!(d["preview"].as_str().unwrap().len() <= 1000);
        assert_eq!(v["metadata"]["truncatedFields"], json!(1));
    }

    #[test]
    fn activity_list_is_bounded_with_marker() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(tmp.path());
        cfg.capture.max_activities = 5;
        let mut rec = ActivityRecorder::start(&cfg, None);
        for i in 0..8 {
            rec.record_command(&json!({"command": format!("cmd {}", i)}));
        }
        let s = rec.session();
        assert_eq!(s.activities.len(), 5);
        match &s.activities[0] {
            Activity::SystemInfo(info) => assert_eq!(info.dropped, 4),
            other => panic!("expected marker, got {:?}", other),
        }
        assert_eq!(s.metadata.dropped_activities, 4);
        assert_eq!(s.metadata.total_events, 8);
        assert_eq!(s.activities[4].describe(), "$ cmd 7");
        assert_eq!(s.commands.len(), 5);
    }

    #[test]
    fn serialization_failure_falls_back_to_backup() {
        let tmp = TempDir::new().unwrap();
        let mut rec = ActivityRecorder::start(&config(tmp.path()), None);
        let id = rec.session_id().to_string();
        *rec.serializer_mut() = BoundedSerializer::new(Default::default()).with_ceiling(64);
        for i in 0..7 {
            let outcome = rec.record_command(&json!({"command": format!("step {}", i)}));
            assert_eq!(outcome, PersistOutcome::Backup);
        }
        let text = std::fs::read_to_string(backup_path(tmp.path(), &id)).unwrap();
        let backup: SessionBackup = serde_json::from_str(&text).unwrap();
        assert!(backup.backup);
        assert_eq!(backup.session_id, id);
        assert_eq!(backup.activities.len(), 5);
        assert_eq!(backup.metadata.total_events, 7);
        assert!(!backup.metadata.serialization_safe);
    }

    #[test]
    fn solution_links_to_problem_by_description() {
        let tmp = TempDir::new().unwrap();
        let mut rec = ActivityRecorder::start(&config(tmp.path()), None);
        rec.record_problem(&json!({"id": "p1", "description": "Payment webhook times out"}));
        rec.record_problem(&json!({"id": "p2", "description": "Flaky login test"}));
        rec.record_solution(&json!({"description": "raise timeout", "problem": "webhook times out"}));
        rec.record_solution(&json!({"description": "explicit", "problemId": "p2"}));
        rec.record_solution(&json!({"description": "unrelated tweak"}));
        let sols = &rec.session().solutions;
        assert_eq!(sols[0].problem_id.as_deref(), Some("p1"));
        assert_eq!(sols[1].problem_id.as_deref(), Some("p2"));
        assert_eq!(sols[2].problem_id, None);
    }

    #[test]
    fn snapshot_keeps_last_ten() {
        let tmp = TempDir::new().unwrap();
        let mut rec = ActivityRecorder::start(&config(tmp.path()), None);
        for i in 0..15 {
            rec.record_file_change(&json!({"path": format!("f{}.rs", i)}));
        }
        let snap = rec.create_snapshot();
        assert_eq!(snap.activity_count, 15);
        assert_eq!(snap.recent_activities.len(), 10);
        assert_eq!(snap.recent_activities[9].describe(), "change f14.rs");
    }

    #[test]
    fn summary_ranks_files_and_derives_achievements() {
        let tmp = TempDir::new().unwrap();
        let mut rec = ActivityRecorder::start(&config(tmp.path()), Some("checkout".into()));
        for _ in 0..3 {
            rec.record_file_change(&json!({"path": "src/app.js"}));
        }
        rec.record_file_change(&json!({"path": "README.md"}));
        rec.record_commit(&json!({
            "hash": "a1", "message": "feat: add payment form", "insertions": 10, "deletions": 2,
            "files": ["src/app.js", {"path": "src/pay.js"}]
        }));
        rec.record_commit(&json!({"hash": "b2", "message": "Fix payment bug", "insertions": 1}));
        rec.record_commit(&json!({"hash": "c3", "message": "chore: bump deps"}));
        let summary = rec.finalize();
        assert_eq!(summary.title, "checkout");
        assert_eq!(summary.top_files[0].path, "src/app.js");
        assert_eq!(summary.top_files[0].changes, 3);
        assert_eq!(summary.statistics.unique_files, 2);
        assert_eq!(summary.statistics.lines_added, 11);
        assert_eq!(summary.statistics.lines_removed, 2);
        assert_eq!(
            summary.achievements,
            vec![
                "Feature: feat: add payment form".to_string(),
                "Fix: Fix payment bug".to_string()
            ]
        );
        assert_eq!(summary.commits[0].files, vec!["src/app.js", "src/pay.js"]);
        assert!(summary_path(tmp.path(), &summary.session_id).exists());
        assert_eq!(
            rec.record_command(&json!({"command": "late"})),
            PersistOutcome::Skipped
        );
    }

    #[test]
    fn resume_continues_existing_session() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let id = {
            let mut rec = ActivityRecorder::start(&cfg, None);
            rec.record_problem(&json!({"description": "build fails"}));
            rec.session_id().to_string()
        };
        let mut rec = ActivityRecorder::resume(&cfg, &id).unwrap();
        rec.record_solution(&json!({"description": "pin toolchain", "problem": "build fails"}));
        let v = read_session(tmp.path(), &id);
        assert_eq!(v["activities"].as_array().unwrap().len(), 2);
        assert!(v["solutions"][0]["problemId"].is_string());
    }

    #[test]
    fn small_content_limit_clamps_without_overflow() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(tmp.path());
        cfg.capture.max_content_length = 500;
        let mut rec = ActivityRecorder::start(&cfg, None);
        assert_eq!(
            rec.record_command(&json!({"command": "x".repeat(600)})),
            PersistOutcome::Full
        );
        let stored = rec.session().commands[0].command.clone();
        assert!(stored.chars().count() <= 500, "{} chars", stored.chars().count());
        assert!(stored.ends_with("command chars truncated]"), "{}", stored);
        let omitted: usize = stored
            .rsplit("[... ")
            .next()
            .and_then(|tail| tail.split(' ').next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert_eq!(omitted, 600 - stored.chars().take_while(|c| *c == 'x').count());
        assert_eq!(rec.session().metadata.truncated_fields, 1);
    }

    #[test]
    fn tiny_limit_drops_the_marker() {
        let (text, cut) = clamp_text("abcdefghij".repeat(3), 8, "hash");
        assert!(cut);
        assert_eq!(text, "abcdefgh");
        let (text, cut) = clamp_text("short".to_string(), 8, "hash");
        assert!(!cut);
        assert_eq!(text, "short");
    }

    #[test]
    fn oversized_author_still_resumes() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        let id = {
            let mut rec = ActivityRecorder::start(&cfg, None);
            rec.record_commit(&json!({
                "hash": "abc",
                "message": "fix",
                "author": "a".repeat(20_000),
                "files": ["f".repeat(20_000)]
            }));
            rec.record_command(&json!({"command": "ls", "cwd": "d".repeat(20_000)}));
            rec.session_id().to_string()
        };
        let mut rec = ActivityRecorder::resume(&cfg, &id).unwrap();
        let author = rec.session().git_commits[0].author.clone().unwrap();
        assert!(author.chars().count() <= cfg.serializer.max_content_length);
        assert!(author.ends_with("author chars truncated]"));
        assert_eq!(
            rec.record_problem(&json!({"id": "p".repeat(20_000), "description": "x"})),
            PersistOutcome::Full
        );
        assert!(ActivityRecorder::resume(&cfg, &id).is_ok());
    }
}
