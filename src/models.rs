//! Session records and the typed activity union.
//!
//! A [`Session`] is what lands on disk as `<sessionDir>/<id>.json`. Every
//! recorded event becomes one [`Activity`] variant and, for the typed kinds,
//! an entry in the matching list (`fileChanges`, `gitCommits`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::truncate::Content;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Add,
    Change,
    Delete,
}

impl FileAction {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "add" | "added" | "create" | "created" => FileAction::Add,
            "delete" | "deleted" | "remove" | "removed" | "unlink" => FileAction::Delete,
            _ => FileAction::Change,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Add => "add",
            FileAction::Change => "change",
            FileAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Content>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitActivity {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Content>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: String,
    pub message: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Commit date as reported by git (RFC 3339 when available).
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub insertions: u64,
    #[serde(default)]
    pub deletions: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Content>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: String,
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Content>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Content>,
    pub timestamp: DateTime<Utc>,
}

/// A solution points at a problem by id; it never owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_id: Option<String>,
    /// Free-text reference to the problem, used for best-effort linking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub message: String,
    #[serde(default)]
    pub dropped: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    FileChange(FileChange),
    GitActivity(GitActivity),
    Commit(Commit),
    Command(CommandRecord),
    Decision(Decision),
    Problem(Problem),
    Solution(Solution),
    SystemInfo(SystemInfo),
}

impl Activity {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Activity::FileChange(e) => e.timestamp,
            Activity::GitActivity(e) => e.timestamp,
            Activity::Commit(e) => e.timestamp,
            Activity::Command(e) => e.timestamp,
            Activity::Decision(e) => e.timestamp,
            Activity::Problem(e) => e.timestamp,
            Activity::Solution(e) => e.timestamp,
            Activity::SystemInfo(e) => e.timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Activity::FileChange(_) => "file_change",
            Activity::GitActivity(_) => "git_activity",
            Activity::Commit(_) => "commit",
            Activity::Command(_) => "command",
            Activity::Decision(_) => "decision",
            Activity::Problem(_) => "problem",
            Activity::Solution(_) => "solution",
            Activity::SystemInfo(_) => "system_info",
        }
    }

    /// One-line description for snapshots and the knowledge index.
    pub fn describe(&self) -> String {
        match self {
            Activity::FileChange(e) => format!("{} {}", e.action.as_str(), e.path),
            Activity::GitActivity(e) => match &e.reference {
                Some(r) => format!("git {} {}", e.action, r),
                None => format!("git {}", e.action),
            },
            Activity::Commit(e) => format!("commit {} {}", short_hash(&e.hash), first_line(&e.message)),
            Activity::Command(e) => format!("$ {}", e.command),
            Activity::Decision(e) => format!("decided: {}", e.decision),
            Activity::Problem(e) => format!("problem: {}", e.description),
            Activity::Solution(e) => format!("solved: {}", e.description),
            Activity::SystemInfo(e) => e.message.clone(),
        }
    }
}

/// Missing fields default, so reconstructed sessions load with the
/// counts they carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetadata {
    pub activity_count: usize,
    pub file_change_count: usize,
    pub commit_count: usize,
    pub command_count: usize,
    pub decision_count: usize,
    pub problem_count: usize,
    pub solution_count: usize,
    /// Total events ever recorded, including those evicted from `activities`.
    pub total_events: u64,
    pub dropped_activities: u64,
    pub truncated_fields: u64,
    /// False once any persist fell back to the minimal backup.
    pub serialization_safe: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub start: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
    #[serde(default)]
    pub git_commits: Vec<Commit>,
    #[serde(default)]
    pub commands: Vec<CommandRecord>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new(session_id: String, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            title,
            start: now,
            last_update: now,
            activities: Vec::new(),
            file_changes: Vec::new(),
            git_commits: Vec::new(),
            commands: Vec::new(),
            decisions: Vec::new(),
            problems: Vec::new(),
            solutions: Vec::new(),
            metadata: SessionMetadata {
                serialization_safe: true,
                ..Default::default()
            },
        }
    }

    /// Bring the recorded counts in line with the actual list lengths.
    pub fn refresh_counts(&mut self) {
        let m = &mut self.metadata;
        m.activity_count = self.activities.len();
        m.file_change_count = self.file_changes.len();
        m.commit_count = self.git_commits.len();
        m.command_count = self.commands.len();
        m.decision_count = self.decisions.len();
        m.problem_count = self.problems.len();
        m.solution_count = self.solutions.len();
    }
}

/// Reduced-fidelity record written when the full session cannot be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBackup {
    pub session_id: String,
    pub start: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub metadata: SessionMetadata,
    pub activities: Vec<Activity>,
    pub backup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub duration_seconds: i64,
    pub activity_count: usize,
    pub file_change_count: usize,
    pub commit_count: usize,
    pub command_count: usize,
    pub decision_count: usize,
    pub problem_count: usize,
    pub solution_count: usize,
    pub recent_activities: Vec<Activity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStatistics {
    pub total_events: u64,
    pub activities: usize,
    pub file_changes: usize,
    pub unique_files: usize,
    pub commits: usize,
    pub commands: usize,
    pub decisions: usize,
    pub problems: usize,
    pub solutions: usize,
    pub lines_added: u64,
    pub lines_removed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTouchCount {
    pub path: String,
    pub changes: u64,
}

/// Finalized, read-only view of a session, ready for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: i64,
    pub statistics: SummaryStatistics,
    pub top_files: Vec<FileTouchCount>,
    pub achievements: Vec<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
}

pub fn short_hash(hash: &str) -> &str {
    let end = hash.char_indices().nth(8).map(|(i, _)| i).unwrap_or(hash.len());
    &hash[..end]
}

pub fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
