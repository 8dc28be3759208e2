//! History mining: git log analysis plus cross-source recovery.
//!
//! Every source is best-effort. A source that fails is recorded in
//! [`UnifiedHistory::sources`] with its error and the rest still merge.

pub mod attribution;
pub mod git_log;
pub mod patterns;
pub mod sources;
pub mod watch;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::config::{Config, HistoryConfig};
use crate::models::FileTouchCount;
use attribution::{attribute, SourceStatus, TimelineEvent, UnifiedHistory};
use git_log::MinedCommit;
use patterns::{activity_patterns, commit_dates, current_streak, longest_streak, rank_files, ActivityPatterns};
use sources::{DocRecord, SessionLogEntry, ShellCommand};

pub use watch::GitWatcher;

const TOP_FILES: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHistory {
    pub repo: String,
    pub days: u32,
    pub generated_at: DateTime<Utc>,
    pub total_commits: usize,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub categories: BTreeMap<&'static str, usize>,
    pub authors: BTreeMap<String, usize>,
    pub top_files: Vec<FileTouchCount>,
    pub patterns: ActivityPatterns,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub commits: Vec<MinedCommit>,
}

/// Aggregate already-mined commits. `today` anchors the current streak.
pub fn summarize_commits(repo: &str, days: u32, commits: Vec<MinedCommit>, today: NaiveDate) -> GitHistory {
    let mut categories: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut authors: BTreeMap<String, usize> = BTreeMap::new();
    let mut touches: HashMap<String, u64> = HashMap::new();
    for commit in &commits {
        *categories.entry(commit.category.as_str()).or_insert(0) += 1;
        *authors.entry(commit.author.clone()).or_insert(0) += 1;
        for file in &commit.files {
            *touches.entry(file.path.clone()).or_insert(0) += 1;
        }
    }
    let dates = commit_dates(&commits);

    GitHistory {
        repo: repo.to_string(),
        days,
        generated_at: Utc::now(),
        total_commits: commits.len(),
        lines_added: commits.iter().map(|c| c.insertions).sum(),
        lines_removed: commits.iter().map(|c| c.deletions).sum(),
        categories,
        authors,
        top_files: rank_files(&touches, TOP_FILES),
        patterns: activity_patterns(&commits),
        current_streak: current_streak(&dates, today),
        longest_streak: longest_streak(&dates),
        commits,
    }
}

pub fn mine_git_history(repo: &Path, days: u32) -> Result<GitHistory> {
    let commits = git_log::log_since(repo, days)?;
    tracing::info!(repo = %repo.display(), days, commits = commits.len(), "git history mined");
    Ok(summarize_commits(
        &repo.display().to_string(),
        days,
        commits,
        Local::now().date_naive(),
    ))
}

/// Result of a cross-source recovery run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredHistory {
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitHistory>,
    pub top_files: Vec<FileTouchCount>,
    pub unified: UnifiedHistory,
    #[serde(skip)]
    pub documents: Vec<DocRecord>,
}

/// Mine git, session logs, documents, and shell history, then merge.
pub fn recover_history(config: &Config, repo: &Path) -> RecoveredHistory {
    let history = &config.history;
    let mut unified = UnifiedHistory::default();

    let git = match mine_git_history(repo, history.days) {
        Ok(git) => {
            unified.merge(from_git(&git, history));
            Some(git)
        }
        Err(e) => {
            tracing::warn!(error = %e, "git source skipped");
            unified.sources.push(failed("git", &e));
            None
        }
    };

    match sources::scan_session_logs(&config.capture.session_dir) {
        Ok(entries) => unified.merge(from_sessions(&entries, history)),
        Err(e) => {
            tracing::warn!(error = %e, "session log source skipped");
            unified.sources.push(failed("sessions", &e));
        }
    }

    let mut documents = Vec::new();
    for root in &history.doc_roots {
        match sources::scan_documents(root, &history.doc_globs) {
            Ok(docs) => {
                unified.merge(from_documents(&docs, history));
                documents.extend(docs);
            }
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "document source skipped");
                unified.sources.push(failed("documents", &e));
            }
        }
    }

    for path in &history.shell_history {
        match sources::scan_shell_history(path) {
            Ok(cmds) => unified.merge(from_shell(&cmds, history)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "shell history source skipped");
                unified.sources.push(failed("shell", &e));
            }
        }
    }

    RecoveredHistory {
        generated_at: Utc::now(),
        git,
        top_files: unified.top_files(TOP_FILES),
        unified,
        documents,
    }
}

fn failed(source: &str, e: &anyhow::Error) -> SourceStatus {
    SourceStatus {
        source: source.to_string(),
        items: 0,
        error: Some(format!("{:#}", e)),
    }
}

fn ok(source: &str, items: usize) -> SourceStatus {
    SourceStatus {
        source: source.to_string(),
        items,
        error: None,
    }
}

pub fn commit_text(commit: &MinedCommit) -> String {
    let mut text = commit.subject.clone();
    for file in &commit.files {
        text.push('\n');
        text.push_str(&file.path);
    }
    text
}

pub fn from_git(git: &GitHistory, config: &HistoryConfig) -> UnifiedHistory {
    let mut out = UnifiedHistory::default();
    for commit in &git.commits {
        let text = commit_text(commit);
        let attribution = attribute(&text, &config.projects);
        let at = commit.date.with_timezone(&Utc);
        out.add_event(
            commit.date.date_naive(),
            TimelineEvent {
                source: "git".to_string(),
                kind: commit.category.as_str().to_string(),
                summary: commit.subject.clone(),
                reference: Some(commit.hash.clone()),
                project: attribution.project.clone(),
            },
        );
        out.count_developer(&commit.author, 1);
        out.count_technologies(&text, &config.technologies);
        for file in &commit.files {
            out.touch_file(&file.path, 1);
        }
        out.credit_project(&attribution, Some(at), |p| p.commits += 1);
    }
    out.sources.push(ok("git", git.commits.len()));
    out
}

pub fn from_sessions(entries: &[SessionLogEntry], config: &HistoryConfig) -> UnifiedHistory {
    let mut out = UnifiedHistory::default();
    for entry in entries {
        let text = entry.text();
        let attribution = attribute(&text, &config.projects);
        if let Some(start) = entry.start {
            out.add_event(
                start.date_naive(),
                TimelineEvent {
                    source: "session".to_string(),
                    kind: "session".to_string(),
                    summary: entry
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("Session {}", entry.session_id)),
                    reference: Some(entry.session_id.clone()),
                    project: attribution.project.clone(),
                },
            );
        }
        out.count_technologies(&text, &config.technologies);
        for file in &entry.files {
            out.touch_file(file, 1);
        }
        out.credit_project(&attribution, entry.start, |p| {
            p.sessions += 1;
            p.commands += entry.commands.len();
        });
    }
    out.sources.push(ok("sessions", entries.len()));
    out
}

pub fn from_documents(docs: &[DocRecord], config: &HistoryConfig) -> UnifiedHistory {
    let mut out = UnifiedHistory::default();
    for doc in docs {
        let text = format!("{}\n{}\n{}", doc.title, doc.path, doc.content);
        let attribution = attribute(&text, &config.projects);
        out.add_event(
            doc.modified.date_naive(),
            TimelineEvent {
                source: "document".to_string(),
                kind: "document".to_string(),
                summary: doc.title.clone(),
                reference: Some(doc.path.clone()),
                project: attribution.project.clone(),
            },
        );
        out.count_technologies(&text, &config.technologies);
        out.credit_project(&attribution, Some(doc.modified), |p| p.documents += 1);
    }
    out.sources.push(ok("documents", docs.len()));
    out
}

pub fn from_shell(commands: &[ShellCommand], config: &HistoryConfig) -> UnifiedHistory {
    let mut out = UnifiedHistory::default();
    for cmd in commands {
        let attribution = attribute(&cmd.command, &config.projects);
        if let Some(at) = cmd.timestamp {
            out.add_event(
                at.date_naive(),
                TimelineEvent {
                    source: "shell".to_string(),
                    kind: cmd.tool.clone(),
                    summary: cmd.command.clone(),
                    reference: None,
                    project: attribution.project.clone(),
                },
            );
        }
        out.count_technologies(&cmd.command, &config.technologies);
        out.credit_project(&attribution, cmd.timestamp, |p| p.commands += 1);
    }
    out.sources.push(ok("shell", commands.len()));
    out
}
