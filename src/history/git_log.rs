use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;

use super::patterns::{classify_commit, CommitCategory};

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';
const LOG_FORMAT: &str = "--pretty=format:%x1e%H%x1f%an%x1f%ae%x1f%aI%x1f%s";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub path: String,
    /// Zero for binary files, which git reports as `-`.
    pub added: u64,
    pub removed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedCommit {
    pub hash: String,
    pub author: String,
    pub email: String,
    /// Author date in the author's own offset, so hour/day patterns reflect
    /// local working time.
    pub date: DateTime<FixedOffset>,
    pub subject: String,
    pub category: CommitCategory,
    pub files: Vec<FileStat>,
    pub insertions: u64,
    pub deletions: u64,
}

impl MinedCommit {
    /// Loosely-typed commit event in the shape the recorder accepts.
    pub fn to_event(&self) -> Value {
        json!({
            "hash": self.hash,
            "message": self.subject,
            "author": self.author,
            "date": self.date.to_rfc3339(),
            "files": self.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
            "insertions": self.insertions,
            "deletions": self.deletions,
        })
    }
}

pub fn is_git_repo(repo: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(repo)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn head_sha(repo: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo)
        .output()
        .with_context(|| "Failed to get HEAD SHA")?;

    if !output.status.success() {
        bail!("git rev-parse HEAD failed");
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Commits from the last `days` days, newest first.
pub fn log_since(repo: &Path, days: u32) -> Result<Vec<MinedCommit>> {
    let since = format!("--since={} days ago", days);
    run_log(repo, &[since.as_str()])
}

/// Commits reachable from HEAD but not from `base`, newest first.
pub fn log_range(repo: &Path, base: &str) -> Result<Vec<MinedCommit>> {
    let range = format!("{}..HEAD", base);
    run_log(repo, &[range.as_str()])
}

fn run_log(repo: &Path, extra: &[&str]) -> Result<Vec<MinedCommit>> {
    let output = Command::new("git")
        .args(["log", "--no-color", "--numstat", LOG_FORMAT])
        .args(extra)
        .current_dir(repo)
        .output()
        .with_context(|| "Failed to execute 'git log'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git log failed in {}: {}", repo.display(), stderr.trim());
    }

    Ok(parse_log(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `git log --numstat` output produced with [`LOG_FORMAT`]. Records
/// with a malformed header are skipped.
pub fn parse_log(output: &str) -> Vec<MinedCommit> {
    output
        .split(RECORD_SEP)
        .filter(|record| !record.trim().is_empty())
        .filter_map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Option<MinedCommit> {
    let mut lines = record.lines();
    let header = lines.next()?;
    let fields: Vec<&str> = header.splitn(5, FIELD_SEP).collect();
    if fields.len() < 5 {
        return None;
    }
    let hash = fields[0].trim();
    if hash.len() < 7 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let date = DateTime::parse_from_rfc3339(fields[3].trim()).ok()?;
    let subject = fields[4].trim().to_string();

    let files: Vec<FileStat> = lines.filter_map(parse_numstat_line).collect();
    let insertions = files.iter().map(|f| f.added).sum();
    let deletions = files.iter().map(|f| f.removed).sum();

    Some(MinedCommit {
        hash: hash.to_string(),
        author: fields[1].trim().to_string(),
        email: fields[2].trim().to_string(),
        date,
        category: classify_commit(&subject),
        subject,
        files,
        insertions,
        deletions,
    })
}

fn parse_numstat_line(line: &str) -> Option<FileStat> {
    let mut parts = line.splitn(3, '\t');
    let added = parts.next()?;
    let removed = parts.next()?;
    let path = parts.next()?.trim();
    if path.is_empty() {
        return None;
    }
    Some(FileStat {
        path: path.to_string(),
        added: added.parse().unwrap_or(0),
        removed: removed.parse().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_output() -> String {
        format!(
            "{rs}{h1}{fs}Ada{fs}ada@example.com{fs}2026-10-14T09:30:00+02:00{fs}feat: add payment flow\n\
             12\t3\tsrc/payment.rs\n\
             -\t-\tassets/logo.png\n\
             \n\
             {rs}{h2}{fs}Bob{fs}bob@example.com{fs}2026-10-13T22:05:00-05:00{fs}fix: handle | pipes in subject\n\
             1\t1\tsrc/lib.rs\n",
            rs = RECORD_SEP,
            fs = FIELD_SEP,
            h1 = "a".repeat(40),
            h2 = "b".repeat(40),
        )
    }

    #[test]
    fn parses_headers_and_numstat() {
        let commits = parse_log(&sample_output());
        assert_eq!(commits.len(), 2);

        let first = &commits[0];
        assert_eq!(first.author, "Ada");
        assert_eq!(first.category, CommitCategory::Feature);
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.files[1], FileStat { path: "assets/logo.png".into(), added: 0, removed: 0 });
        assert_eq!((first.insertions, first.deletions), (12, 3));
        assert_eq!(first.date.offset().local_minus_utc(), 2 * 3600);

        assert_eq!(commits[1].subject, "fix: handle | pipes in subject");
        assert_eq!(commits[1].category, CommitCategory::Bugfix);
    }

    #[test]
    fn skips_malformed_records() {
        let out = format!("{rs}not-a-hash{fs}x{fs}y{fs}2026-10-14T09:30:00Z{fs}s\n{rs}short", rs = RECORD_SEP, fs = FIELD_SEP);
        assert!(parse_log(&out).is_empty());
        assert!(parse_log("").is_empty());
    }

    #[test]
    fn event_shape_matches_recorder() {
        let commit = parse_log(&sample_output()).remove(0);
        let event = commit.to_event();
        assert_eq!(event["message"], "feat: add payment flow");
        assert_eq!(event["files"][0], "src/payment.rs");
        assert_eq!(event["insertions"], 12);
    }

    #[test]
    fn non_repo_is_detected() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(log_since(tmp.path(), 7).is_err() || !is_git_repo(tmp.path()));
    }
}
