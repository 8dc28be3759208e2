//! Non-git history sources: session logs, documents, and shell history.

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

use crate::session_files::{list_session_ids, primary_path};

/// What one session file contributes to the unified history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLogEntry {
    pub session_id: String,
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub files: Vec<String>,
    pub commands: Vec<String>,
    pub notes: Vec<String>,
}

impl SessionLogEntry {
    /// All text used for project attribution.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.title.as_deref());
        parts.extend(self.files.iter().map(String::as_str));
        parts.extend(self.commands.iter().map(String::as_str));
        parts.extend(self.notes.iter().map(String::as_str));
        parts.join("\n")
    }
}

/// Read every primary session file. Unreadable files are skipped with a
/// warning.
pub fn scan_session_logs(session_dir: &Path) -> Result<Vec<SessionLogEntry>> {
    if !session_dir.exists() {
        bail!("Session directory does not exist: {}", session_dir.display());
    }
    let mut entries = Vec::new();
    for id in list_session_ids(session_dir)? {
        let path = primary_path(session_dir, &id);
        let doc: Value = match std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<Value>(&bytes)?))
        {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session log");
                continue;
            }
        };
        entries.push(session_entry(&id, &doc));
    }
    Ok(entries)
}

fn session_entry(id: &str, doc: &Value) -> SessionLogEntry {
    let list = |field: &str, key: &str| -> Vec<String> {
        doc.get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(key).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let mut notes = list("decisions", "decision");
    notes.extend(list("problems", "description"));
    notes.extend(list("solutions", "description"));
    notes.extend(list("gitCommits", "message"));

    SessionLogEntry {
        session_id: doc
            .get("sessionId")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string(),
        title: doc.get("title").and_then(Value::as_str).map(str::to_string),
        start: doc
            .get("start")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        files: list("fileChanges", "path"),
        commands: list("commands", "command"),
        notes,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocRecord {
    pub path: String,
    pub title: String,
    pub content: String,
    pub modified: DateTime<Utc>,
}

/// Walk `root` for documents matching `include_globs`, skipping build and
/// VCS directories.
pub fn scan_documents(root: &Path, include_globs: &[String]) -> Result<Vec<DocRecord>> {
    if !root.exists() {
        bail!("Document root does not exist: {}", root.display());
    }
    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(&[
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ])?;

    let mut docs = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable document");
                continue;
            }
        };
        let modified_secs = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        docs.push(DocRecord {
            title: doc_title(&content).unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            }),
            path: rel_str,
            content,
            modified: Utc
                .timestamp_opt(modified_secs, 0)
                .single()
                .unwrap_or_default(),
        });
    }

    docs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(docs)
}

/// First Markdown heading, if any.
fn doc_title(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

const DEV_TOOLS: [&str; 16] = [
    "git", "cargo", "rustc", "npm", "npx", "yarn", "pnpm", "node", "python", "python3", "pip",
    "docker", "kubectl", "make", "go", "psql",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellCommand {
    pub tool: String,
    pub command: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Developer commands from bash or zsh history text. Zsh extended entries
/// (`: <epoch>:<elapsed>;<command>`) keep their timestamp.
pub fn parse_shell_history(text: &str) -> Vec<ShellCommand> {
    text.lines()
        .filter_map(|line| {
            let (timestamp, command) = split_zsh_entry(line.trim());
            let tool = command.split_whitespace().next()?;
            let tool = tool.rsplit('/').next().unwrap_or(tool);
            if !DEV_TOOLS.contains(&tool) {
                return None;
            }
            Some(ShellCommand {
                tool: tool.to_string(),
                command: command.to_string(),
                timestamp,
            })
        })
        .collect()
}

fn split_zsh_entry(line: &str) -> (Option<DateTime<Utc>>, &str) {
    let Some(rest) = line.strip_prefix(": ") else {
        return (None, line);
    };
    let Some((meta, command)) = rest.split_once(';') else {
        return (None, line);
    };
    let timestamp = meta
        .split(':')
        .next()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    (timestamp, command.trim())
}

pub fn scan_shell_history(path: &Path) -> Result<Vec<ShellCommand>> {
    let bytes = std::fs::read(path)?;
    Ok(parse_shell_history(&String::from_utf8_lossy(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn shell_history_keeps_dev_commands() {
        let text = "ls -la\n: 1760000000:0;cargo test -p devtrail\n/usr/bin/git status\necho hi\nnpm run build\n";
        let cmds = parse_shell_history(text);
        let tools: Vec<_> = cmds.iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(tools, vec!["cargo", "git", "npm"]);
        assert_eq!(cmds[0].command, "cargo test -p devtrail");
        assert_eq!(cmds[0].timestamp.unwrap().timestamp(), 1_760_000_000);
        assert!(cmds[1].timestamp.is_none());
    }

    #[test]
    fn documents_use_heading_as_title() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("docs/payments.md"), "intro\n# Payment gateway notes\nbody").unwrap();
        std::fs::write(root.join("notes.md"), "no heading").unwrap();
        std::fs::write(root.join("node_modules/pkg/README.md"), "# vendored").unwrap();
        std::fs::write(root.join("main.rs"), "fn main() {}").unwrap();

        let docs = scan_documents(root, &["**/*.md".to_string()]).unwrap();
        let paths: Vec<_> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/payments.md", "notes.md"]);
        assert_eq!(docs[0].title, "Payment gateway notes");
        assert_eq!(docs[1].title, "notes.md");
    }

    #[test]
    fn session_logs_skip_garbage() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("s1.json"),
            r#"{"sessionId": "s1", "title": "Checkout", "start": "2026-10-01T10:00:00Z",
                "fileChanges": [{"path": "src/app.js"}], "commands": [{"command": "npm test"}],
                "problems": [{"description": "stripe webhook 400"}]}"#,
        )
        .unwrap();
        std::fs::write(tmp.path().join("s2.json"), "{broken").unwrap();

        let entries = scan_session_logs(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].files, vec!["src/app.js"]);
        assert!(entries[0].text().contains("stripe webhook"));
        assert!(scan_session_logs(&tmp.path().join("missing")).is_err());
    }
}
