//! `trail capture`: feed filesystem and git events into one recorder.
//!
//! The notify watcher and the [`GitWatcher`] run independently and only
//! send over channels; the recorder task is the single writer of the
//! session file. Feed failures are logged and never reach the recorder.

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::history::git_log::{is_git_repo, MinedCommit};
use crate::history::GitWatcher;
use crate::index::KnowledgeIndex;
use crate::models::SessionSummary;
use crate::recorder::ActivityRecorder;

const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules"];

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub title: Option<String>,
    pub watch_dir: PathBuf,
    pub repo: Option<PathBuf>,
    pub index: bool,
}

/// Paths under an ignored directory or the session directory itself.
pub fn is_ignored(path: &Path, session_dir: &Path) -> bool {
    if path.starts_with(session_dir) {
        return true;
    }
    path.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .map(|n| IGNORED_DIRS.contains(&n))
            .unwrap_or(false),
        _ => false,
    })
}

/// Translate one notify event into file-change events for the recorder.
pub fn file_events(event: &Event, root: &Path, session_dir: &Path) -> Vec<Value> {
    let action = match &event.kind {
        EventKind::Create(_) => "add",
        EventKind::Remove(_) => "delete",
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => "change",
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter(|p| !is_ignored(p, session_dir))
        .map(|p| {
            let shown = p.strip_prefix(root).unwrap_or(p);
            json!({ "path": shown.display().to_string(), "action": action })
        })
        .collect()
}

fn create_fs_watcher(
    root: &Path,
    session_dir: &Path,
    sender: mpsc::Sender<Value>,
) -> Result<RecommendedWatcher> {
    let root_owned = root.to_path_buf();
    let session_dir = session_dir.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in file_events(&event, &root_owned, &session_dir) {
                    if sender.blocking_send(change).is_err() {
                        return;
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "file watcher error"),
        },
        NotifyConfig::default(),
    )
    .context("Failed to initialise file watcher")?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    Ok(watcher)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Run a capture session until Ctrl-C, then finalize it and optionally
/// index the summary.
pub async fn run_capture(config: &Config, opts: CaptureOptions) -> Result<SessionSummary> {
    let mut recorder = ActivityRecorder::start(config, opts.title.clone());
    let root = canonical(&opts.watch_dir);
    let session_dir = canonical(recorder.session_dir());

    let (file_tx, mut file_rx) = mpsc::channel::<Value>(1024);
    let (commit_tx, mut commit_rx) = mpsc::channel::<MinedCommit>(64);

    // A watcher that fails to start leaves the session running without it.
    let _watcher = match create_fs_watcher(&root, &session_dir, file_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "file feed disabled");
            None
        }
    };

    let repo = opts.repo.clone().unwrap_or_else(|| config.history.repo.clone());
    let git_task = if is_git_repo(&repo) {
        let watcher = GitWatcher::new(repo, config.history.poll_interval());
        Some(tokio::spawn(watcher.run(commit_tx)))
    } else {
        tracing::warn!(repo = %repo.display(), "not a git repository, commit feed disabled");
        drop(commit_tx);
        None
    };

    tracing::info!(
        session_id = recorder.session_id(),
        watch = %root.display(),
        "capturing; press Ctrl-C to finish"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            Some(change) = file_rx.recv() => {
                recorder.record_file_change(&change);
            }
            Some(commit) = commit_rx.recv() => {
                recorder.record_commit(&commit.to_event());
            }
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    if let Some(task) = git_task {
        task.abort();
    }
    let summary = recorder.finalize();

    if opts.index {
        let index = KnowledgeIndex::open(&config.index).await?;
        index
            .index_session(&summary, &config.history.projects)
            .await
            .context("Failed to index finalized session")?;
        index.close().await;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, MetadataKind, RemoveKind};

    #[test]
    fn ignores_build_and_session_dirs() {
        let sessions = Path::new("/repo/sessions");
        assert!(is_ignored(Path::new("/repo/target/debug/x"), sessions));
        assert!(is_ignored(Path::new("/repo/web/node_modules/a.js"), sessions));
        assert!(is_ignored(Path::new("/repo/.git/HEAD"), sessions));
        assert!(is_ignored(Path::new("/repo/sessions/s1.json"), sessions));
        assert!(!is_ignored(Path::new("/repo/src/targets.rs"), sessions));
    }

    #[test]
    fn events_map_to_actions() {
        let root = Path::new("/repo");
        let sessions = Path::new("/repo/sessions");
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/repo/src/main.rs"));
        assert_eq!(
            file_events(&created, root, sessions),
            vec![json!({"path": "src/main.rs", "action": "add"})]
        );

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/repo/target/x"));
        assert!(file_events(&removed, root, sessions).is_empty());

        let touched = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(PathBuf::from("/repo/src/main.rs"));
        assert!(file_events(&touched, root, sessions).is_empty());
    }
}
