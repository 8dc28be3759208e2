//! Polling git watcher.
//!
//! Each tick compares HEAD against the last observed commit and forwards
//! every commit in between, oldest first. Errors are logged and the loop
//! keeps going; nothing is propagated to the receiver.

use anyhow::Result;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use super::git_log::{self, MinedCommit};

const SEEN_LIMIT: usize = 4096;

/// Most recently reported hashes, oldest evicted first.
struct RecentHashes {
    set: HashSet<String>,
    order: VecDeque<String>,
    limit: usize,
}

impl RecentHashes {
    fn new(limit: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            limit,
        }
    }

    /// True when `hash` was not already present.
    fn insert(&mut self, hash: &str) -> bool {
        if self.set.contains(hash) {
            return false;
        }
        self.set.insert(hash.to_string());
        self.order.push_back(hash.to_string());
        while self.order.len() > self.limit {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct GitWatcher {
    repo: PathBuf,
    interval: Duration,
    last_head: Option<String>,
    seen: RecentHashes,
}

impl GitWatcher {
    pub fn new(repo: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            repo: repo.into(),
            interval,
            last_head: None,
            seen: RecentHashes::new(SEEN_LIMIT),
        }
    }

    pub fn last_head(&self) -> Option<&str> {
        self.last_head.as_deref()
    }

    /// New commits since the previous poll. The first poll only records
    /// the baseline HEAD.
    pub fn poll(&mut self) -> Result<Vec<MinedCommit>> {
        let head = git_log::head_sha(&self.repo)?;
        let Some(last) = self.last_head.clone() else {
            tracing::debug!(head = %head, repo = %self.repo.display(), "git watcher baseline");
            self.seen.insert(&head);
            self.last_head = Some(head);
            return Ok(Vec::new());
        };
        if last == head {
            return Ok(Vec::new());
        }

        let mut commits = match git_log::log_range(&self.repo, &last) {
            Ok(commits) => commits,
            // History was rewritten under us; report only the new HEAD.
            Err(_) => git_log::log_range(&self.repo, &format!("{}~1", head))?,
        };
        commits.retain(|c| self.seen.insert(&c.hash));
        commits.reverse();
        self.last_head = Some(head);
        Ok(commits)
    }

    /// Poll until the receiver is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<MinedCommit>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let joined = tokio::task::spawn_blocking(move || {
                let result = self.poll();
                (self, result)
            })
            .await;
            let (watcher, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "git watcher task panicked, stopping");
                    return;
                }
            };
            self = watcher;
            match result {
                Ok(commits) => {
                    for commit in commits {
                        tracing::info!(hash = %commit.hash, subject = %commit.subject, "new commit");
                        if tx.send(commit).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!(repo = %self.repo.display(), error = %e, "git poll failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn commit(dir: &Path, file: &str, message: &str) -> bool {
        std::fs::write(dir.join(file), message).unwrap();
        git(dir, &["add", file])
            && git(
                dir,
                &["-c", "user.name=Test", "-c", "user.email=t@example.com", "commit", "-q", "-m", message],
            )
    }

    #[test]
    fn reports_each_new_commit_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();
        if !git(dir, &["init", "-q"]) || !commit(dir, "a.txt", "initial") {
            return; // git not available
        }

        let mut watcher = GitWatcher::new(dir, Duration::from_secs(1));
        assert!(watcher.poll().unwrap().is_empty());
        assert!(watcher.last_head().is_some());

        assert!(commit(dir, "b.txt", "add b"));
        assert!(commit(dir, "c.txt", "fix c"));
        let new = watcher.poll().unwrap();
        let subjects: Vec<_> = new.iter().map(|c| c.subject.as_str()).collect();
        assert_eq!(subjects, vec!["add b", "fix c"]);
        assert!(watcher.poll().unwrap().is_empty());
    }

    #[test]
    fn seen_hashes_are_bounded() {
        let mut seen = RecentHashes::new(3);
        for hash in ["a", "b", "c", "d"] {
            assert!(seen.insert(hash));
        }
        assert_eq!(seen.len(), 3);
        assert!(!seen.insert("d"));
        assert!(seen.insert("a"));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn missing_repo_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut watcher = GitWatcher::new(tmp.path().join("nope"), Duration::from_secs(1));
        assert!(watcher.poll().is_err());
    }
}
