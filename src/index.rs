//! SQLite-backed knowledge index.
//!
//! Relational tables hold the structured session data; `knowledge_docs`
//! holds one searchable document per session, commit, problem, project,
//! or note. The FTS5 table is rebuilt wholesale from `knowledge_docs`
//! every `fts_rebuild_interval` changed documents, so new documents become
//! full-text searchable only after the next rebuild. Exact-match search
//! reads the relational tables and sees them immediately.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{IndexConfig, ProjectRule};
use crate::db;
use crate::history::attribution::{attribute, ProjectRecord};
use crate::history::commit_text;
use crate::history::git_log::MinedCommit;
use crate::history::patterns::classify_commit;
use crate::history::sources::DocRecord;
use crate::migrate;
use crate::models::{first_line, Commit, SessionSummary};
use crate::recorder::{link_problem, top_files};

const PENDING_KEY: &str = "docs_since_rebuild";

/// One row of `knowledge_docs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDoc {
    pub doc_id: String,
    pub doc_type: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub updated_at: i64,
}

impl KnowledgeDoc {
    pub fn tags_text(&self) -> String {
        self.tags.join(" ")
    }

    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.doc_type.as_bytes());
        hasher.update([0]);
        hasher.update(self.title.as_bytes());
        hasher.update([0]);
        hasher.update(self.tags_text().as_bytes());
        hasher.update([0]);
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub session_id: Option<String>,
    pub activities: usize,
    pub commits: usize,
    pub file_touches: usize,
    pub decisions: usize,
    pub problems: usize,
    pub solutions: usize,
    pub documents_changed: usize,
    pub full_text_rebuilt: bool,
}

pub struct KnowledgeIndex {
    pool: SqlitePool,
    rebuild_interval: u32,
    search_limit: i64,
}

impl KnowledgeIndex {
    pub async fn open(config: &IndexConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool)
            .await
            .context("Failed to migrate knowledge index")?;
        Ok(Self {
            pool,
            rebuild_interval: config.fts_rebuild_interval.max(1),
            search_limit: config.search_limit,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn search_limit(&self) -> i64 {
        self.search_limit
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Load a finalized summary from `path` and index it.
    pub async fn ingest_summary_file(&self, path: &Path, rules: &[ProjectRule]) -> Result<IndexReport> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read summary: {}", path.display()))?;
        let summary: SessionSummary = serde_json::from_str(&text)
            .with_context(|| format!("Not a session summary: {}", path.display()))?;
        self.index_session(&summary, rules).await
    }

    /// Insert the session and every record it carries, then upsert its
    /// search documents. Re-indexing the same session replaces its rows.
    pub async fn index_session(
        &self,
        summary: &SessionSummary,
        rules: &[ProjectRule],
    ) -> Result<IndexReport> {
        let id = summary.session_id.as_str();
        let project = attribute(&session_text(summary), rules).project;
        let mut report = IndexReport {
            session_id: Some(id.to_string()),
            ..IndexReport::default()
        };

        let mut tx = self.pool.begin().await?;
        for table in ["activities", "file_touches", "decisions", "problems", "solutions"] {
            sqlx::query(&format!("DELETE FROM {} WHERE session_id = ?", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let stats = &summary.statistics;
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, title, start_time, end_time, duration_seconds,
                activity_count, file_change_count, commit_count, decision_count, problem_count,
                solution_count, lines_added, lines_removed, achievements_json, project, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                title = excluded.title,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                duration_seconds = excluded.duration_seconds,
                activity_count = excluded.activity_count,
                file_change_count = excluded.file_change_count,
                commit_count = excluded.commit_count,
                decision_count = excluded.decision_count,
                problem_count = excluded.problem_count,
                solution_count = excluded.solution_count,
                lines_added = excluded.lines_added,
                lines_removed = excluded.lines_removed,
                achievements_json = excluded.achievements_json,
                project = excluded.project,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(id)
        .bind(&summary.title)
        .bind(summary.start.timestamp())
        .bind(summary.end.timestamp())
        .bind(summary.duration_seconds)
        .bind(stats.activities as i64)
        .bind(stats.file_changes as i64)
        .bind(stats.commits as i64)
        .bind(stats.decisions as i64)
        .bind(stats.problems as i64)
        .bind(stats.solutions as i64)
        .bind(stats.lines_added as i64)
        .bind(stats.lines_removed as i64)
        .bind(serde_json::to_string(&summary.achievements)?)
        .bind(&project)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        for (seq, activity) in summary.activities.iter().enumerate() {
            sqlx::query(
                "INSERT INTO activities (session_id, seq, kind, description, occurred_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(seq as i64)
            .bind(activity.kind())
            .bind(activity.describe())
            .bind(activity.timestamp().timestamp())
            .execute(&mut *tx)
            .await?;
        }
        report.activities = summary.activities.len();

        // Without a hash a commit has no stable key in the commits table.
        let commits: Vec<CommitRow> = summary
            .commits
            .iter()
            .filter(|c| !c.hash.trim().is_empty())
            .map(session_commit)
            .collect();
        let skipped = summary.commits.len() - commits.len();
        if skipped > 0 {
            tracing::warn!(session_id = id, skipped, "commits without a hash not indexed");
        }
        for commit in &commits {
            upsert_commit(&mut tx, commit, Some(id), project.as_deref()).await?;
        }
        report.commits = commits.len();

        let touches = top_files(&summary.file_changes, usize::MAX);
        for touch in &touches {
            sqlx::query("INSERT INTO file_touches (session_id, path, changes) VALUES (?, ?, ?)")
                .bind(id)
                .bind(&touch.path)
                .bind(touch.changes as i64)
                .execute(&mut *tx)
                .await?;
        }
        report.file_touches = touches.len();

        for d in &summary.decisions {
            sqlx::query(
                "INSERT OR REPLACE INTO decisions (id, session_id, decision, rationale, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&d.id)
            .bind(id)
            .bind(&d.decision)
            .bind(&d.rationale)
            .bind(d.timestamp.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        report.decisions = summary.decisions.len();

        for p in &summary.problems {
            sqlx::query(
                "INSERT OR REPLACE INTO problems (id, session_id, description, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&p.id)
            .bind(id)
            .bind(&p.description)
            .bind(p.timestamp.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        report.problems = summary.problems.len();

        for s in &summary.solutions {
            let problem_id = s.problem_id.clone().or_else(|| {
                link_problem(
                    &summary.problems,
                    s.problem.as_deref().unwrap_or(&s.description),
                )
            });
            sqlx::query(
                "INSERT OR REPLACE INTO solutions (id, session_id, problem_id, description, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&s.id)
            .bind(id)
            .bind(&problem_id)
            .bind(&s.description)
            .bind(s.timestamp.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        report.solutions = summary.solutions.len();
        tx.commit().await?;

        let mut docs = vec![session_doc(summary, project.as_deref())];
        docs.extend(commits.iter().map(|c| commit_doc(c, Some(id))));
        docs.extend(problem_docs(summary));
        report.documents_changed = self.upsert_docs(&docs).await?;
        report.full_text_rebuilt = self.note_changes(report.documents_changed).await?;

        tracing::info!(
            session_id = id,
            activities = report.activities,
            documents = report.documents_changed,
            "session indexed"
        );
        Ok(report)
    }

    /// Store mined commits that belong to no session.
    pub async fn index_commits(&self, commits: &[MinedCommit], rules: &[ProjectRule]) -> Result<IndexReport> {
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(commits.len());
        for commit in commits {
            let project = attribute(&commit_text(commit), rules).project;
            let row = CommitRow::from_mined(commit);
            upsert_commit(&mut tx, &row, None, project.as_deref()).await?;
            rows.push(row);
        }
        tx.commit().await?;

        let docs: Vec<KnowledgeDoc> = rows.iter().map(|r| commit_doc(r, None)).collect();
        let documents_changed = self.upsert_docs(&docs).await?;
        Ok(IndexReport {
            commits: commits.len(),
            documents_changed,
            full_text_rebuilt: self.note_changes(documents_changed).await?,
            ..IndexReport::default()
        })
    }

    /// Store project summaries and scanned documents as search documents.
    pub async fn index_notes(
        &self,
        projects: &BTreeMap<String, ProjectRecord>,
        documents: &[DocRecord],
    ) -> Result<IndexReport> {
        let mut docs: Vec<KnowledgeDoc> = projects.values().map(project_doc).collect();
        docs.extend(documents.iter().map(|d| KnowledgeDoc {
            doc_id: format!("doc:{}", d.path),
            doc_type: "document".to_string(),
            title: d.title.clone(),
            content: d.content.clone(),
            tags: vec![d.path.clone()],
            session_id: None,
            updated_at: d.modified.timestamp(),
        }));
        let documents_changed = self.upsert_docs(&docs).await?;
        Ok(IndexReport {
            documents_changed,
            full_text_rebuilt: self.note_changes(documents_changed).await?,
            ..IndexReport::default()
        })
    }

    /// Upsert documents whose content hash changed. Returns how many did.
    pub async fn upsert_docs(&self, docs: &[KnowledgeDoc]) -> Result<usize> {
        let mut changed = 0;
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            let hash = doc.content_hash();
            let existing: Option<String> =
                sqlx::query_scalar("SELECT content_hash FROM knowledge_docs WHERE doc_id = ?")
                    .bind(&doc.doc_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if existing.as_deref() == Some(hash.as_str()) {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO knowledge_docs (doc_id, doc_type, title, content, tags, session_id, content_hash, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(doc_id) DO UPDATE SET
                    doc_type = excluded.doc_type,
                    title = excluded.title,
                    content = excluded.content,
                    tags = excluded.tags,
                    session_id = COALESCE(excluded.session_id, knowledge_docs.session_id),
                    content_hash = excluded.content_hash,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&doc.doc_id)
            .bind(&doc.doc_type)
            .bind(&doc.title)
            .bind(&doc.content)
            .bind(doc.tags_text())
            .bind(&doc.session_id)
            .bind(&hash)
            .bind(doc.updated_at)
            .execute(&mut *tx)
            .await?;
            changed += 1;
        }
        tx.commit().await?;
        Ok(changed)
    }

    /// Documents changed since the last full-text rebuild.
    pub async fn pending_changes(&self) -> Result<u32> {
        let pending: Option<i64> = sqlx::query_scalar("SELECT value FROM index_state WHERE key = ?")
            .bind(PENDING_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pending.unwrap_or(0).max(0) as u32)
    }

    async fn note_changes(&self, changed: usize) -> Result<bool> {
        if changed == 0 {
            return Ok(false);
        }
        sqlx::query(
            r#"
            INSERT INTO index_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = index_state.value + excluded.value
            "#,
        )
        .bind(PENDING_KEY)
        .bind(changed as i64)
        .execute(&self.pool)
        .await?;

        if self.pending_changes().await? >= self.rebuild_interval {
            self.rebuild_full_text().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Replace the full-text table with the current document table in one
    /// transaction. Returns the number of documents indexed.
    pub async fn rebuild_full_text(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM knowledge_fts")
            .execute(&mut *tx)
            .await?;
        let inserted = sqlx::query(
            "INSERT INTO knowledge_fts (doc_id, title, tags, content) SELECT doc_id, title, tags, content FROM knowledge_docs",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query(
            "INSERT INTO index_state (key, value) VALUES (?, 0) ON CONFLICT(key) DO UPDATE SET value = 0",
        )
        .bind(PENDING_KEY)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(documents = inserted, "full-text index rebuilt");
        Ok(inserted)
    }
}

/// Commit fields shared by session commits and mined commits.
#[derive(Debug, Clone)]
struct CommitRow {
    hash: String,
    author: Option<String>,
    message: String,
    committed_at: DateTime<Utc>,
    insertions: u64,
    deletions: u64,
    files: Vec<String>,
    category: Option<String>,
}

impl CommitRow {
    fn from_mined(c: &MinedCommit) -> Self {
        Self {
            hash: c.hash.clone(),
            author: Some(c.author.clone()),
            message: c.subject.clone(),
            committed_at: c.date.with_timezone(&Utc),
            insertions: c.insertions,
            deletions: c.deletions,
            files: c.files.iter().map(|f| f.path.clone()).collect(),
            category: Some(c.category.as_str().to_string()),
        }
    }
}

fn session_commit(c: &Commit) -> CommitRow {
    let committed_at = c
        .date
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(c.timestamp);
    CommitRow {
        hash: c.hash.clone(),
        author: c.author.clone(),
        message: c.message.clone(),
        committed_at,
        insertions: c.insertions,
        deletions: c.deletions,
        files: c.files.clone(),
        category: Some(classify_commit(first_line(&c.message)).as_str().to_string()),
    }
}

async fn upsert_commit(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    c: &CommitRow,
    session_id: Option<&str>,
    project: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO commits (hash, session_id, author, message, committed_at, insertions, deletions, files_json, category, project)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(hash) DO UPDATE SET
            session_id = COALESCE(excluded.session_id, commits.session_id),
            author = COALESCE(excluded.author, commits.author),
            message = excluded.message,
            insertions = excluded.insertions,
            deletions = excluded.deletions,
            files_json = excluded.files_json,
            category = COALESCE(excluded.category, commits.category),
            project = COALESCE(excluded.project, commits.project)
        "#,
    )
    .bind(&c.hash)
    .bind(session_id)
    .bind(&c.author)
    .bind(&c.message)
    .bind(c.committed_at.timestamp())
    .bind(c.insertions as i64)
    .bind(c.deletions as i64)
    .bind(serde_json::to_string(&c.files)?)
    .bind(&c.category)
    .bind(project)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn session_text(summary: &SessionSummary) -> String {
    let mut lines = vec![summary.title.clone()];
    lines.extend(summary.achievements.iter().cloned());
    lines.extend(summary.activities.iter().map(|a| a.describe()));
    lines.join("\n")
}

fn session_doc(summary: &SessionSummary, project: Option<&str>) -> KnowledgeDoc {
    let mut tags: Vec<String> = summary.top_files.iter().map(|f| f.path.clone()).collect();
    tags.extend(project.map(str::to_string));
    let mut content = session_text(summary);
    for d in &summary.decisions {
        content.push_str(&format!("\ndecision: {}", d.decision));
        if let Some(r) = &d.rationale {
            content.push_str(&format!(" ({})", r));
        }
    }
    KnowledgeDoc {
        doc_id: format!("session:{}", summary.session_id),
        doc_type: "session".to_string(),
        title: summary.title.clone(),
        content,
        tags,
        session_id: Some(summary.session_id.clone()),
        updated_at: summary.end.timestamp(),
    }
}

fn commit_doc(c: &CommitRow, session_id: Option<&str>) -> KnowledgeDoc {
    let mut tags = c.files.clone();
    tags.extend(c.author.clone());
    tags.extend(c.category.clone());
    KnowledgeDoc {
        doc_id: format!("commit:{}", c.hash),
        doc_type: "commit".to_string(),
        title: first_line(&c.message).to_string(),
        content: format!("{}\n{}", c.message, c.files.join("\n")),
        tags,
        session_id: session_id.map(str::to_string),
        updated_at: c.committed_at.timestamp(),
    }
}

fn problem_docs(summary: &SessionSummary) -> Vec<KnowledgeDoc> {
    summary
        .problems
        .iter()
        .map(|p| {
            let solutions: Vec<&str> = summary
                .solutions
                .iter()
                .filter(|s| {
                    s.problem_id.as_deref() == Some(p.id.as_str())
                        || (s.problem_id.is_none()
                            && link_problem(
                                &summary.problems,
                                s.problem.as_deref().unwrap_or(&s.description),
                            )
                            .as_deref()
                                == Some(p.id.as_str()))
                })
                .map(|s| s.description.as_str())
                .collect();
            KnowledgeDoc {
                doc_id: format!("problem:{}:{}", summary.session_id, p.id),
                doc_type: "problem".to_string(),
                title: p.description.clone(),
                content: solutions.join("\n"),
                tags: if solutions.is_empty() {
                    vec!["unsolved".to_string()]
                } else {
                    vec!["solved".to_string()]
                },
                session_id: Some(summary.session_id.clone()),
                updated_at: p.timestamp.timestamp(),
            }
        })
        .collect()
}

fn project_doc(p: &ProjectRecord) -> KnowledgeDoc {
    KnowledgeDoc {
        doc_id: format!("project:{}", p.name),
        doc_type: "project".to_string(),
        title: p.name.clone(),
        content: format!(
            "{} commits, {} sessions, {} documents, {} commands",
            p.commits, p.sessions, p.documents, p.commands
        ),
        tags: p.keywords.iter().cloned().collect(),
        session_id: None,
        updated_at: p.last_seen.map(|t| t.timestamp()).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Commit, Problem, Solution, SummaryStatistics};
    use tempfile::TempDir;

    fn summary(id: &str, title: &str) -> SessionSummary {
        let now: DateTime<Utc> = "2026-10-01T10:00:00Z".parse().unwrap();
        SessionSummary {
            session_id: id.to_string(),
            title: title.to_string(),
            start: now,
            end: now + chrono::Duration::minutes(30),
            duration_seconds: 1800,
            statistics: SummaryStatistics::default(),
            top_files: Vec::new(),
            achievements: Vec::new(),
            activities: Vec::new(),
            file_changes: Vec::new(),
            commits: Vec::new(),
            decisions: Vec::new(),
            problems: vec![Problem {
                id: format!("{}-p1", id),
                description: "webhook returns 400".to_string(),
                context: None,
                timestamp: now,
            }],
            solutions: vec![Solution {
                id: format!("{}-s1", id),
                description: "verify signature with raw body".to_string(),
                problem_id: None,
                problem: Some("webhook".to_string()),
                timestamp: now,
            }],
        }
    }

    async fn open(dir: &TempDir, interval: u32) -> KnowledgeIndex {
        KnowledgeIndex::open(&IndexConfig {
            db_path: dir.path().join("index.sqlite"),
            fts_rebuild_interval: interval,
            search_limit: 20,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn unchanged_docs_do_not_count() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp, 100).await;
        let s = summary("s1", "checkout work");

        let first = index.index_session(&s, &[]).await.unwrap();
        assert_eq!(first.documents_changed, 2);
        let again = index.index_session(&s, &[]).await.unwrap();
        assert_eq!(again.documents_changed, 0);
        assert_eq!(index.pending_changes().await.unwrap(), 2);

        let linked: Option<String> =
            sqlx::query_scalar("SELECT problem_id FROM solutions WHERE id = 's1-s1'")
                .fetch_one(index.pool())
                .await
                .unwrap();
        assert_eq!(linked.as_deref(), Some("s1-p1"));
        index.close().await;
    }

    #[tokio::test]
    async fn rebuild_triggers_at_interval() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp, 3).await;

        let r1 = index.index_session(&summary("a", "first"), &[]).await.unwrap();
        assert!(!r1.full_text_rebuilt);
        let fts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_fts")
            .fetch_one(index.pool())
            .await
            .unwrap();
        assert_eq!(fts, 0);

        let r2 = index.index_session(&summary("b", "second"), &[]).await.unwrap();
        assert!(r2.full_text_rebuilt);
        let fts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_fts")
            .fetch_one(index.pool())
            .await
            .unwrap();
        assert_eq!(fts, 4);
        assert_eq!(index.pending_changes().await.unwrap(), 0);
        index.close().await;
    }

    #[tokio::test]
    async fn reused_ids_stay_per_session() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp, 100).await;
        let mut a = summary("a", "alpha");
        let mut b = summary("b", "beta");
        a.problems[0].id = "p1".into();
        a.solutions[0].id = "s1".into();
        b.problems[0].id = "p1".into();
        b.problems[0].description = "beta failure".into();
        b.solutions[0].id = "s1".into();
        b.solutions[0].problem = Some("beta".into());
        index.index_session(&a, &[]).await.unwrap();
        index.index_session(&b, &[]).await.unwrap();

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT session_id, description FROM problems ORDER BY session_id")
                .fetch_all(index.pool())
                .await
                .unwrap();
        assert_eq!(
            rows,
            vec![
                ("a".to_string(), "webhook returns 400".to_string()),
                ("b".to_string(), "beta failure".to_string()),
            ]
        );
        let links: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT session_id, problem_id FROM solutions ORDER BY session_id")
                .fetch_all(index.pool())
                .await
                .unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|(_, p)| p.as_deref() == Some("p1")));
        let docs: Vec<String> = sqlx::query_scalar(
            "SELECT doc_id FROM knowledge_docs WHERE doc_type = 'problem' ORDER BY doc_id",
        )
        .fetch_all(index.pool())
        .await
        .unwrap();
        assert_eq!(docs, vec!["problem:a:p1", "problem:b:p1"]);
        index.close().await;
    }

    #[tokio::test]
    async fn hashless_commits_are_not_indexed() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp, 100).await;
        let mut s = summary("s1", "commits");
        let at = s.start;
        let commit = |hash: &str, message: &str| Commit {
            hash: hash.to_string(),
            message: message.to_string(),
            author: None,
            date: None,
            files: Vec::new(),
            insertions: 0,
            deletions: 0,
            timestamp: at,
        };
        s.commits = vec![commit("", "wip one"), commit("", "wip two"), commit("abc123", "real")];

        let report = index.index_session(&s, &[]).await.unwrap();
        assert_eq!(report.commits, 1);
        let hashes: Vec<String> = sqlx::query_scalar("SELECT hash FROM commits")
            .fetch_all(index.pool())
            .await
            .unwrap();
        assert_eq!(hashes, vec!["abc123"]);
        index.close().await;
    }

    #[test]
    fn hash_covers_every_field() {
        let doc = KnowledgeDoc {
            doc_id: "x".into(),
            doc_type: "note".into(),
            title: "t".into(),
            content: "c".into(),
            tags: vec!["a".into()],
            session_id: None,
            updated_at: 0,
        };
        let mut other = doc.clone();
        other.tags.push("b".into());
        assert_ne!(doc.content_hash(), other.content_hash());
        assert_eq!(doc.content_hash().len(), 64);
    }
}
