//! Type-scoped queries over the relational side of the knowledge index.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::search::like_pattern;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub session_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: i64,
    pub activities: i64,
    pub commits: i64,
    pub decisions: i64,
    pub problems: i64,
    pub solutions: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub achievements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRow {
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub author: Option<String>,
    pub message: String,
    pub committed_at: DateTime<Utc>,
    pub insertions: i64,
    pub deletions: i64,
    pub files: Vec<String>,
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRow {
    pub path: String,
    pub changes: i64,
    pub sessions: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionRow {
    pub id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRow {
    pub id: String,
    pub session_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub solutions: Vec<SolutionRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRow {
    pub id: String,
    pub session_id: String,
    pub decision: String,
    pub rationale: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDay {
    pub sessions: Vec<SessionRow>,
    pub commits: Vec<CommitRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedSession {
    pub session_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub shared_files: Vec<String>,
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn day_start(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc().timestamp())
        .unwrap_or(0)
}

fn session_row(row: &SqliteRow) -> SessionRow {
    let achievements: String = row.get("achievements_json");
    SessionRow {
        session_id: row.get("session_id"),
        title: row.get("title"),
        start: at(row.get("start_time")),
        end: at(row.get("end_time")),
        duration_seconds: row.get("duration_seconds"),
        activities: row.get("activity_count"),
        commits: row.get("commit_count"),
        decisions: row.get("decision_count"),
        problems: row.get("problem_count"),
        solutions: row.get("solution_count"),
        lines_added: row.get("lines_added"),
        lines_removed: row.get("lines_removed"),
        achievements: serde_json::from_str(&achievements).unwrap_or_default(),
        project: row.get("project"),
    }
}

fn commit_row(row: &SqliteRow) -> CommitRow {
    let files: String = row.get("files_json");
    CommitRow {
        hash: row.get("hash"),
        session_id: row.get("session_id"),
        author: row.get("author"),
        message: row.get("message"),
        committed_at: at(row.get("committed_at")),
        insertions: row.get("insertions"),
        deletions: row.get("deletions"),
        files: serde_json::from_str(&files).unwrap_or_default(),
        category: row.get("category"),
        project: row.get("project"),
    }
}

/// Sessions that started within `[since, until]`, newest first. Both
/// bounds are whole UTC days and optional.
pub async fn sessions_between(
    pool: &SqlitePool,
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
) -> Result<Vec<SessionRow>> {
    let lower = since.map(day_start).unwrap_or(i64::MIN);
    let upper = until
        .map(|d| day_start(d + Duration::days(1)))
        .unwrap_or(i64::MAX);
    let rows = sqlx::query(
        "SELECT * FROM sessions WHERE start_time >= ? AND start_time < ? ORDER BY start_time DESC",
    )
    .bind(lower)
    .bind(upper)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(session_row).collect())
}

/// Commits whose author contains `author` (case-insensitive), newest first.
pub async fn commits_by_author(pool: &SqlitePool, author: &str) -> Result<Vec<CommitRow>> {
    let rows = sqlx::query(
        "SELECT * FROM commits WHERE author LIKE ? ESCAPE '\\' ORDER BY committed_at DESC",
    )
    .bind(like_pattern(author))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(commit_row).collect())
}

pub async fn recent_commits(pool: &SqlitePool, limit: i64) -> Result<Vec<CommitRow>> {
    let rows = sqlx::query("SELECT * FROM commits ORDER BY committed_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(commit_row).collect())
}

/// Touched files whose path contains `name`, most changed first.
pub async fn files_by_name(pool: &SqlitePool, name: &str) -> Result<Vec<FileRow>> {
    let rows = sqlx::query(
        r#"
        SELECT path, SUM(changes) AS changes, COUNT(DISTINCT session_id) AS sessions
        FROM file_touches
        WHERE path LIKE ? ESCAPE '\'
        GROUP BY path
        ORDER BY changes DESC, path
        "#,
    )
    .bind(like_pattern(name))
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| FileRow {
            path: row.get("path"),
            changes: row.get("changes"),
            sessions: row.get("sessions"),
        })
        .collect())
}

/// Problems, each with its linked solutions. With `filter`, only problems
/// whose description or any solution contains it.
pub async fn problems_with_solutions(pool: &SqlitePool, filter: Option<&str>) -> Result<Vec<ProblemRow>> {
    let pattern = like_pattern(filter.unwrap_or(""));
    let problems = sqlx::query(
        r#"
        SELECT p.id, p.session_id, p.description, p.created_at FROM problems p
        WHERE p.description LIKE ? ESCAPE '\'
           OR EXISTS (SELECT 1 FROM solutions s WHERE s.session_id = p.session_id AND s.problem_id = p.id AND s.description LIKE ? ESCAPE '\')
        ORDER BY p.created_at DESC
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(problems.len());
    for row in &problems {
        let id: String = row.get("id");
        let session_id: String = row.get("session_id");
        let solutions = sqlx::query(
            "SELECT id, description, created_at FROM solutions WHERE session_id = ? AND problem_id = ? ORDER BY created_at",
        )
        .bind(&session_id)
        .bind(&id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|s| SolutionRow {
            id: s.get("id"),
            description: s.get("description"),
            created_at: at(s.get("created_at")),
        })
        .collect();
        out.push(ProblemRow {
            id,
            session_id,
            description: row.get("description"),
            created_at: at(row.get("created_at")),
            solutions,
        });
    }
    Ok(out)
}

pub async fn recent_decisions(pool: &SqlitePool, limit: i64) -> Result<Vec<DecisionRow>> {
    let rows = sqlx::query(
        "SELECT id, session_id, decision, rationale, created_at FROM decisions ORDER BY created_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| DecisionRow {
            id: row.get("id"),
            session_id: row.get("session_id"),
            decision: row.get("decision"),
            rationale: row.get("rationale"),
            created_at: at(row.get("created_at")),
        })
        .collect())
}

/// Sessions and commits grouped by UTC day, optionally limited to one
/// attributed project.
pub async fn project_timeline(
    pool: &SqlitePool,
    project: Option<&str>,
) -> Result<BTreeMap<NaiveDate, TimelineDay>> {
    let sessions = sqlx::query(
        "SELECT * FROM sessions WHERE ? IS NULL OR project = ? ORDER BY start_time",
    )
    .bind(project)
    .bind(project)
    .fetch_all(pool)
    .await?;
    let commits = sqlx::query(
        "SELECT * FROM commits WHERE ? IS NULL OR project = ? ORDER BY committed_at",
    )
    .bind(project)
    .bind(project)
    .fetch_all(pool)
    .await?;

    let mut days: BTreeMap<NaiveDate, TimelineDay> = BTreeMap::new();
    for session in sessions.iter().map(session_row) {
        days.entry(session.start.date_naive())
            .or_default()
            .sessions
            .push(session);
    }
    for commit in commits.iter().map(commit_row) {
        days.entry(commit.committed_at.date_naive())
            .or_default()
            .commits
            .push(commit);
    }
    Ok(days)
}

/// Other sessions that touched any file `session_id` touched, ordered by
/// how many files they share.
pub async fn related_sessions(pool: &SqlitePool, session_id: &str, limit: i64) -> Result<Vec<RelatedSession>> {
    let rows = sqlx::query(
        r#"
        SELECT o.session_id, s.title, s.start_time,
               group_concat(o.path, char(10)) AS shared, COUNT(*) AS n
        FROM file_touches t
        JOIN file_touches o ON o.path = t.path AND o.session_id != t.session_id
        JOIN sessions s ON s.session_id = o.session_id
        WHERE t.session_id = ?
        GROUP BY o.session_id
        ORDER BY n DESC, s.start_time DESC
        LIMIT ?
        "#,
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| {
            let shared: String = row.get("shared");
            let mut shared_files: Vec<String> = shared.lines().map(str::to_string).collect();
            shared_files.sort();
            RelatedSession {
                session_id: row.get("session_id"),
                title: row.get("title"),
                start: at(row.get("start_time")),
                shared_files,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::index::KnowledgeIndex;
    use crate::models::{
        Activity, FileAction, FileChange, Problem, SessionSummary, Solution, SummaryStatistics,
    };
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn change(path: &str, at: DateTime<Utc>) -> FileChange {
        FileChange {
            path: path.to_string(),
            action: FileAction::Change,
            content: None,
            diff: None,
            timestamp: at,
        }
    }

    fn summary(id: &str, day: &str, files: &[&str]) -> SessionSummary {
        let start: DateTime<Utc> = format!("{}T09:00:00Z", day).parse().unwrap();
        let file_changes: Vec<FileChange> = files.iter().map(|f| change(f, start)).collect();
        SessionSummary {
            session_id: id.to_string(),
            title: format!("work on {}", id),
            start,
            end: start + Duration::hours(1),
            duration_seconds: 3600,
            statistics: SummaryStatistics::default(),
            top_files: Vec::new(),
            achievements: Vec::new(),
            activities: file_changes.iter().cloned().map(Activity::FileChange).collect(),
            file_changes,
            commits: Vec::new(),
            decisions: Vec::new(),
            problems: Vec::new(),
            solutions: Vec::new(),
        }
    }

    async fn open(dir: &TempDir) -> KnowledgeIndex {
        KnowledgeIndex::open(&IndexConfig {
            db_path: dir.path().join("q.sqlite"),
            ..IndexConfig::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn date_range_is_inclusive() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp).await;
        for (id, day) in [("a", "2026-10-01"), ("b", "2026-10-03"), ("c", "2026-10-05")] {
            index.index_session(&summary(id, day, &[]), &[]).await.unwrap();
        }
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let rows = sessions_between(index.pool(), Some(d("2026-10-01")), Some(d("2026-10-03")))
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(sessions_between(index.pool(), None, None).await.unwrap().len(), 3);
        index.close().await;
    }

    #[tokio::test]
    async fn related_by_shared_files() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp).await;
        let sessions = [
            summary("a", "2026-10-01", &["src/cart.rs", "src/pay.rs"]),
            summary("b", "2026-10-02", &["src/cart.rs", "src/pay.rs", "README.md"]),
            summary("c", "2026-10-03", &["src/pay.rs"]),
            summary("d", "2026-10-04", &["docs/x.md"]),
        ];
        for s in &sessions {
            index.index_session(s, &[]).await.unwrap();
        }
        let related = related_sessions(index.pool(), "a", 10).await.unwrap();
        let ids: Vec<&str> = related.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(related[0].shared_files, vec!["src/cart.rs", "src/pay.rs"]);

        let files = files_by_name(index.pool(), "pay").await.unwrap();
        assert_eq!(
            files,
            vec![FileRow {
                path: "src/pay.rs".into(),
                changes: 3,
                sessions: 3
            }]
        );
        index.close().await;
    }

    #[tokio::test]
    async fn problems_carry_solutions() {
        let tmp = TempDir::new().unwrap();
        let index = open(&tmp).await;
        let mut s = summary("a", "2026-10-01", &[]);
        let now = s.start;
        s.problems = vec![
            Problem {
                id: "p1".into(),
                description: "flaky checkout test".into(),
                context: None,
                timestamp: now,
            },
            Problem {
                id: "p2".into(),
                description: "slow build".into(),
                context: None,
                timestamp: now,
            },
        ];
        s.solutions = vec![Solution {
            id: "s1".into(),
            description: "pin the clock".into(),
            problem_id: Some("p1".into()),
            problem: None,
            timestamp: now,
        }];
        index.index_session(&s, &[]).await.unwrap();

        let all = problems_with_solutions(index.pool(), None).await.unwrap();
        assert_eq!(all.len(), 2);
        let by_solution = problems_with_solutions(index.pool(), Some("clock")).await.unwrap();
        assert_eq!(by_solution.len(), 1);
        assert_eq!(by_solution[0].id, "p1");
        assert_eq!(by_solution[0].solutions[0].description, "pin the clock");
        index.close().await;
    }
}
