use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::index::KnowledgeIndex;
use crate::models::first_line;

/// Which strategy produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrigin {
    FullText,
    Exact,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub origin: SearchOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    pub full_text_hits: usize,
    pub exact_hits: usize,
    pub results: Vec<SearchHit>,
}

impl SearchResults {
    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            full_text_hits: 0,
            exact_hits: 0,
            results: Vec::new(),
        }
    }
}

/// Run ranked full-text and exact substring search concurrently and merge
/// them, full-text first. Each strategy is capped at the index's search
/// limit; a document found by both keeps its full-text hit.
pub async fn search(index: &KnowledgeIndex, query: &str) -> Result<SearchResults> {
    let query = query.trim();
    let Some(fts) = fts_query(query) else {
        return Ok(SearchResults::empty(query));
    };
    let limit = index.search_limit();
    let (full_text, exact) = tokio::join!(
        fetch_full_text(index.pool(), &fts, limit),
        fetch_exact(index.pool(), query, limit),
    );
    let full_text = full_text?;
    let exact = exact?;

    let mut results = SearchResults {
        query: query.to_string(),
        full_text_hits: full_text.len(),
        exact_hits: exact.len(),
        results: Vec::with_capacity(full_text.len() + exact.len()),
    };
    let mut seen = HashSet::new();
    for hit in full_text.into_iter().chain(exact) {
        if seen.insert(hit.id.clone()) {
            results.results.push(hit);
        }
    }
    Ok(results)
}

/// Quote every term so user input never reaches FTS5 as query syntax.
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// `%query%` with LIKE wildcards escaped by `\`.
pub fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ============ Full-text search ============

async fn fetch_full_text(pool: &SqlitePool, fts: &str, limit: i64) -> Result<Vec<SearchHit>> {
    let rows = sqlx::query(
        r#"
        SELECT d.doc_id, d.doc_type, d.title, d.session_id,
               bm25(knowledge_fts, 0.0, 10.0, 5.0, 1.0) AS rank,
               snippet(knowledge_fts, 3, '>>>', '<<<', '...', 24) AS snippet
        FROM knowledge_fts
        JOIN knowledge_docs d ON d.doc_id = knowledge_fts.doc_id
        WHERE knowledge_fts MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(fts)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            SearchHit {
                id: row.get("doc_id"),
                kind: row.get("doc_type"),
                title: row.get("title"),
                snippet: row.get("snippet"),
                score: -rank, // bm25 is lower-is-better
                origin: SearchOrigin::FullText,
                session_id: row.get("session_id"),
            }
        })
        .collect())
}

// ============ Exact search ============

async fn fetch_exact(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<SearchHit>> {
    let pattern = like_pattern(query);
    let mut hits = Vec::new();

    let sessions = sqlx::query(
        r#"
        SELECT session_id, title, achievements_json FROM sessions
        WHERE title LIKE ? ESCAPE '\' OR achievements_json LIKE ? ESCAPE '\'
        ORDER BY start_time DESC
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    for row in &sessions {
        let id: String = row.get("session_id");
        hits.push(SearchHit {
            id: format!("session:{}", id),
            kind: "session".to_string(),
            title: row.get("title"),
            snippet: row.get("achievements_json"),
            score: 1.0,
            origin: SearchOrigin::Exact,
            session_id: Some(id),
        });
    }

    let commits = sqlx::query(
        r#"
        SELECT hash, message, author, session_id FROM commits
        WHERE message LIKE ? ESCAPE '\' OR author LIKE ? ESCAPE '\' OR hash LIKE ? ESCAPE '\'
        ORDER BY committed_at DESC
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    for row in &commits {
        let hash: String = row.get("hash");
        let message: String = row.get("message");
        let author: Option<String> = row.get("author");
        hits.push(SearchHit {
            id: format!("commit:{}", hash),
            kind: "commit".to_string(),
            title: first_line(&message).to_string(),
            snippet: author.unwrap_or_default(),
            score: 1.0,
            origin: SearchOrigin::Exact,
            session_id: row.get("session_id"),
        });
    }

    let files = sqlx::query(
        r#"
        SELECT path, SUM(changes) AS changes, COUNT(*) AS sessions FROM file_touches
        WHERE path LIKE ? ESCAPE '\'
        GROUP BY path
        ORDER BY changes DESC, path
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    for row in &files {
        let path: String = row.get("path");
        let changes: i64 = row.get("changes");
        let sessions: i64 = row.get("sessions");
        hits.push(SearchHit {
            id: format!("file:{}", path),
            kind: "file".to_string(),
            title: path,
            snippet: format!("{} changes across {} sessions", changes, sessions),
            score: changes as f64,
            origin: SearchOrigin::Exact,
            session_id: None,
        });
    }

    let problems = sqlx::query(
        r#"
        SELECT p.id, p.description, p.session_id,
               (SELECT group_concat(s.description, ' | ') FROM solutions s WHERE s.session_id = p.session_id AND s.problem_id = p.id) AS solutions
        FROM problems p
        WHERE p.description LIKE ? ESCAPE '\'
           OR EXISTS (SELECT 1 FROM solutions s WHERE s.session_id = p.session_id AND s.problem_id = p.id AND s.description LIKE ? ESCAPE '\')
        ORDER BY p.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    for row in &problems {
        let id: String = row.get("id");
        let session_id: String = row.get("session_id");
        let solutions: Option<String> = row.get("solutions");
        hits.push(SearchHit {
            id: format!("problem:{}:{}", session_id, id),
            kind: "problem".to_string(),
            title: row.get("description"),
            snippet: solutions.unwrap_or_default(),
            score: 1.0,
            origin: SearchOrigin::Exact,
            session_id: row.get("session_id"),
        });
    }

    Ok(hits)
}
