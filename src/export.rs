//! Export the knowledge index as a JSON dump or a Markdown digest.
//!
//! Output goes to `-o PATH` when given, otherwise to stdout for piping.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt::Write as _;
use std::path::Path;

use crate::index::KnowledgeIndex;
use crate::models::first_line;
use crate::query::{self, CommitRow, DecisionRow, FileRow, ProblemRow, SessionRow};

const RECENT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub exported_at: chrono::DateTime<Utc>,
    pub sessions: Vec<SessionRow>,
    pub commits: Vec<CommitRow>,
    pub files: Vec<FileRow>,
    pub decisions: Vec<DecisionRow>,
    pub problems: Vec<ProblemRow>,
    pub documents: i64,
}

pub async fn collect(pool: &SqlitePool) -> Result<ExportData> {
    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_docs")
        .fetch_one(pool)
        .await?;
    Ok(ExportData {
        exported_at: Utc::now(),
        sessions: query::sessions_between(pool, None, None).await?,
        commits: query::recent_commits(pool, i64::MAX).await?,
        files: query::files_by_name(pool, "").await?,
        decisions: query::recent_decisions(pool, i64::MAX).await?,
        problems: query::problems_with_solutions(pool, None).await?,
        documents,
    })
}

pub fn render_markdown(data: &ExportData) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Development Trail\n");
    let _ = writeln!(out, "_Exported {}_\n", data.exported_at.format("%Y-%m-%d %H:%M UTC"));

    let _ = writeln!(out, "## Totals\n");
    let _ = writeln!(out, "| Item | Count |\n|---|---|");
    let _ = writeln!(out, "| Sessions | {} |", data.sessions.len());
    let _ = writeln!(out, "| Commits | {} |", data.commits.len());
    let _ = writeln!(out, "| Files touched | {} |", data.files.len());
    let _ = writeln!(out, "| Decisions | {} |", data.decisions.len());
    let solved = data.problems.iter().filter(|p| !p.solutions.is_empty()).count();
    let _ = writeln!(out, "| Problems (solved) | {} ({}) |", data.problems.len(), solved);
    let _ = writeln!(out, "| Search documents | {} |\n", data.documents);

    let _ = writeln!(out, "## Recent sessions\n");
    if data.sessions.is_empty() {
        let _ = writeln!(out, "_None._");
    }
    for s in data.sessions.iter().take(RECENT as usize) {
        let _ = writeln!(
            out,
            "- **{}** ({}, {} min): {} activities, +{}/-{} lines",
            s.title,
            s.start.format("%Y-%m-%d"),
            s.duration_seconds / 60,
            s.activities,
            s.lines_added,
            s.lines_removed
        );
        for a in &s.achievements {
            let _ = writeln!(out, "  - {}", a);
        }
    }

    let _ = writeln!(out, "\n## Recent decisions\n");
    if data.decisions.is_empty() {
        let _ = writeln!(out, "_None._");
    }
    for d in data.decisions.iter().take(RECENT as usize) {
        match &d.rationale {
            Some(r) => {
                let _ = writeln!(out, "- {}: {}", d.decision, r);
            }
            None => {
                let _ = writeln!(out, "- {}", d.decision);
            }
        }
    }

    let _ = writeln!(out, "\n## Recent commits\n");
    if data.commits.is_empty() {
        let _ = writeln!(out, "_None._");
    }
    for c in data.commits.iter().take(RECENT as usize) {
        let short: String = c.hash.chars().take(8).collect();
        let _ = writeln!(out, "- `{}` {}", short, first_line(&c.message));
    }

    let _ = writeln!(out, "\n## Most touched files\n");
    for f in data.files.iter().take(RECENT as usize) {
        let _ = writeln!(out, "- {} ({} changes, {} sessions)", f.path, f.changes, f.sessions);
    }
    out
}

pub async fn run_export(index: &KnowledgeIndex, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let data = collect(index.pool()).await?;
    let text = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&data)?,
        ExportFormat::Markdown => render_markdown(&data),
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            tracing::info!(
                sessions = data.sessions.len(),
                commits = data.commits.len(),
                path = %path.display(),
                "export written"
            );
        }
        None => {
            println!("{}", text);
        }
    }
    Ok(())
}
