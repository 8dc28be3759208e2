//! # Development Trail CLI (`trail`)
//!
//! The `trail` binary captures development sessions, audits stored session
//! files, mines git and project history, and searches the knowledge index.
//!
//! ## Usage
//!
//! ```bash
//! trail --config ./config/trail.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trail init` | Create the session directory and the knowledge index |
//! | `trail capture` | Record file and git activity until Ctrl-C |
//! | `trail record <id> <kind> --json '{..}'` | Append one event to a session |
//! | `trail integrity <action>` | Validate, score, recover, or batch-audit sessions |
//! | `trail history <action>` | Mine git history and recover cross-source history |
//! | `trail index <action>` | Ingest a session summary or rebuild full-text search |
//! | `trail search "<query>"` | Full-text plus exact search |
//! | `trail query <kind>` | Type-scoped queries |
//! | `trail export json\|markdown` | Dump the index |
//!
//! Reports are JSON on stdout; logs go to stderr (`RUST_LOG`, default `info`).

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use devtrail::capture::{self, CaptureOptions};
use devtrail::config::{self, Config};
use devtrail::export::{self, ExportFormat};
use devtrail::history::{self, GitWatcher};
use devtrail::index::KnowledgeIndex;
use devtrail::integrity::IntegrityVerifier;
use devtrail::query;
use devtrail::recorder::{ActivityRecorder, EventKind};
use devtrail::search;

/// Development Trail: resilient session capture, integrity auditing, and
/// knowledge search.
#[derive(Parser)]
#[command(name = "trail", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/trail.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/trail.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the session directory and the knowledge index schema.
    ///
    /// Idempotent.
    Init,

    /// Capture file and git activity into a new session until Ctrl-C.
    Capture {
        /// Session title.
        #[arg(long)]
        title: Option<String>,
        /// Directory to watch for file changes.
        #[arg(long, default_value = ".")]
        watch: PathBuf,
        /// Git repository to poll for commits (defaults to `[history] repo`).
        #[arg(long)]
        repo: Option<PathBuf>,
        /// Index the finalized summary.
        #[arg(long)]
        index: bool,
    },

    /// Append one event to an existing session.
    Record {
        session_id: String,
        #[arg(value_enum)]
        kind: EventKind,
        /// The event as a JSON object.
        #[arg(long)]
        json: String,
    },

    /// Session file validation, quality scoring, and recovery.
    Integrity {
        #[command(subcommand)]
        action: IntegrityAction,
    },

    /// Git mining and cross-source history recovery.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Knowledge index maintenance.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Search the knowledge index.
    Search {
        query: String,
    },

    /// Type-scoped queries over indexed sessions.
    Query {
        #[command(subcommand)]
        kind: QueryKind,
    },

    /// Export the knowledge index.
    Export {
        #[arg(value_enum)]
        format: ExportFormat,
        /// Output path. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IntegrityAction {
    /// Quality score for one session.
    Analyze { session_id: String },
    /// Structural validation of one session file.
    Validate { session_id: String },
    /// Recover one session into `recovered/<id>.json`.
    Recover { session_id: String },
    /// Analyze every session in a directory.
    Batch { dir: Option<PathBuf> },
    /// Batch analysis folded into grade distribution and common issues.
    Report { dir: Option<PathBuf> },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Mine commits from a git repository.
    Mine {
        #[arg(long)]
        repo: Option<PathBuf>,
        #[arg(long)]
        days: Option<u32>,
    },
    /// Merge git, session logs, documents, and shell history.
    Recover {
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Print new commits as JSON lines until Ctrl-C.
    Watch {
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Store mined commits and project documents in the index.
    Backfill {
        #[arg(long)]
        repo: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Index a finalized session summary file.
    Ingest { summary: PathBuf },
    /// Rebuild the full-text table from all documents.
    Rebuild,
}

#[derive(Subcommand)]
enum QueryKind {
    /// Sessions started within a date range (YYYY-MM-DD, inclusive).
    Sessions {
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Commits by author.
    Commits {
        #[arg(long)]
        author: String,
    },
    /// Touched files matching a name.
    Files { name: String },
    /// Problems and their solutions.
    Problems { filter: Option<String> },
    /// Sessions and commits by day.
    Timeline {
        #[arg(long)]
        project: Option<String>,
    },
    /// Sessions that touched the same files.
    Related { session_id: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn batch_dir(cfg: &Config, dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = dir.unwrap_or_else(|| cfg.capture.session_dir.clone());
    if !dir.is_dir() {
        bail!("Not a readable session directory: {}", dir.display());
    }
    Ok(dir)
}

fn repo_or_default(cfg: &Config, repo: Option<PathBuf>) -> PathBuf {
    repo.unwrap_or_else(|| cfg.history.repo.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            std::fs::create_dir_all(&cfg.capture.session_dir).with_context(|| {
                format!(
                    "Failed to create session directory: {}",
                    cfg.capture.session_dir.display()
                )
            })?;
            let index = KnowledgeIndex::open(&cfg.index).await?;
            index.close().await;
            print_json(&json!({
                "sessionDir": cfg.capture.session_dir,
                "database": cfg.index.db_path,
            }))?;
        }
        Commands::Capture {
            title,
            watch,
            repo,
            index,
        } => {
            let summary = capture::run_capture(
                &cfg,
                CaptureOptions {
                    title,
                    watch_dir: watch,
                    repo,
                    index,
                },
            )
            .await?;
            print_json(&summary)?;
        }
        Commands::Record {
            session_id,
            kind,
            json,
        } => {
            let event: Value =
                serde_json::from_str(&json).context("--json is not a valid JSON value")?;
            let mut recorder = ActivityRecorder::resume(&cfg, &session_id)?;
            let outcome = recorder.record(kind, &event);
            print_json(&json!({
                "sessionId": session_id,
                "persisted": format!("{:?}", outcome).to_lowercase(),
                "activities": recorder.session().activities.len(),
            }))?;
        }
        Commands::Integrity { action } => run_integrity(&cfg, action)?,
        Commands::History { action } => run_history(&cfg, action).await?,
        Commands::Index { action } => {
            let index = KnowledgeIndex::open(&cfg.index).await?;
            match action {
                IndexAction::Ingest { summary } => {
                    let report = index
                        .ingest_summary_file(&summary, &cfg.history.projects)
                        .await?;
                    print_json(&report)?;
                }
                IndexAction::Rebuild => {
                    let documents = index.rebuild_full_text().await?;
                    print_json(&json!({ "documents": documents }))?;
                }
            }
            index.close().await;
        }
        Commands::Search { query } => {
            let index = KnowledgeIndex::open(&cfg.index).await?;
            let results = search::search(&index, &query).await?;
            print_json(&results)?;
            index.close().await;
        }
        Commands::Query { kind } => {
            let index = KnowledgeIndex::open(&cfg.index).await?;
            run_query(&index, kind).await?;
            index.close().await;
        }
        Commands::Export { format, output } => {
            let index = KnowledgeIndex::open(&cfg.index).await?;
            export::run_export(&index, format, output.as_deref()).await?;
            index.close().await;
        }
    }

    Ok(())
}

fn run_integrity(cfg: &Config, action: IntegrityAction) -> Result<()> {
    let mut verifier = IntegrityVerifier::from_config(cfg);
    match action {
        IntegrityAction::Analyze { session_id } => {
            print_json(&verifier.analyze_session(&session_id))
        }
        IntegrityAction::Validate { session_id } => {
            print_json(&verifier.validate_session_integrity(&session_id))
        }
        IntegrityAction::Recover { session_id } => {
            print_json(&verifier.attempt_session_recovery(&session_id))
        }
        IntegrityAction::Batch { dir } => {
            let dir = batch_dir(cfg, dir)?;
            print_json(&verifier.process_session_batch(&dir))
        }
        IntegrityAction::Report { dir } => {
            let dir = batch_dir(cfg, dir)?;
            let batch = verifier.process_session_batch(&dir);
            print_json(&verifier.generate_quality_report(&batch.assessments))
        }
    }
}

async fn run_history(cfg: &Config, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::Mine { repo, days } => {
            let repo = repo_or_default(cfg, repo);
            let git = history::mine_git_history(&repo, days.unwrap_or(cfg.history.days))?;
            print_json(&git)
        }
        HistoryAction::Recover { repo } => {
            let repo = repo_or_default(cfg, repo);
            print_json(&history::recover_history(cfg, &repo))
        }
        HistoryAction::Watch { repo } => {
            let repo = repo_or_default(cfg, repo);
            watch_commits(&repo, cfg).await
        }
        HistoryAction::Backfill { repo } => {
            let repo = repo_or_default(cfg, repo);
            let recovered = history::recover_history(cfg, &repo);
            let index = KnowledgeIndex::open(&cfg.index).await?;
            let commits = match &recovered.git {
                Some(git) => index.index_commits(&git.commits, &cfg.history.projects).await?,
                None => Default::default(),
            };
            let notes = index
                .index_notes(&recovered.unified.projects, &recovered.documents)
                .await?;
            index.close().await;
            print_json(&json!({
                "commits": commits,
                "notes": notes,
                "sources": recovered.unified.sources,
            }))
        }
    }
}

async fn watch_commits(repo: &Path, cfg: &Config) -> Result<()> {
    if !history::git_log::is_git_repo(repo) {
        bail!("Not a git repository: {}", repo.display());
    }
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let task = tokio::spawn(GitWatcher::new(repo, cfg.history.poll_interval()).run(tx));
    loop {
        tokio::select! {
            Some(commit) = rx.recv() => {
                println!("{}", serde_json::to_string(&commit.to_event())?);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    task.abort();
    Ok(())
}

async fn run_query(index: &KnowledgeIndex, kind: QueryKind) -> Result<()> {
    let pool = index.pool();
    match kind {
        QueryKind::Sessions { since, until } => {
            print_json(&query::sessions_between(pool, since, until).await?)
        }
        QueryKind::Commits { author } => {
            print_json(&query::commits_by_author(pool, &author).await?)
        }
        QueryKind::Files { name } => print_json(&query::files_by_name(pool, &name).await?),
        QueryKind::Problems { filter } => {
            print_json(&query::problems_with_solutions(pool, filter.as_deref()).await?)
        }
        QueryKind::Timeline { project } => {
            print_json(&query::project_timeline(pool, project.as_deref()).await?)
        }
        QueryKind::Related { session_id } => print_json(
            &query::related_sessions(pool, &session_id, index.search_limit()).await?,
        ),
    }
}
