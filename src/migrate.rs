use anyhow::Result;
use sqlx::SqlitePool;

const TABLES: [&str; 9] = [
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        end_time INTEGER NOT NULL,
        duration_seconds INTEGER NOT NULL,
        activity_count INTEGER NOT NULL DEFAULT 0,
        file_change_count INTEGER NOT NULL DEFAULT 0,
        commit_count INTEGER NOT NULL DEFAULT 0,
        decision_count INTEGER NOT NULL DEFAULT 0,
        problem_count INTEGER NOT NULL DEFAULT 0,
        solution_count INTEGER NOT NULL DEFAULT 0,
        lines_added INTEGER NOT NULL DEFAULT 0,
        lines_removed INTEGER NOT NULL DEFAULT 0,
        achievements_json TEXT NOT NULL DEFAULT '[]',
        project TEXT,
        indexed_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activities (
        session_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        kind TEXT NOT NULL,
        description TEXT NOT NULL,
        occurred_at INTEGER NOT NULL,
        PRIMARY KEY (session_id, seq)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS commits (
        hash TEXT PRIMARY KEY,
        session_id TEXT,
        author TEXT,
        message TEXT NOT NULL,
        committed_at INTEGER NOT NULL,
        insertions INTEGER NOT NULL DEFAULT 0,
        deletions INTEGER NOT NULL DEFAULT 0,
        files_json TEXT NOT NULL DEFAULT '[]',
        category TEXT,
        project TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_touches (
        session_id TEXT NOT NULL,
        path TEXT NOT NULL,
        changes INTEGER NOT NULL,
        PRIMARY KEY (session_id, path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS decisions (
        id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        decision TEXT NOT NULL,
        rationale TEXT,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (session_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS problems (
        id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (session_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS solutions (
        id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        problem_id TEXT,
        description TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (session_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS knowledge_docs (
        doc_id TEXT PRIMARY KEY,
        doc_type TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '',
        session_id TEXT,
        content_hash TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS index_state (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )
    "#,
];

const INDEXES: [&str; 6] = [
    "CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time DESC)",
    "CREATE INDEX IF NOT EXISTS idx_commits_author ON commits(author)",
    "CREATE INDEX IF NOT EXISTS idx_commits_session ON commits(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_file_touches_path ON file_touches(path)",
    "CREATE INDEX IF NOT EXISTS idx_solutions_problem ON solutions(session_id, problem_id)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_docs_type ON knowledge_docs(doc_type)",
];

/// Create every table and index. Safe to run on an existing database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for ddl in TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='knowledge_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE knowledge_fts USING fts5(
                doc_id UNINDEXED,
                title,
                tags,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}
