use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use devtrail::config::{load_config, Config};
use devtrail::index::KnowledgeIndex;
use devtrail::integrity::{IntegrityVerifier, RecoveryStatus};
use devtrail::recorder::{ActivityRecorder, PersistOutcome};
use devtrail::search::{search, SearchOrigin};

fn trail_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_trail"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[capture]
session_dir = "{root}/sessions"

[integrity]
circuit_breaker_threshold = 5

[history]
repo = "{root}"
days = 30

[[history.projects]]
name = "checkout"
keywords = ["payment", "stripe"]

[index]
db_path = "{root}/data/trail.sqlite"
fts_rebuild_interval = 100
"#,
        root = root.display()
    );

    let config_path = config_dir.join("trail.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_trail(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = trail_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run trail binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn json_out(stdout: &str) -> Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, stdout))
}

/// A finalized "payment flow" session with one commit, one problem, and
/// its solution.
fn payment_session(config: &Config) -> devtrail::models::SessionSummary {
    let mut recorder =
        ActivityRecorder::with_session_id(config, "s1".to_string(), Some("payment flow".to_string()));
    recorder.record_file_change(&json!({"path": "src/checkout.rs", "action": "change"}));
    recorder.record_commit(&json!({
        "hash": "0123456789abcdef0123456789abcdef01234567",
        "message": "Fix payment bug",
        "author": "ada",
        "files": ["src/checkout.rs"],
        "insertions": 4,
        "deletions": 1
    }));
    recorder.record_problem(&json!({"description": "card declined twice"}));
    recorder.record_solution(&json!({
        "description": "dedupe the submit handler",
        "problem": "card declined"
    }));
    recorder.finalize()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_trail(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let out = json_out(&stdout);
    assert!(out["database"].as_str().unwrap().ends_with("trail.sqlite"));
    assert!(tmp.path().join("data/trail.sqlite").exists());
    assert!(tmp.path().join("sessions").is_dir());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (_, _, first) = run_trail(&config, &["init"]);
    let (_, stderr, second) = run_trail(&config, &["init"]);
    assert!(first && second, "second init failed: {}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, config) = setup_test_env();
    fs::write(&config, "[capture\nsession_dir = ").unwrap();
    let (_, _, success) = run_trail(&config, &["init"]);
    assert!(!success);
    drop(tmp);
}

#[test]
fn test_record_then_analyze() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    ActivityRecorder::with_session_id(&config, "s1".to_string(), Some("cli".to_string()));

    let (stdout, stderr, success) = run_trail(
        &config_path,
        &[
            "record",
            "s1",
            "decision",
            "--json",
            r#"{"decision": "use sqlite", "rationale": "single file"}"#,
        ],
    );
    assert!(success, "record failed: {}", stderr);
    let out = json_out(&stdout);
    assert_eq!(out["persisted"], "full");
    assert_eq!(out["activities"], 1);

    let (stdout, _, success) = run_trail(&config_path, &["integrity", "validate", "s1"]);
    assert!(success);
    assert_eq!(json_out(&stdout)["isValid"], true);

    let (stdout, _, success) = run_trail(&config_path, &["integrity", "analyze", "s1"]);
    assert!(success);
    let out = json_out(&stdout);
    assert_eq!(out["sessionId"], "s1");
    assert!(out["score"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_record_missing_session_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, _, success) = run_trail(&config, &["record", "nope", "command", "--json", "{}"]);
    assert!(!success);
}

#[test]
fn test_batch_reports_corruption_without_failing() {
    let (tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    payment_session(&config);
    let sessions = tmp.path().join("sessions");
    fs::write(sessions.join("broken.json"), "{\"sessionId\": \"broken\", \"acti").unwrap();

    let (stdout, stderr, success) = run_trail(&config_path, &["integrity", "batch"]);
    assert!(success, "batch failed: {}", stderr);
    let out = json_out(&stdout);
    assert_eq!(out["totalSessions"], 2);
    assert_eq!(out["corrupted"], 1);

    let (stdout, _, success) = run_trail(&config_path, &["integrity", "report"]);
    assert!(success);
    let report = json_out(&stdout);
    assert_eq!(report["totalSessions"], 2);
    assert!(!report["commonIssues"].as_array().unwrap().is_empty());
}

#[test]
fn test_batch_missing_dir_fails() {
    let (tmp, config) = setup_test_env();
    let missing = tmp.path().join("nowhere");
    let (_, _, success) = run_trail(&config, &["integrity", "batch", missing.to_str().unwrap()]);
    assert!(!success);
}

#[test]
fn test_ingest_then_search_and_query() {
    let (tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    payment_session(&config);
    let summary = tmp.path().join("sessions/summaries/s1.json");
    assert!(summary.exists());

    let (stdout, stderr, success) =
        run_trail(&config_path, &["index", "ingest", summary.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    assert_eq!(json_out(&stdout)["commits"], 1);

    let (stdout, _, success) = run_trail(&config_path, &["search", "payment"]);
    assert!(success);
    let results = json_out(&stdout);
    let ids: Vec<&str> = results["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"session:s1"), "{:?}", ids);
    assert!(ids.iter().any(|id| id.starts_with("commit:")), "{:?}", ids);

    let (stdout, _, success) = run_trail(&config_path, &["query", "commits", "--author", "ada"]);
    assert!(success);
    assert_eq!(json_out(&stdout).as_array().unwrap().len(), 1);

    let (stdout, _, success) = run_trail(&config_path, &["query", "problems", "declined"]);
    assert!(success);
    let problems = json_out(&stdout);
    assert_eq!(problems[0]["solutions"][0]["description"], "dedupe the submit handler");

    let (stdout, _, success) = run_trail(&config_path, &["query", "timeline", "--project", "checkout"]);
    assert!(success);
    assert_eq!(json_out(&stdout).as_object().unwrap().len(), 1);

    let (stdout, _, success) = run_trail(&config_path, &["export", "markdown"]);
    assert!(success);
    assert!(stdout.contains("payment flow"));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_trail(&config, &["search", "   "]);
    assert!(success);
    assert!(json_out(&stdout)["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn payment_is_found_by_both_strategies() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let summary = payment_session(&config);
    let index = KnowledgeIndex::open(&config.index).await.unwrap();
    index.index_session(&summary, &config.history.projects).await.unwrap();

    // Before a rebuild only the exact strategy can see the new rows.
    let exact = search(&index, "payment").await.unwrap();
    assert_eq!(exact.full_text_hits, 0);
    assert!(exact.results.iter().all(|h| h.origin == SearchOrigin::Exact));
    assert!(exact.results.iter().any(|h| h.id == "session:s1"));
    assert!(exact.results.iter().any(|h| h.kind == "commit"));

    index.rebuild_full_text().await.unwrap();
    let ranked = search(&index, "payment").await.unwrap();
    let session = ranked.results.iter().find(|h| h.id == "session:s1").unwrap();
    let commit = ranked.results.iter().find(|h| h.kind == "commit").unwrap();
    assert_eq!(session.origin, SearchOrigin::FullText);
    assert_eq!(commit.origin, SearchOrigin::FullText);
    assert_eq!(commit.title, "Fix payment bug");
    index.close().await;
}

#[test]
fn large_diff_is_truncated_and_persisted() {
    let (tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let mut recorder = ActivityRecorder::with_session_id(&config, "big".to_string(), None);
    let diff = "x".repeat(50_000);
    let outcome = recorder.record_file_change(&json!({"path": "huge.txt", "diff": diff}));
    assert_eq!(outcome, PersistOutcome::Full);

    let path = tmp.path().join("sessions/big.json");
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.len() < 20_000, "session file is {} bytes", text.len());
    let doc: Value = serde_json::from_str(&text).unwrap();
    let stored = &doc["fileChanges"][0]["diff"];
    assert_eq!(stored["truncated"], true);
    assert_eq!(stored["originalLength"], 50_000);
    assert_eq!(stored["originalSize"], 50_000);
    assert!(stored["preview"].as_str().unwrap().chars().count() <= 1000);

    let verifier = IntegrityVerifier::from_config(&config);
    assert!(verifier.validate_session_integrity("big").is_valid);
}

#[test]
fn corrupted_primary_recovers_from_backup() {
    let (tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let sessions = tmp.path().join("sessions");
    fs::create_dir_all(&sessions).unwrap();
    fs::write(sessions.join("s2.json"), "{\"sessionId\": \"s2\", \"start\": \"2026-").unwrap();
    fs::write(
        sessions.join("s2.backup.json"),
        r#"{"sessionId": "s2", "start": "2026-10-01T10:00:00Z",
            "activities": [{"type": "command", "command": "cargo test", "timestamp": "2026-10-01T10:05:00Z"}],
            "backup": true}"#,
    )
    .unwrap();

    let verifier = IntegrityVerifier::from_config(&config);
    let report = verifier.attempt_session_recovery("s2");
    assert_eq!(report.status, RecoveryStatus::RecoveredFromBackup);
    assert!(report.recoverable);

    let recovered: Value =
        serde_json::from_str(&fs::read_to_string(sessions.join("recovered/s2.json")).unwrap()).unwrap();
    assert_eq!(recovered["sessionId"], "s2");
    assert_eq!(recovered["commands"].as_array().unwrap().len(), 1);
    assert_eq!(recovered["metadata"]["recoveredFrom"], "backup");
}

#[test]
fn deleted_primary_recovers_from_backup() {
    let (tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let mut recorder = ActivityRecorder::with_session_id(&config, "s3".to_string(), None);
    recorder.record_command(&json!({"command": "cargo build"}));
    let sessions = tmp.path().join("sessions");
    fs::write(
        sessions.join("s3.backup.json"),
        r#"{"sessionId": "s3", "start": "2026-10-01T10:00:00Z", "activities": []}"#,
    )
    .unwrap();
    fs::remove_file(sessions.join("s3.json")).unwrap();

    let report = IntegrityVerifier::from_config(&config).attempt_session_recovery("s3");
    assert!(report.recoverable);
    assert_eq!(report.status, RecoveryStatus::RecoveredFromBackup);
}
