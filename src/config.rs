use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub serializer: SerializerConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
    /// String fields longer than this (in characters) are replaced by a
    /// truncation descriptor.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_max_activities")]
    pub max_activities: usize,
    #[serde(default = "default_backup_activities")]
    pub backup_activities: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
            max_content_length: default_max_content_length(),
            max_activities: default_max_activities(),
            backup_activities: default_backup_activities(),
        }
    }
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("./sessions")
}
fn default_max_content_length() -> usize {
    10 * 1024
}
fn default_max_activities() -> usize {
    1000
}
fn default_backup_activities() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SerializerConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_array_items")]
    pub max_array_items: usize,
    /// Upper bound on the estimated encoded size before the full encode is
    /// replaced by an oversized-data summary.
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_breaker_timeout_ms")]
    pub circuit_breaker_timeout_ms: u64,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_array_items: default_max_array_items(),
            max_string_length: default_max_string_length(),
            max_content_length: default_max_content_length(),
            circuit_breaker_threshold: default_breaker_threshold(),
            circuit_breaker_timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

impl SerializerConfig {
    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_timeout_ms)
    }
}

fn default_max_depth() -> usize {
    10
}
fn default_max_array_items() -> usize {
    1000
}
fn default_max_string_length() -> usize {
    100 * 1024 * 1024
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntegrityConfig {
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_breaker_timeout_ms")]
    pub circuit_breaker_timeout_ms: u64,
    /// How many activities the consistency check inspects per session.
    #[serde(default = "default_consistency_sample")]
    pub consistency_sample: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: default_breaker_threshold(),
            circuit_breaker_timeout_ms: default_breaker_timeout_ms(),
            consistency_sample: default_consistency_sample(),
        }
    }
}

impl IntegrityConfig {
    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_timeout_ms)
    }
}

fn default_consistency_sample() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_repo")]
    pub repo: PathBuf,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub doc_roots: Vec<PathBuf>,
    #[serde(default = "default_doc_globs")]
    pub doc_globs: Vec<String>,
    #[serde(default)]
    pub shell_history: Vec<PathBuf>,
    #[serde(default)]
    pub projects: Vec<ProjectRule>,
    #[serde(default = "default_technologies")]
    pub technologies: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            repo: default_repo(),
            days: default_days(),
            poll_interval_secs: default_poll_interval_secs(),
            doc_roots: Vec::new(),
            doc_globs: default_doc_globs(),
            shell_history: Vec::new(),
            projects: Vec::new(),
            technologies: default_technologies(),
        }
    }
}

impl HistoryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Keyword rule used by the project-attribution heuristic.
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectRule {
    pub name: String,
    pub keywords: Vec<String>,
}

fn default_repo() -> PathBuf {
    PathBuf::from(".")
}
fn default_days() -> u32 {
    30
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_doc_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_technologies() -> Vec<String> {
    [
        "rust", "cargo", "node", "npm", "react", "typescript", "python", "docker", "kubernetes",
        "postgres", "sqlite", "redis", "stripe", "aws",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Full-text index is rebuilt from the document table after this many
    /// changed documents.
    #[serde(default = "default_fts_rebuild_interval")]
    pub fts_rebuild_interval: u32,
    #[serde(default = "default_search_limit")]
    pub search_limit: i64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            fts_rebuild_interval: default_fts_rebuild_interval(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/trail.sqlite")
}
fn default_fts_rebuild_interval() -> u32 {
    10
}
fn default_search_limit() -> i64 {
    20
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.capture.max_content_length == 0 {
        anyhow::bail!("capture.max_content_length must be > 0");
    }
    if config.capture.max_activities == 0 {
        anyhow::bail!("capture.max_activities must be > 0");
    }
    if config.serializer.max_depth == 0 {
        anyhow::bail!("serializer.max_depth must be > 0");
    }
    if config.serializer.max_array_items == 0 {
        anyhow::bail!("serializer.max_array_items must be > 0");
    }
    // Typed string fields are clamped at the capture limit; anything the
    // serializer would still truncate cannot be read back as a session.
    if config.capture.max_content_length > config.serializer.max_content_length {
        anyhow::bail!(
            "capture.max_content_length ({}) must not exceed serializer.max_content_length ({})",
            config.capture.max_content_length,
            config.serializer.max_content_length
        );
    }
    if config.capture.max_activities > config.serializer.max_array_items {
        anyhow::bail!(
            "capture.max_activities ({}) must not exceed serializer.max_array_items ({})",
            config.capture.max_activities,
            config.serializer.max_array_items
        );
    }
    if config.serializer.circuit_breaker_threshold == 0 {
        anyhow::bail!("serializer.circuit_breaker_threshold must be >= 1");
    }
    if config.integrity.circuit_breaker_threshold == 0 {
        anyhow::bail!("integrity.circuit_breaker_threshold must be >= 1");
    }
    if config.index.fts_rebuild_interval == 0 {
        anyhow::bail!("index.fts_rebuild_interval must be >= 1");
    }
    if config.index.search_limit < 1 {
        anyhow::bail!("index.search_limit must be >= 1");
    }
    if config.history.poll_interval_secs == 0 {
        anyhow::bail!("history.poll_interval_secs must be > 0");
    }
    for rule in &config.history.projects {
        if rule.keywords.is_empty() {
            anyhow::bail!("history.projects '{}' has no keywords", rule.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = load_config(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(cfg.capture.max_content_length, 10 * 1024);
        assert_eq!(cfg.capture.max_activities, 1000);
        assert_eq!(cfg.serializer.max_depth, 10);
        assert_eq!(cfg.serializer.circuit_breaker_threshold, 5);
        assert_eq!(cfg.serializer.circuit_breaker_timeout_ms, 60_000);
        assert_eq!(cfg.history.poll_interval_secs, 30);
        assert_eq!(cfg.index.search_limit, 20);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("trail.toml");
        std::fs::write(
            &path,
            r#"
[capture]
session_dir = "/tmp/s"

[[history.projects]]
name = "checkout"
keywords = ["payment", "stripe"]
"#,
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.capture.session_dir, PathBuf::from("/tmp/s"));
        assert_eq!(cfg.capture.max_activities, 1000);
        assert_eq!(cfg.history.projects.len(), 1);
        assert_eq!(cfg.index.fts_rebuild_interval, 10);
    }

    #[test]
    fn example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/trail.example.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.history.projects[0].name, "checkout");
        assert_eq!(cfg.serializer.max_array_items, 1000);
    }

    #[test]
    fn rejects_capture_limit_above_serializer_limit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("trail.toml");
        std::fs::write(
            &path,
            "[capture]\nmax_content_length = 20000\n\n[serializer]\nmax_content_length = 10240\n",
        )
        .unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("capture.max_content_length"), "{}", err);

        std::fs::write(&path, "[capture]\nmax_content_length = 500\n").unwrap();
        assert_eq!(load_config(&path).unwrap().capture.max_content_length, 500);
    }

    #[test]
    fn rejects_zero_threshold() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("trail.toml");
        std::fs::write(&path, "[serializer]\ncircuit_breaker_threshold = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
