//! Session identifiers and on-disk layout.
//!
//! ```text
//! <session_dir>/
//!   <id>.json               primary record, rewritten after every event
//!   <id>.json.corrupted     primary that was set aside as unreadable
//!   <id>.backup.json        reduced record written when the full persist fails
//!   recovered/<id>.json     output of integrity recovery
//!   summaries/<id>.json     finalized summary
//! ```

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `session-YYYY-MM-DD-<millis>`; the suffix is strictly increasing within
/// the process even when called twice in the same millisecond.
pub fn generate_session_id() -> String {
    let now = Utc::now();
    let mut candidate = now.timestamp_millis();
    let mut last = LAST_ID_MILLIS.load(Ordering::SeqCst);
    loop {
        if candidate <= last {
            candidate = last + 1;
        }
        match LAST_ID_MILLIS.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => break,
            Err(actual) => last = actual,
        }
    }
    format!("session-{}-{}", now.format("%Y-%m-%d"), candidate)
}

pub fn primary_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

pub fn corrupted_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json.corrupted", id))
}

pub fn backup_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.backup.json", id))
}

pub fn recovered_path(dir: &Path, id: &str) -> PathBuf {
    dir.join("recovered").join(format!("{}.json", id))
}

pub fn summary_path(dir: &Path, id: &str) -> PathBuf {
    dir.join("summaries").join(format!("{}.json", id))
}

/// Session id for a primary file name, or `None` for backups and other
/// sibling variants.
pub fn session_id_from_file_name(name: &str) -> Option<&str> {
    if name.ends_with(".backup.json") {
        return None;
    }
    name.strip_suffix(".json").filter(|id| !id.is_empty())
}

/// Sorted ids of every primary session file directly under `dir`.
pub fn list_session_ids(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(id) = session_id_from_file_name(&name.to_string_lossy()) {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Write `contents` to `path`, creating the parent directory first.
pub fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_increasing() {
        let ids: Vec<String> = (0..200).map(|_| generate_session_id()).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        let suffixes: Vec<i64> = ids
            .iter()
            .map(|id| id.rsplit('-').next().unwrap().parse().unwrap())
            .collect();
        assert!(suffixes.windows(2).all(|w| w[0] < w[1]));
        assert!(ids[0].starts_with("session-"));
    }

    #[test]
    fn file_name_classification() {
        assert_eq!(session_id_from_file_name("s1.json"), Some("s1"));
        assert_eq!(session_id_from_file_name("s1.backup.json"), None);
        assert_eq!(session_id_from_file_name("s1.json.corrupted"), None);
        assert_eq!(session_id_from_file_name(".json"), None);
    }

    #[test]
    fn listing_skips_siblings_and_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("b.json"), "{}").unwrap();
        std::fs::write(dir.join("a.json"), "{}").unwrap();
        std::fs::write(dir.join("a.backup.json"), "{}").unwrap();
        std::fs::write(dir.join("c.json.corrupted"), "{").unwrap();
        std::fs::create_dir_all(dir.join("summaries")).unwrap();
        std::fs::write(dir.join("summaries").join("z.json"), "{}").unwrap();
        assert_eq!(list_session_ids(dir).unwrap(), vec!["a", "b"]);
    }
}
