//! Persistent state volume layout.
//!
//! The database file lives on an externally owned volume together with its
//! journal/WAL side files. Side files found at startup after an unclean
//! shutdown mean the service must run integrity recovery before treating the
//! database as clean; this layer reports them and never deletes them.

use std::io;
use std::path::{Path, PathBuf};

/// Suffixes of the side files that can accompany the database file.
const SIDE_FILE_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Return the side files that currently exist next to `db_path`.
///
/// An empty result means the previous shutdown finalized cleanly (or the
/// database has never been written).
pub fn side_files(db_path: &Path) -> Vec<PathBuf> {
    SIDE_FILE_SUFFIXES
        .iter()
        .filter_map(|suffix| {
            let mut name = db_path.as_os_str().to_owned();
            name.push(suffix);
            let candidate = PathBuf::from(name);
            candidate.exists().then_some(candidate)
        })
        .collect()
}

/// Ensure the directory that will hold `db_path` exists.
///
/// The volume mount itself is the operator's responsibility; a mount-path
/// mismatch is not detectable here. This only guarantees the configured
/// parent directory is present so the service can open its database.
pub fn prepare_state_dir(db_path: &Path) -> io::Result<()> {
    match db_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_side_files_for_clean_state() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("auth.db");
        std::fs::write(&db, b"data").unwrap();
        assert!(side_files(&db).is_empty());
    }

    #[test]
    fn reports_existing_side_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("auth.db");
        std::fs::write(&db, b"data").unwrap();
        std::fs::write(dir.path().join("auth.db-wal"), b"w").unwrap();
        std::fs::write(dir.path().join("auth.db-shm"), b"s").unwrap();

        let found = side_files(&db);
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|p| p.ends_with("auth.db-wal")));
        assert!(found.iter().any(|p| p.ends_with("auth.db-shm")));
    }

    #[test]
    fn side_files_are_not_deleted_by_inspection() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("auth.db");
        let journal = dir.path().join("auth.db-journal");
        std::fs::write(&journal, b"j").unwrap();

        let found = side_files(&db);
        assert_eq!(found.len(), 1);
        assert!(journal.exists());
    }

    #[test]
    fn prepare_state_dir_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/state/auth.db");
        prepare_state_dir(&db).unwrap();
        assert!(dir.path().join("nested/state").is_dir());
    }

    #[test]
    fn prepare_state_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("auth.db");
        prepare_state_dir(&db).unwrap();
        prepare_state_dir(&db).unwrap();
    }
}
