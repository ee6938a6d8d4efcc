//! Named-entry persistence for the gallery.
//!
//! A backend stores opaque string values under string keys, the way a
//! browser's local storage does. The gallery is one entry holding a JSON array.

use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid entry key {0:?}")]
    InvalidKey(String),
}

/// Key-value persistence for named entries.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;
}

/// In-process backend; contents vanish with the process.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with one entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let backend = Self::new();
        backend.lock().insert(key.to_string(), value.to_string());
        backend
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per entry inside a directory.
///
/// Writes go to a sibling temp file that is synced to disk and then renamed
/// into place, so a reader never sees a half-written entry and a returned
/// `set` survives power loss.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let path = self.entry_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let path = self.entry_path(key)?;
        std::fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &path)?;
        // Make the rename itself durable. Directories cannot be opened for
        // syncing on every platform, so a failure here is not an error.
        if let Ok(dir) = std::fs::File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

/// Entries in a single SQLite table.
pub struct SqliteBackend {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database file, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened gallery database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, BackendError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KvBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let conn = self.lock();
        let value = conn
            .query_row("SELECT value FROM entries WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(backend: &dyn KvBackend) {
        assert_eq!(backend.get("trainedFaces").unwrap(), None);
        backend.set("trainedFaces", "[]").unwrap();
        assert_eq!(backend.get("trainedFaces").unwrap().as_deref(), Some("[]"));
        backend.set("trainedFaces", "[1]").unwrap();
        assert_eq!(backend.get("trainedFaces").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_memory_backend() {
        exercise(&MemoryBackend::new());
    }

    #[test]
    fn test_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("gallery"));
        exercise(&backend);
        assert!(dir.path().join("gallery/trainedFaces.json").exists());
        assert!(!dir.path().join("gallery/trainedFaces.json.tmp").exists());
    }

    #[test]
    fn test_file_backend_overwrite_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.set("trainedFaces", &"x".repeat(64 * 1024)).unwrap();
        backend.set("trainedFaces", "[]").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("trainedFaces.json")).unwrap(), "[]");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_file_backend_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(matches!(backend.get("../etc"), Err(BackendError::InvalidKey(_))));
        assert!(matches!(backend.set("a/b", "x"), Err(BackendError::InvalidKey(_))));
    }

    #[test]
    fn test_sqlite_backend() {
        exercise(&SqliteBackend::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_backend_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/gallery.db");
        SqliteBackend::open(&path).unwrap().set("k", "v").unwrap();
        let reopened = SqliteBackend::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }
}
