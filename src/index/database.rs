//! SQLite-backed cache index database.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::entry::CacheEntry;

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Errors from index persistence.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The underlying SQLite operation failed.
    #[error("Index database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database file's schema version is newer than this build knows.
    #[error("Unsupported index schema version {found} (expected <= {supported})")]
    SchemaTooNew {
        /// Version found in the database file
        found: i32,
        /// Newest version this build supports
        supported: i32,
    },
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Persistent mapping from content hash to last-known file metadata.
///
/// All writes are serialized through a single connection behind a mutex
/// (single-writer discipline); `list` takes a point-in-time snapshot and
/// releases the lock before returning.
///
/// # Example
///
/// ```no_run
/// use rescache::index::{CacheIndex, CacheEntry};
/// use std::path::PathBuf;
///
/// let index = CacheIndex::open(std::path::Path::new("index.db")).unwrap();
/// index.upsert(&CacheEntry {
///     hash: "ab".repeat(32),
///     path: PathBuf::from("/resources/a.mdl"),
///     size: 1024,
///     last_write_time: 1_700_000_000,
/// }).unwrap();
/// assert_eq!(index.len().unwrap(), 1);
/// ```
pub struct CacheIndex {
    conn: Mutex<Connection>,
}

impl CacheIndex {
    /// Open or create the index database at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or the schema cannot be
    /// created/migrated.
    pub fn open(path: &Path) -> IndexResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory index, used by tests and `--once` dry runs.
    ///
    /// # Errors
    ///
    /// Fails if SQLite cannot create the in-memory database.
    pub fn open_in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> IndexResult<Self> {
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(IndexError::SchemaTooNew {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                hash            TEXT PRIMARY KEY,
                path            TEXT NOT NULL,
                size            INTEGER NOT NULL,
                last_write_time INTEGER NOT NULL
            );",
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Snapshot of all entries, in no particular order.
    ///
    /// # Errors
    ///
    /// Fails only on a database-level error; an empty index yields an
    /// empty vector.
    pub fn list(&self) -> IndexResult<Vec<CacheEntry>> {
        let conn = self.conn.lock().expect("index lock poisoned");
        let mut stmt =
            conn.prepare_cached("SELECT hash, path, size, last_write_time FROM entries")?;
        let rows = stmt.query_map([], row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Look up a single entry by hash.
    ///
    /// # Errors
    ///
    /// Fails only on a database-level error; a missing hash yields `None`.
    pub fn get(&self, hash: &str) -> IndexResult<Option<CacheEntry>> {
        let conn = self.conn.lock().expect("index lock poisoned");
        let mut stmt = conn.prepare_cached(
            "SELECT hash, path, size, last_write_time FROM entries WHERE hash = ?1",
        )?;
        Ok(stmt.query_row(params![hash], row_to_entry).optional()?)
    }

    /// Insert or replace the entry for `entry.hash`. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails only on a database-level error.
    pub fn upsert(&self, entry: &CacheEntry) -> IndexResult<()> {
        let conn = self.conn.lock().expect("index lock poisoned");
        conn.prepare_cached(
            "INSERT OR REPLACE INTO entries (hash, path, size, last_write_time)
             VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![
            entry.hash,
            entry.path.to_string_lossy(),
            entry.size,
            entry.last_write_time,
        ])?;
        Ok(())
    }

    /// Remove the entry for `hash`, if any. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails only on a database-level error.
    pub fn remove(&self, hash: &str) -> IndexResult<()> {
        let conn = self.conn.lock().expect("index lock poisoned");
        conn.prepare_cached("DELETE FROM entries WHERE hash = ?1")?
            .execute(params![hash])?;
        Ok(())
    }

    /// Number of entries currently in the index.
    ///
    /// # Errors
    ///
    /// Fails only on a database-level error.
    pub fn len(&self) -> IndexResult<usize> {
        let conn = self.conn.lock().expect("index lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Whether the index holds no entries.
    ///
    /// # Errors
    ///
    /// Fails only on a database-level error.
    pub fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    let path: String = row.get(1)?;
    Ok(CacheEntry {
        hash: row.get(0)?,
        path: PathBuf::from(path),
        size: row.get(2)?,
        last_write_time: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(hash: &str, path: &str) -> CacheEntry {
        CacheEntry {
            hash: hash.to_string(),
            path: PathBuf::from(path),
            size: 42,
            last_write_time: 1_700_000_000,
        }
    }

    #[test]
    fn test_upsert_and_list() {
        let index = CacheIndex::open_in_memory().unwrap();
        index.upsert(&entry(&"aa".repeat(32), "/r/a.mdl")).unwrap();
        index.upsert(&entry(&"bb".repeat(32), "/r/b.tex")).unwrap();

        let mut entries = index.list().unwrap();
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("/r/a.mdl"));
        assert_eq!(entries[1].path, PathBuf::from("/r/b.tex"));
    }

    #[test]
    fn test_upsert_is_idempotent_per_hash() {
        let index = CacheIndex::open_in_memory().unwrap();
        let hash = "cc".repeat(32);
        index.upsert(&entry(&hash, "/r/first.mdl")).unwrap();
        index.upsert(&entry(&hash, "/r/second.mdl")).unwrap();

        assert_eq!(index.len().unwrap(), 1);
        let got = index.get(&hash).unwrap().unwrap();
        assert_eq!(got.path, PathBuf::from("/r/second.mdl"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let index = CacheIndex::open_in_memory().unwrap();
        let hash = "dd".repeat(32);
        index.upsert(&entry(&hash, "/r/a.mdl")).unwrap();

        index.remove(&hash).unwrap();
        index.remove(&hash).unwrap();
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.db");
        let hash = "ee".repeat(32);

        {
            let index = CacheIndex::open(&db_path).unwrap();
            index.upsert(&entry(&hash, "/r/a.mdl")).unwrap();
        }

        let reopened = CacheIndex::open(&db_path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert!(reopened.get(&hash).unwrap().is_some());
    }

    #[test]
    fn test_get_missing_is_none() {
        let index = CacheIndex::open_in_memory().unwrap();
        assert!(index.get(&"ff".repeat(32)).unwrap().is_none());
    }
}
