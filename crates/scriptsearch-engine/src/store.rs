//! Read-only connection to the structured store
//!
//! The engine never writes. Connections are opened with
//! `SQLITE_OPEN_READ_ONLY` and additionally pinned with `PRAGMA query_only`,
//! so any mutating statement is rejected by SQLite itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, trace};

use crate::error::{Result, SearchError};
use crate::predicate::BuiltQuery;

/// How long a reader waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A read-only handle to the structured store, opened per call
pub struct StoreConnection {
    conn: Connection,
    path: PathBuf,
}

impl StoreConnection {
    /// Open an existing store read-only.
    ///
    /// A missing file or an unopenable database is `StoreUnavailable`.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SearchError::store_unavailable(path, "file not found"));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| SearchError::store_unavailable(path, e.to_string()))?;
        Self::configure_connection(&conn)
            .map_err(|e| SearchError::store_unavailable(path, e.to_string()))?;

        trace!("Opened structured store read-only at {}", path.display());

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
        conn.pragma_update(None, "query_only", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    /// Path this connection was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying connection, for callers that need raw access
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a built query, mapping every row.
    ///
    /// `context` names the failing stage in `StoreExecution` errors.
    pub fn query_rows<T, F>(&self, context: &str, built: &BuiltQuery, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        debug!(context, sql = %built.sql, params = built.params.len(), "Executing store query");

        let mut stmt = self
            .conn
            .prepare(&built.sql)
            .map_err(|e| SearchError::store_execution(context, &e))?;
        let params = built.named_params();
        let rows = stmt
            .query_map(params.as_slice(), map)
            .map_err(|e| SearchError::store_execution(context, &e))?;

        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(|e| SearchError::store_execution(context, &e))
    }

    /// Run a built `COUNT(..)` query
    pub fn query_count(&self, context: &str, built: &BuiltQuery) -> Result<usize> {
        debug!(context, sql = %built.sql, "Executing store count");

        let params = built.named_params();
        let count: i64 = self
            .conn
            .query_row(&built.sql, params.as_slice(), |row| row.get(0))
            .map_err(|e| SearchError::store_execution(context, &e))?;
        Ok(count.max(0) as usize)
    }
}

impl std::fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConnection")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreFault;
    use crate::schema::SCHEMA_ALL;
    use rusqlite::types::Value;
    use tempfile::TempDir;

    fn create_store(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("scripts.db");
        let conn = Connection::open(&path).unwrap();
        for statement in SCHEMA_ALL {
            conn.execute_batch(statement).unwrap();
        }
        conn.execute(
            "INSERT INTO scripts (title, author) VALUES ('Pilot', 'A. Writer')",
            [],
        )
        .unwrap();
        path
    }

    #[test]
    fn test_open_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = StoreConnection::open(&dir.path().join("absent.db")).unwrap_err();
        assert!(matches!(err, SearchError::StoreUnavailable { .. }));
    }

    #[test]
    fn test_mutation_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = create_store(&dir);
        let store = StoreConnection::open(&path).unwrap();

        let result = store
            .connection()
            .execute("INSERT INTO scripts (title) VALUES ('Intruder')", []);
        assert!(result.is_err());

        let result = store.connection().execute("DELETE FROM scripts", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_query_rows_and_count() {
        let dir = TempDir::new().unwrap();
        let path = create_store(&dir);
        let store = StoreConnection::open(&path).unwrap();

        let built = BuiltQuery {
            sql: "SELECT title FROM scripts WHERE title LIKE :title".into(),
            params: vec![(":title".into(), Value::Text("%Pil%".into()))],
        };
        let titles: Vec<String> = store.query_rows("titles", &built, |row| row.get(0)).unwrap();
        assert_eq!(titles, vec!["Pilot"]);

        let built = BuiltQuery {
            sql: "SELECT COUNT(*) FROM scripts".into(),
            params: vec![],
        };
        assert_eq!(store.query_count("count", &built).unwrap(), 1);
    }

    #[test]
    fn test_missing_relation_is_classified() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE unrelated (id INTEGER)")
            .unwrap();
        let store = StoreConnection::open(&path).unwrap();

        let built = BuiltQuery {
            sql: "SELECT id FROM scenes".into(),
            params: vec![],
        };
        let err = store
            .query_rows("content search", &built, |row| row.get::<_, i64>(0))
            .unwrap_err();
        match err {
            SearchError::StoreExecution { context, fault } => {
                assert_eq!(context, "content search");
                assert_eq!(fault, StoreFault::MissingRelation("scenes".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
