// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: opening, PRAGMA setup, migrations, and close.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serializes writers. Do not open a second connection for writes.

use std::path::Path;
use std::time::Duration;

use twinlink_core::TwinlinkError;

use crate::migrations::run_migrations;

/// Connection options applied at open time.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub wal_mode: bool,
    pub busy_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// A migrated SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` with default options.
    pub async fn open(path: &str) -> Result<Self, TwinlinkError> {
        Self::open_with(path, OpenOptions::default()).await
    }

    /// Open the database at `path`, creating parent directories as needed.
    pub async fn open_with(path: &str, options: OpenOptions) -> Result<Self, TwinlinkError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| TwinlinkError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| TwinlinkError::Storage {
                source: Box::new(e),
            })?;
        Self::prepare(conn, options).await
    }

    /// A private in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, TwinlinkError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| TwinlinkError::Storage {
                source: Box::new(e),
            })?;
        Self::prepare(
            conn,
            OpenOptions {
                wal_mode: false,
                ..OpenOptions::default()
            },
        )
        .await
    }

    async fn prepare(
        conn: tokio_rusqlite::Connection,
        options: OpenOptions,
    ) -> Result<Self, TwinlinkError> {
        conn.call(move |conn| -> Result<Result<(), TwinlinkError>, rusqlite::Error> {
            if options.wal_mode {
                let mode: String =
                    conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                tracing::debug!(journal_mode = %mode, "journal mode set");
            }
            conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(options.busy_timeout)?;
            Ok(run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;
        Ok(Self { conn })
    }

    /// The underlying connection handle.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), TwinlinkError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.clone().close().await.map_err(|e| TwinlinkError::Storage {
            source: Box::new(e),
        })
    }
}

/// Wrap a tokio-rusqlite failure as a storage error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TwinlinkError {
    TwinlinkError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("twinlink.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        for table in ["agents", "conversations", "jobs", "matches", "messages", "users"] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twinlink.db");
        let path = path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn wal_mode_is_enabled() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("wal.db").to_str().unwrap())
            .await
            .unwrap();
        let mode: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
