//! # SQLite Connection Manager
//!
//! Opens (creating if needed) an embedded SQLite database file using the `sqlx`
//! crate. SQLite tolerates a single writer only, so the pool is capped at one
//! connection and callers serialize work on top of it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

/// Custom error types for Database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Open {path} failed. {source}")]
    ConnectionError {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
}

/// A wrapper around the SQLite connection pool.
pub struct Database {
    /// The underlying sqlx connection pool.
    pub pool: SqlitePool,
    /// The database file this pool is bound to.
    path: PathBuf,
}

impl Database {
    /// Opens the database file at `path`, creating it if it does not exist.
    ///
    /// # Arguments
    /// * `path` - Location of the SQLite file.
    /// * `acquire_timeout` - How long to wait for the single pooled connection.
    pub async fn open(path: &Path, acquire_timeout: Duration) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(acquire_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|source| DbError::ConnectionError {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// The file backing this database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the pool, waiting for the connection to be released.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
