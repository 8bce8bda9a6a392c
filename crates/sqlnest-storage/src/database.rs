// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async facade over a single connection.
//!
//! All statements run on tokio-rusqlite's one background thread, which makes
//! `Database` the single writer for its file. Each [`Database::transaction`]
//! call attaches a scope manager for the duration of the call and runs the
//! whole scope tree there; scopes are balanced per call, so the connection is
//! idle again at every call boundary.

use std::path::Path;

use rusqlite::Connection;
use sqlnest_config::StorageConfig;
use sqlnest_core::{Result, SqlnestError};
use tracing::debug;

use crate::connection::{self, ConnectOptions};
use crate::transaction::TransactionalConnection;

/// Transactional connection handed to closures run by [`Database::transaction`].
pub type BorrowedConnection<'c> = TransactionalConnection<&'c mut Connection>;

/// Handle to a database served by a background connection thread.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    wal: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("wal", &self.wal)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the file named by `config`, creating parent directories as needed.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let options = ConnectOptions::from(config);
        options.validate()?;

        let path = Path::new(&config.database_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !config.read_only
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = tokio_rusqlite::Connection::open_with_flags(path, options.flags).await?;
        let db = Self::configure(conn, options).await?;
        debug!(path = %config.database_path, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory(options: ConnectOptions) -> Result<Self> {
        options.validate()?;
        let conn = tokio_rusqlite::Connection::open_in_memory_with_flags(options.flags).await?;
        Self::configure(conn, options).await
    }

    async fn configure(conn: tokio_rusqlite::Connection, options: ConnectOptions) -> Result<Self> {
        let wal = options.enable_durability_mode;
        conn.call(move |conn| connection::configure(conn, &options))
            .await
            .map_err(map_tr_err)?;
        Ok(Self { conn, wal })
    }

    /// The raw async connection, for statements that need no scope.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run `body` inside a scope on the background thread.
    ///
    /// Same semantics as [`TransactionalConnection::transaction`]: `Ok`
    /// commits, `Err` rolls back and is returned unchanged, and `body` may
    /// open nested scopes through the connection it receives.
    pub async fn transaction<T, E, F>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&BorrowedConnection<'_>) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<SqlnestError> + std::fmt::Debug + Send + 'static,
    {
        self.conn
            .call(move |conn| Ok::<_, SqlnestError>(TransactionalConnection::new(conn).transaction(body)))
            .await
            .map_err(map_tr_err)?
    }

    /// Checkpoint the WAL (when in durability mode) and close the connection.
    pub async fn close(self) -> Result<()> {
        if self.wal {
            self.conn
                .call(|conn| -> std::result::Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Convert tokio-rusqlite errors, keeping engine errors intact.
pub(crate) fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> SqlnestError
where
    E: Into<SqlnestError> + std::fmt::Display,
{
    match e {
        tokio_rusqlite::Error::ConnectionClosed => SqlnestError::ConnectionClosed,
        tokio_rusqlite::Error::Error(err) => err.into(),
        other => SqlnestError::Internal(other.to_string()),
    }
}
