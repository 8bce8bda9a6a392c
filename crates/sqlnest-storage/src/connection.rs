// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection factory: opens SQLite, applies PRAGMAs, attaches the scope
//! manager.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use sqlnest_config::StorageConfig;
use sqlnest_core::{Result, SqlnestError};
use tracing::debug;

use crate::transaction::TransactionalConnection;

/// Arguments forwarded to the engine when opening a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `journal_mode=WAL` plus `synchronous=NORMAL`.
    pub enable_durability_mode: bool,
    /// `foreign_keys=ON`.
    pub enable_referential_integrity: bool,
    /// `None` leaves SQLite's default (fail immediately on a locked database).
    pub busy_timeout: Option<Duration>,
    pub flags: OpenFlags,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            enable_durability_mode: true,
            enable_referential_integrity: true,
            busy_timeout: Some(Duration::from_secs(5)),
            flags: OpenFlags::default(),
        }
    }
}

impl ConnectOptions {
    pub fn durability_mode(mut self, enabled: bool) -> Self {
        self.enable_durability_mode = enabled;
        self
    }

    pub fn referential_integrity(mut self, enabled: bool) -> Self {
        self.enable_referential_integrity = enabled;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Open read-only. Durability mode must be disabled separately since the
    /// journal mode cannot be changed without write access.
    pub fn read_only(mut self) -> Self {
        self.flags.remove(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE);
        self.flags.insert(OpenFlags::SQLITE_OPEN_READ_ONLY);
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_read_only() && self.enable_durability_mode {
            return Err(SqlnestError::Config(
                "durability mode requires a writable connection".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&StorageConfig> for ConnectOptions {
    fn from(config: &StorageConfig) -> Self {
        let options = Self {
            enable_durability_mode: config.enable_durability_mode,
            enable_referential_integrity: config.enable_referential_integrity,
            busy_timeout: Some(Duration::from_millis(config.busy_timeout_ms)),
            flags: OpenFlags::default(),
        };
        if config.read_only {
            options.read_only()
        } else {
            options
        }
    }
}

/// Open a file-backed connection with the scope manager attached.
pub fn connect(path: impl AsRef<Path>, options: &ConnectOptions) -> Result<TransactionalConnection> {
    options.validate()?;
    let path = path.as_ref();
    let conn = Connection::open_with_flags(path, options.flags)?;
    configure(&conn, options)?;
    debug!(path = %path.display(), "opened transactional connection");
    Ok(TransactionalConnection::new(conn))
}

/// Open a private in-memory database with the scope manager attached.
pub fn connect_in_memory(options: &ConnectOptions) -> Result<TransactionalConnection> {
    options.validate()?;
    let conn = Connection::open_in_memory_with_flags(options.flags)?;
    configure(&conn, options)?;
    Ok(TransactionalConnection::new(conn))
}

/// Open the database described by a loaded [`StorageConfig`].
pub fn connect_with_config(config: &StorageConfig) -> Result<TransactionalConnection> {
    if config.database_path.trim().is_empty() {
        return Err(SqlnestError::Config(
            "storage.database_path must not be empty".to_string(),
        ));
    }
    connect(&config.database_path, &ConnectOptions::from(config))
}

/// Apply busy timeout and PRAGMAs. Must run outside any transaction: SQLite
/// ignores `foreign_keys` changes inside one.
pub fn configure(conn: &Connection, options: &ConnectOptions) -> Result<()> {
    if let Some(timeout) = options.busy_timeout {
        conn.busy_timeout(timeout)?;
    }

    if options.enable_durability_mode {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(journal_mode = %mode, "durability mode enabled");
    }

    if options.enable_referential_integrity {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        debug!("foreign key enforcement enabled");
    }

    Ok(())
}
