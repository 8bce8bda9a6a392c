// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

/// Top-level sqlnest configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SqlnestConfig {
    /// Connection settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Settings handed to the connection factory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// WAL journal with `synchronous=NORMAL`: trades some crash durability
    /// for write throughput.
    #[serde(default = "default_true")]
    pub enable_durability_mode: bool,

    /// Enforce foreign key constraints (`PRAGMA foreign_keys=ON`).
    #[serde(default = "default_true")]
    pub enable_referential_integrity: bool,

    /// How long a statement waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Open the database read-only.
    #[serde(default)]
    pub read_only: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            enable_durability_mode: true,
            enable_referential_integrity: true,
            busy_timeout_ms: default_busy_timeout_ms(),
            read_only: false,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("sqlnest").join("sqlnest.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("sqlnest.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}
