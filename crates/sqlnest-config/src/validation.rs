// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::SqlnestConfig;

/// Upper bound for `storage.busy_timeout_ms` (10 minutes).
pub const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;

/// Validate a deserialized configuration, collecting every problem found.
pub fn validate_config(config: &SqlnestConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let storage = &config.storage;

    if storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if storage.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        errors.push(ConfigError::Validation {
            message: format!(
                "storage.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}, got {}",
                storage.busy_timeout_ms
            ),
        });
    }

    // WAL needs to create the -wal and -shm files next to the database.
    if storage.read_only && storage.enable_durability_mode {
        errors.push(ConfigError::Validation {
            message: "storage.enable_durability_mode cannot be set on a read_only database"
                .to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
