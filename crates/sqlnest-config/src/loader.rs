// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-based loader.
//!
//! Merge order, later wins: compiled defaults, `/etc/sqlnest/sqlnest.toml`,
//! `~/.config/sqlnest/sqlnest.toml`, `./sqlnest.toml`, then `SQLNEST_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SqlnestConfig;

pub(crate) const LOCAL_CONFIG: &str = "sqlnest.toml";
pub(crate) const SYSTEM_CONFIG: &str = "/etc/sqlnest/sqlnest.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("sqlnest").join(LOCAL_CONFIG))
        .unwrap_or_default()
}

/// Load configuration from the standard file hierarchy plus env overrides.
pub fn load_config() -> Result<SqlnestConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string, without files or env.
pub fn load_config_from_str(toml_content: &str) -> Result<SqlnestConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SqlnestConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one file with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<SqlnestConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SqlnestConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(SqlnestConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// `SQLNEST_STORAGE_BUSY_TIMEOUT_MS` maps to `storage.busy_timeout_ms`.
///
/// Uses `map()` rather than `split("_")` because field names contain
/// underscores.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("SQLNEST_").map(|key| key.as_str().replacen("storage_", "storage.", 1).into())
}
