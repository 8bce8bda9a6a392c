// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nested transaction scopes for SQLite.
//!
//! Opens connections with WAL and foreign-key enforcement enabled by default,
//! and attaches a scope manager that turns nested scopes into one real
//! transaction plus a chain of savepoints. A synchronous API is exposed through
//! [`TransactionalConnection`] and an async single-writer facade through
//! [`Database`].

pub mod connection;
pub mod database;
pub mod transaction;

pub use connection::{configure, connect, connect_in_memory, connect_with_config, ConnectOptions};
pub use database::{BorrowedConnection, Database};
pub use transaction::{Scope, TransactionalConnection};
