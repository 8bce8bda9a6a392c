// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types for sqlnest.
//!
//! Provides the shared error type and the engine-independent frame stack
//! that models nested transaction scopes as a root transaction plus a LIFO
//! chain of savepoints.

pub mod error;
pub mod frame;

pub use error::{Result, SqlnestError};
pub use frame::{ControlStatement, Frame, FrameKind, FrameStack, ScopeOutcome};
