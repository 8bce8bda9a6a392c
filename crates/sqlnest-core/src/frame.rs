// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame stack bookkeeping for nested transaction scopes.
//!
//! This module knows nothing about the engine. It decides which frame an
//! enter would push and which control statement each enter/exit maps to; the
//! storage crate issues those statements and checks the engine's state.

use std::fmt;

/// Prefix for generated savepoint names.
const SAVEPOINT_PREFIX: &str = "sqlnest_sp_";

/// How a scope body finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    /// The body completed without signaling a failure.
    Normal,
    /// The body returned an error, returned early through `?`, or unwound.
    Failed,
}

impl ScopeOutcome {
    /// Outcome for a body result. The error value itself is never inspected.
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Normal
        } else {
            Self::Failed
        }
    }
}

/// Kind of an open frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// The outermost scope, backed by the engine's real transaction.
    Root,
    /// A nested scope backed by a named savepoint.
    Savepoint(String),
}

/// One open nested transaction level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
}

impl Frame {
    /// The root frame.
    pub fn root() -> Self {
        Self {
            kind: FrameKind::Root,
        }
    }

    /// A savepoint frame for a scope opened at `depth` (the number of frames
    /// already on the stack, always at least 1).
    pub fn savepoint(depth: usize) -> Self {
        Self {
            kind: FrameKind::Savepoint(savepoint_name(depth)),
        }
    }

    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, FrameKind::Root)
    }

    /// Savepoint name, `None` for the root frame.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            FrameKind::Root => None,
            FrameKind::Savepoint(name) => Some(name),
        }
    }

    /// Statement that opens this frame.
    pub fn open_statement(&self) -> ControlStatement<'_> {
        match &self.kind {
            FrameKind::Root => ControlStatement::Begin,
            FrameKind::Savepoint(name) => ControlStatement::Savepoint(name),
        }
    }

    /// Statement that closes this frame with the given outcome.
    pub fn close_statement(&self, outcome: ScopeOutcome) -> ControlStatement<'_> {
        match (&self.kind, outcome) {
            (FrameKind::Root, ScopeOutcome::Normal) => ControlStatement::Commit,
            (FrameKind::Root, ScopeOutcome::Failed) => ControlStatement::Rollback,
            (FrameKind::Savepoint(name), ScopeOutcome::Normal) => ControlStatement::Release(name),
            (FrameKind::Savepoint(name), ScopeOutcome::Failed) => {
                ControlStatement::RollbackTo(name)
            }
        }
    }

    /// Statement to run after a successful close, if any.
    ///
    /// `ROLLBACK TO` keeps the savepoint itself open in SQLite, so a failed
    /// savepoint frame is released afterwards. Without this, every failed
    /// nested scope would leave one stale savepoint behind until the root
    /// transaction ends.
    pub fn cleanup_statement(&self, outcome: ScopeOutcome) -> Option<ControlStatement<'_>> {
        match (&self.kind, outcome) {
            (FrameKind::Savepoint(name), ScopeOutcome::Failed) => {
                Some(ControlStatement::Release(name))
            }
            _ => None,
        }
    }

    /// Whether the engine must still report an open transaction once this
    /// frame has been closed. Only closing the root ends the transaction.
    pub fn engine_active_after_close(&self) -> bool {
        !self.is_root()
    }
}

/// Deterministic savepoint name for a frame created at `depth`.
///
/// Unique among open frames as long as frames are pushed and popped in strict
/// LIFO order by a single owner.
pub fn savepoint_name(depth: usize) -> String {
    format!("{SAVEPOINT_PREFIX}{depth}")
}

/// A transaction-control statement sent to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatement<'a> {
    Begin,
    Savepoint(&'a str),
    Commit,
    Release(&'a str),
    Rollback,
    RollbackTo(&'a str),
}

impl fmt::Display for ControlStatement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => f.write_str("BEGIN TRANSACTION"),
            Self::Savepoint(name) => write!(f, "SAVEPOINT {name}"),
            Self::Commit => f.write_str("COMMIT TRANSACTION"),
            Self::Release(name) => write!(f, "RELEASE SAVEPOINT {name}"),
            Self::Rollback => f.write_str("ROLLBACK TRANSACTION"),
            Self::RollbackTo(name) => write!(f, "ROLLBACK TRANSACTION TO SAVEPOINT {name}"),
        }
    }
}

/// Ordered record of currently open scopes, innermost last.
#[derive(Debug, Default, Clone)]
pub struct FrameStack {
    frames: Vec<Frame>,
}

impl FrameStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost open frame.
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Open frames from outermost to innermost.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// The frame an enter-scope at the current depth would push.
    pub fn next_frame(&self) -> Frame {
        if self.frames.is_empty() {
            Frame::root()
        } else {
            Frame::savepoint(self.frames.len())
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }
}
