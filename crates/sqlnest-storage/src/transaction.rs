// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nested transaction scopes on a single SQLite connection.
//!
//! The outermost scope owns the real `BEGIN`/`COMMIT`/`ROLLBACK`; every scope
//! opened inside it becomes a savepoint, so a failing inner scope undoes only
//! its own writes and leaves its parents free to continue.
//!
//! Two entry points share one enter/exit protocol:
//!
//! - [`TransactionalConnection::transaction`] runs a closure and commits on
//!   `Ok`, rolls back on `Err`, returning the closure's error untouched.
//! - [`TransactionalConnection::begin`] returns a [`Scope`] guard. Dropping the
//!   guard without [`Scope::commit`] rolls the scope back, so early returns
//!   and panics never leave a frame open.
//!
//! ```no_run
//! use sqlnest_storage::{connect, ConnectOptions};
//!
//! # fn main() -> sqlnest_core::Result<()> {
//! let db = connect("app.db", &ConnectOptions::default())?;
//! db.transaction(|tx| -> sqlnest_core::Result<()> {
//!     tx.execute("INSERT INTO users (name) VALUES ('alice')", [])?;
//!     // Failure here rolls back the audit row only.
//!     let _ = tx.transaction(|tx| -> sqlnest_core::Result<()> {
//!         tx.execute("INSERT INTO audit (msg) VALUES ('created')", [])?;
//!         Ok(())
//!     });
//!     Ok(())
//! })
//! # }
//! ```

use std::borrow::Borrow;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;

use rusqlite::Connection;
use sqlnest_core::{Frame, FrameStack, Result, ScopeOutcome, SqlnestError};
use tracing::{error, trace, warn};

const ENTER: &str = "enter-scope";
const EXIT: &str = "exit-scope";

/// A SQLite connection with its transaction scope manager attached.
///
/// `C` is the way the connection is held: owned (the default) or borrowed
/// (`&mut Connection`, as handed out by the async facade's background
/// thread). The frame stack lives in a `RefCell`, which keeps the type
/// `Send` but not `Sync`: one connection, one owner, no cross-thread sharing.
///
/// Derefs to [`rusqlite::Connection`] for running statements. Only a shared
/// reference is exposed, so rusqlite's own `&mut self` transaction API cannot
/// be used to open transactions behind the manager's back.
pub struct TransactionalConnection<C = Connection> {
    conn: C,
    frames: RefCell<FrameStack>,
    /// Depths of scopes closed while deeper scopes were still open, ascending.
    abandoned: RefCell<Vec<usize>>,
}

impl<C: Borrow<Connection>> TransactionalConnection<C> {
    /// Attach a scope manager to a connection.
    ///
    /// The connection should be idle; a transaction already open on it is
    /// reported as an invariant violation by the first [`begin`](Self::begin).
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            frames: RefCell::new(FrameStack::new()),
            abandoned: RefCell::new(Vec::new()),
        }
    }

    pub fn connection(&self) -> &Connection {
        self.conn.borrow()
    }

    /// Detach the manager and return the underlying connection.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Number of currently open scopes.
    pub fn depth(&self) -> usize {
        self.frames.borrow().depth()
    }

    /// `true` when no scope is open.
    pub fn is_idle(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    /// The engine's own view: `true` while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.connection().is_autocommit()
    }

    /// Name of the innermost savepoint, `None` when idle or at the root.
    pub fn current_savepoint(&self) -> Option<String> {
        self.frames
            .borrow()
            .top()
            .and_then(Frame::name)
            .map(str::to_owned)
    }

    /// Open a scope: a transaction at depth zero, a savepoint otherwise.
    pub fn begin(&self) -> Result<Scope<'_, C>> {
        let depth = self.enter_scope()?;
        Ok(Scope {
            owner: self,
            depth,
            finished: false,
        })
    }

    /// Run `body` inside a scope.
    ///
    /// `Ok` releases the savepoint (or commits, at the outermost level). `Err`
    /// rolls the scope back and returns the body's error unchanged. If the
    /// rollback itself fails, that failure is returned instead, converted
    /// into `E`, since the connection state is then no longer what the body
    /// error implies; the body error is logged.
    pub fn transaction<T, E, F>(&self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<SqlnestError> + fmt::Debug,
    {
        let scope = self.begin()?;
        match body(self) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(body_err) => match scope.rollback() {
                Ok(()) => Err(body_err),
                Err(exit_err) => {
                    warn!(
                        body_error = ?body_err,
                        error = %exit_err,
                        "scope body failed and its rollback failed too"
                    );
                    Err(exit_err.into())
                }
            },
        }
    }

    fn enter_scope(&self) -> Result<usize> {
        let mut frames = self.frames.borrow_mut();
        let conn = self.connection();

        if frames.is_empty() == self.in_transaction() {
            return Err(SqlnestError::invariant(
                ENTER,
                format!(
                    "{} open frame(s) but engine transaction active = {}",
                    frames.depth(),
                    self.in_transaction()
                ),
            ));
        }

        let frame = frames.next_frame();
        let statement = frame.open_statement().to_string();
        let depth = frames.depth() + 1;
        trace!(depth, %statement, "entering scope");
        conn.execute_batch(&statement)?;
        frames.push(frame);

        if !self.in_transaction() {
            frames.pop();
            return Err(SqlnestError::invariant(
                ENTER,
                format!("`{statement}` left no active transaction"),
            ));
        }
        Ok(depth)
    }

    /// Close the scope opened at `depth`.
    ///
    /// A scope closed while deeper scopes are still open is reported as an
    /// invariant violation and remembered; it is rolled back as soon as the
    /// scopes above it have closed, so the stack always drains back to idle.
    fn exit_scope(&self, depth: usize, outcome: ScopeOutcome) -> Result<()> {
        let mut frames = self.frames.borrow_mut();
        let open = frames.depth();

        if depth != open {
            if depth < open {
                let mut abandoned = self.abandoned.borrow_mut();
                if !abandoned.contains(&depth) {
                    abandoned.push(depth);
                    abandoned.sort_unstable();
                }
            }
            return Err(SqlnestError::invariant(
                EXIT,
                format!("scope at depth {depth} closed while {open} scope(s) are open"),
            ));
        }

        let result = self.close_top(&mut frames, depth, outcome);
        self.close_abandoned(&mut frames);
        result
    }

    /// Pop and close the innermost frame.
    ///
    /// The frame is popped before its statement runs, so a failed COMMIT or
    /// RELEASE still closes the scope. A failed root COMMIT leaves SQLite
    /// inside the transaction; it is rolled back so that an empty stack keeps
    /// meaning an idle engine.
    fn close_top(&self, frames: &mut FrameStack, depth: usize, outcome: ScopeOutcome) -> Result<()> {
        let conn = self.connection();
        let frame = frames
            .pop()
            .ok_or_else(|| SqlnestError::invariant(EXIT, "no open scope to exit"))?;

        if !self.in_transaction() {
            return Err(SqlnestError::invariant(
                EXIT,
                format!("engine reports no active transaction at depth {depth}"),
            ));
        }

        let statement = frame.close_statement(outcome).to_string();
        trace!(depth, %statement, ?outcome, "exiting scope");
        if let Err(err) = conn.execute_batch(&statement) {
            if frame.is_root() && self.in_transaction() {
                warn!(error = %err, %statement, "root transaction did not close; rolling back");
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK TRANSACTION") {
                    error!(error = %rollback_err, "rollback after failed commit failed");
                }
            }
            return Err(err.into());
        }

        if let Some(cleanup) = frame.cleanup_statement(outcome) {
            let cleanup = cleanup.to_string();
            trace!(depth, statement = %cleanup, "releasing rolled-back savepoint");
            conn.execute_batch(&cleanup)?;
        }

        if self.in_transaction() != frame.engine_active_after_close() {
            return Err(SqlnestError::invariant(
                EXIT,
                format!(
                    "after `{statement}` engine transaction active = {}",
                    self.in_transaction()
                ),
            ));
        }
        Ok(())
    }

    /// Roll back scopes that were closed out of order and are now innermost.
    fn close_abandoned(&self, frames: &mut FrameStack) {
        let mut abandoned = self.abandoned.borrow_mut();
        loop {
            let depth = frames.depth();
            if depth == 0 || abandoned.last() != Some(&depth) {
                break;
            }
            abandoned.pop();
            warn!(depth, "rolling back scope that was closed out of order");
            if let Err(err) = self.close_top(frames, depth, ScopeOutcome::Failed) {
                error!(depth, error = %err, "rollback of out-of-order scope failed");
            }
        }
        if frames.is_empty() {
            abandoned.clear();
        }
    }
}

impl<C: Borrow<Connection>> Deref for TransactionalConnection<C> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection()
    }
}

impl<C> fmt::Debug for TransactionalConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalConnection")
            .field("frames", &self.frames)
            .field("abandoned", &self.abandoned)
            .finish_non_exhaustive()
    }
}

/// Guard for one open scope.
///
/// Call [`commit`](Self::commit) to release/commit. Dropping the guard
/// without completing it rolls the scope back; errors from that rollback can
/// only be logged.
#[must_use = "dropping a scope without calling `commit` rolls it back"]
pub struct Scope<'c, C: Borrow<Connection> = Connection> {
    owner: &'c TransactionalConnection<C>,
    depth: usize,
    finished: bool,
}

impl<C: Borrow<Connection>> Scope<'_, C> {
    /// Nesting level of this scope; the outermost scope is 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 1
    }

    /// Close normally: COMMIT at the root, RELEASE SAVEPOINT otherwise.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.owner.exit_scope(self.depth, ScopeOutcome::Normal)
    }

    /// Close as failed: ROLLBACK at the root, ROLLBACK TO SAVEPOINT otherwise.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.owner.exit_scope(self.depth, ScopeOutcome::Failed)
    }
}

impl<C: Borrow<Connection>> Drop for Scope<'_, C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(
            depth = self.depth,
            panicking = std::thread::panicking(),
            "scope dropped without commit; rolling back"
        );
        if let Err(err) = self.owner.exit_scope(self.depth, ScopeOutcome::Failed) {
            error!(depth = self.depth, error = %err, "rollback of dropped scope failed");
        }
    }
}

impl<C: Borrow<Connection>> fmt::Debug for Scope<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("depth", &self.depth)
            .field("finished", &self.finished)
            .finish()
    }
}
