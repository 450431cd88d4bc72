//! Progress reporting and cooperative cancellation.
//!
//! Operators check their [`Monitor`] between pages. A cancelled operation
//! returns [`Error::Cancelled`] before anything is committed.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Name of the running operation
    pub operation: &'static str,
    /// Steps finished
    pub completed: usize,
    /// Steps planned
    pub total: usize,
}

impl Progress {
    /// Percent complete, 100 when there is nothing to do.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}/{} ({}%)", self.operation, self.completed, self.total, self.percent())
    }
}

/// Callback receiving progress updates.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Progress sink and cancellation flag handed to every operator.
#[derive(Clone, Default)]
pub struct Monitor {
    operation: &'static str,
    callback: Option<ProgressCallback>,
    token: CancellationToken,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("operation", &self.operation)
            .field("callback", &self.callback.is_some())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl Monitor {
    /// A monitor that reports nowhere and is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send updates to `callback`.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Observe `token`.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Same sink and token, labelled with `operation`.
    pub fn for_operation(&self, operation: &'static str) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    /// The cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// `Cancelled` if cancellation was requested.
    pub fn check(&self, completed: usize, total: usize) -> Result<()> {
        if self.token.is_cancelled() {
            log::debug!("{} cancelled after {}/{}", self.operation, completed, total);
            return Err(Error::Cancelled { completed, total });
        }
        Ok(())
    }

    /// Report progress.
    pub fn report(&self, completed: usize, total: usize) {
        if let Some(cb) = &self.callback {
            cb(&Progress {
                operation: self.operation,
                completed,
                total,
            });
        }
    }

    /// Check for cancellation before step `completed`, then report it done
    /// once `step` succeeds.
    pub fn step<T>(&self, completed: usize, total: usize, step: impl FnOnce() -> Result<T>) -> Result<T> {
        self.check(completed, total)?;
        let out = step()?;
        self.report(completed + 1, total);
        Ok(out)
    }
}
