//! Per-invocation state machine.
//!
//! ```text
//! Idle -> Loading -> Transforming -> Serializing -> Done
//!   \________\____________\_______________\_____-> Failed
//! ```
//!
//! Calls on an already open document start at `Transforming`; calls that
//! only read or edit in memory finish from `Transforming` straight to
//! `Done`. `Done` and `Failed` are terminal.

use crate::error::{Error, ErrorKind};
use serde::Serialize;
use std::fmt;

/// Where an engine call is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvocationState {
    /// Not started
    Idle,
    /// Reading and parsing input
    Loading,
    /// Running an operator
    Transforming,
    /// Producing output bytes or files
    Serializing,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed {
        /// Error class
        kind: ErrorKind,
        /// Error message
        reason: String,
    },
}

impl InvocationState {
    /// True for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Done | InvocationState::Failed { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            InvocationState::Idle => 0,
            InvocationState::Loading => 1,
            InvocationState::Transforming => 2,
            InvocationState::Serializing => 3,
            InvocationState::Done | InvocationState::Failed { .. } => 4,
        }
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationState::Idle => write!(f, "idle"),
            InvocationState::Loading => write!(f, "loading"),
            InvocationState::Transforming => write!(f, "transforming"),
            InvocationState::Serializing => write!(f, "serializing"),
            InvocationState::Done => write!(f, "done"),
            InvocationState::Failed { kind, reason } => write!(f, "failed ({:?}): {}", kind, reason),
        }
    }
}

/// One engine call walking the state machine.
#[derive(Debug, Clone)]
pub struct Invocation {
    operation: &'static str,
    state: InvocationState,
}

impl Invocation {
    /// A new call in `Idle`.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            state: InvocationState::Idle,
        }
    }

    /// Operation name.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Current state.
    pub fn state(&self) -> &InvocationState {
        &self.state
    }

    /// Move forward to `next`.
    ///
    /// Stages may be skipped but never revisited, and nothing leaves a
    /// terminal state. Returns whether the transition happened.
    pub fn advance(&mut self, next: InvocationState) -> bool {
        let allowed = !self.state.is_terminal() && next.rank() > self.state.rank();
        if !allowed {
            log::warn!("{}: ignoring transition {} -> {}", self.operation, self.state, next);
            return false;
        }
        log::debug!("{}: {} -> {}", self.operation, self.state, next);
        self.state = next;
        true
    }

    /// Move to `Failed` with `error`.
    pub fn fail(&mut self, error: &Error) {
        self.advance(InvocationState::Failed {
            kind: error.kind(),
            reason: error.to_string(),
        });
    }

    /// Move to `Done` unless already terminal.
    pub fn finish(&mut self) {
        if !self.state.is_terminal() {
            self.advance(InvocationState::Done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_path() {
        let mut inv = Invocation::new("merge");
        for next in [
            InvocationState::Loading,
            InvocationState::Transforming,
            InvocationState::Serializing,
            InvocationState::Done,
        ] {
            assert!(inv.advance(next.clone()));
            assert_eq!(inv.state(), &next);
        }
        assert!(inv.state().is_terminal());
    }

    #[test]
    fn test_no_reentry() {
        let mut inv = Invocation::new("rotate");
        inv.advance(InvocationState::Transforming);
        assert!(!inv.advance(InvocationState::Loading));
        assert_eq!(inv.state(), &InvocationState::Transforming);
        inv.finish();
        assert_eq!(inv.state(), &InvocationState::Done);
        assert!(!inv.advance(InvocationState::Serializing));
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut inv = Invocation::new("decrypt");
        inv.advance(InvocationState::Transforming);
        inv.fail(&Error::InvalidPassword("wrong".into()));
        match inv.state() {
            InvocationState::Failed { kind, reason } => {
                assert_eq!(*kind, ErrorKind::InvalidPassword);
                assert!(reason.contains("wrong"));
            },
            other => panic!("unexpected state {}", other),
        }
        inv.finish();
        assert!(matches!(inv.state(), InvocationState::Failed { .. }));
    }
}
