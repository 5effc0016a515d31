//! Error types for the core state machines.
//!
//! The machines are total over their event inputs; errors exist only for
//! driver bugs (calling a lifecycle method from a state that cannot accept
//! it), so the error surface is deliberately small.

use thiserror::Error;

use crate::link::LinkState;

/// Errors from the link state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// A lifecycle method was called from a state that cannot accept it.
    #[error("invalid transition: cannot {operation} from {state:?}")]
    InvalidTransition {
        /// State when the call was made.
        state: LinkState,
        /// Operation that was attempted.
        operation: &'static str,
    },
}
