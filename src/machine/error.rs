//! Runtime usage errors.

use thiserror::Error;

/// Errors returned by [`StateMachine`](super::StateMachine) operations used
/// in the wrong lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("State machine is not running. Call .start() first")]
    NotRunning,

    #[error("State machine is already running")]
    AlreadyRunning,
}
