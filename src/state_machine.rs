//! Task lifecycle state machine.
//!
//! States: `Queued -> Processing -> {Completed, Failed}`, `Queued ->
//! Cancelled`. All other transitions, including any transition out of a
//! terminal state, are illegal.

use crate::models::TaskStatus;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("illegal transition from {from} via {event:?}")]
    IllegalTransition { from: TaskStatus, event: TaskEvent },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    StartProcessing,
    Complete,
    Fail,
    Cancel,
}

/// A pure function over `(TaskStatus, TaskEvent) -> TaskStatus` plus a
/// legality check, kept separate from any store so it can be unit
/// tested without a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Returns the resulting state if `event` is legal from `current`,
    /// or an error naming the illegal transition.
    pub fn apply(
        current: TaskStatus,
        event: TaskEvent,
    ) -> Result<TaskStatus, StateMachineError> {
        use TaskEvent::*;
        use TaskStatus::*;

        let next = match (current, event) {
            (Queued, StartProcessing) => Processing,
            (Queued, Cancel) => Cancelled,
            (Processing, Complete) => Completed,
            (Processing, Fail) => Failed,
            _ => {
                return Err(StateMachineError::IllegalTransition { from: current, event });
            }
        };
        Ok(next)
    }

    pub fn is_legal(current: TaskStatus, event: TaskEvent) -> bool {
        Self::apply(current, event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskEvent::*;
    use TaskStatus::*;

    #[test]
    fn queued_can_start_processing_or_cancel() {
        assert_eq!(TaskStateMachine::apply(Queued, StartProcessing), Ok(Processing));
        assert_eq!(TaskStateMachine::apply(Queued, Cancel), Ok(Cancelled));
    }

    #[test]
    fn processing_can_complete_or_fail() {
        assert_eq!(TaskStateMachine::apply(Processing, Complete), Ok(Completed));
        assert_eq!(TaskStateMachine::apply(Processing, Fail), Ok(Failed));
    }

    #[test]
    fn terminal_states_reject_every_event() {
        for terminal in [Completed, Failed, Cancelled] {
            for event in [StartProcessing, Complete, Fail, Cancel] {
                assert!(TaskStateMachine::apply(terminal, event).is_err());
            }
        }
    }

    #[test]
    fn processing_cannot_be_queued_or_cancelled() {
        assert!(TaskStateMachine::apply(Processing, Cancel).is_err());
    }

    #[test]
    fn queued_cannot_complete_or_fail_directly() {
        assert!(TaskStateMachine::apply(Queued, Complete).is_err());
        assert!(TaskStateMachine::apply(Queued, Fail).is_err());
    }

    #[test]
    fn is_legal_matches_apply() {
        assert!(TaskStateMachine::is_legal(Queued, StartProcessing));
        assert!(!TaskStateMachine::is_legal(Completed, StartProcessing));
    }
}
