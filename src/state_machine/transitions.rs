//! Pure transition tables for steps and strands.
//!
//! The step and strand drivers own their state and call these functions to move
//! it; nothing here performs side effects.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::{StepEvent, StrandEvent};
use super::states::{StepState, StrandState};

/// Determine the target step state for an event
pub fn step_transition(current: StepState, event: &StepEvent) -> StateMachineResult<StepState> {
    let target = match (current, event) {
        (StepState::Pending, StepEvent::Start) => StepState::Running,
        (StepState::Pending, StepEvent::Skip) => StepState::Skipped,
        (StepState::Running, StepEvent::Complete) => StepState::Completed,
        (StepState::Running, StepEvent::Fail(_)) => StepState::Failed,
        (StepState::Failed, StepEvent::Retry) => StepState::Pending,
        (from_state, _) => {
            return Err(StateMachineError::InvalidTransition {
                from: from_state.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

/// Determine the target strand state for an event
pub fn strand_transition(
    current: StrandState,
    event: &StrandEvent,
) -> StateMachineResult<StrandState> {
    let target = match (current, event) {
        (StrandState::Pending, StrandEvent::Start) => StrandState::Running,
        (StrandState::Running, StrandEvent::Complete) => StrandState::Completed,
        (StrandState::Running, StrandEvent::Fail(_)) => StrandState::Failed,
        (StrandState::Pending | StrandState::Running, StrandEvent::Cancel) => {
            StrandState::Cancelled
        }
        (from_state, _) => {
            return Err(StateMachineError::InvalidTransition {
                from: from_state.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lifecycle_transitions() {
        assert_eq!(
            step_transition(StepState::Pending, &StepEvent::Start).unwrap(),
            StepState::Running
        );
        assert_eq!(
            step_transition(StepState::Running, &StepEvent::Complete).unwrap(),
            StepState::Completed
        );
        assert_eq!(
            step_transition(StepState::Running, &StepEvent::fail_with_error("boom")).unwrap(),
            StepState::Failed
        );
        assert_eq!(
            step_transition(StepState::Failed, &StepEvent::Retry).unwrap(),
            StepState::Pending
        );
        assert_eq!(
            step_transition(StepState::Pending, &StepEvent::Skip).unwrap(),
            StepState::Skipped
        );
    }

    #[test]
    fn test_skipped_and_completed_are_final() {
        for event in [
            StepEvent::Start,
            StepEvent::Complete,
            StepEvent::Skip,
            StepEvent::Retry,
            StepEvent::fail_with_error("x"),
        ] {
            assert!(step_transition(StepState::Skipped, &event).is_err());
            assert!(step_transition(StepState::Completed, &event).is_err());
        }
    }

    #[test]
    fn test_step_cannot_skip_once_running() {
        let err = step_transition(StepState::Running, &StepEvent::Skip).unwrap_err();
        assert_eq!(
            err,
            StateMachineError::InvalidTransition {
                from: "running".to_string(),
                event: "skip".to_string(),
            }
        );
    }

    #[test]
    fn test_strand_transitions() {
        assert_eq!(
            strand_transition(StrandState::Pending, &StrandEvent::Start).unwrap(),
            StrandState::Running
        );
        assert_eq!(
            strand_transition(StrandState::Running, &StrandEvent::Complete).unwrap(),
            StrandState::Completed
        );
        assert_eq!(
            strand_transition(StrandState::Running, &StrandEvent::Fail("stuck".into())).unwrap(),
            StrandState::Failed
        );
        assert_eq!(
            strand_transition(StrandState::Pending, &StrandEvent::Cancel).unwrap(),
            StrandState::Cancelled
        );
        // A completed strand is never re-executed
        assert!(strand_transition(StrandState::Completed, &StrandEvent::Start).is_err());
        assert!(strand_transition(StrandState::Failed, &StrandEvent::Cancel).is_err());
    }
}
