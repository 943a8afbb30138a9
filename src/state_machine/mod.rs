// State machine module for workflow orchestration
//
// Step and strand lifecycles expressed as pure transition tables, so that the
// drivers in `orchestration` can validate every move they make.

pub mod errors;
pub mod events;
pub mod states;
pub mod transitions;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{StepEvent, StrandEvent};
pub use states::{StepState, StrandState};
pub use transitions::{step_transition, strand_transition};
