//! # Orchestration Engine
//!
//! The dependency-graph task runner at the heart of the crate.
//!
//! ## Core Components
//!
//! - **Step**: a unit of work with dependencies, an optional skip condition, a
//!   timeout and a retry budget ([`step`])
//! - **Strand**: one workflow instance driving its steps in ready waves over a
//!   shared context ([`strand`], [`context`])
//! - **ViableStepDiscovery**: ready-set computation, graph validation and idle
//!   classification ([`viable_step_discovery`])
//! - **StrandsOrchestrator**: template registry, strand creation, execution and
//!   progress tracking ([`orchestrator`], [`registry`])
//!
//! The engine knows nothing about what steps do. Domain behaviour lives in step
//! actions such as the built-in compliance library in [`crate::steps`].

pub mod backoff;
pub mod context;
pub mod orchestrator;
pub mod registry;
pub mod step;
pub mod strand;
pub mod types;
pub mod viable_step_discovery;

pub use backoff::BackoffPolicy;
pub use context::{CancellationHandle, Collaborators, ContextMap, StepContext, StrandContext};
pub use orchestrator::{generate_strand_id, StrandsOrchestrator};
pub use registry::{StepBuilder, StrandTemplate, TemplateRegistry};
pub use step::{action_fn, FnAction, Step, StepAction, StepCondition, StepError};
pub use strand::{Strand, StrandProgress};
pub use types::{StepOutcome, StrandResult, StrandStatusSnapshot, TemplateArgs, TemplateInfo};
pub use viable_step_discovery::{
    classify_idle, find_retry_ready_steps, find_viable_steps, validate_graph, GraphViolation,
    IdleState,
};
