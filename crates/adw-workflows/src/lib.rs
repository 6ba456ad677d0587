//! ADW Workflows - Phase engine and pipeline composer
//!
//! A pipeline is an ordered list of phases; a phase is one atomic
//! step (plan, build, test, review, document, ship, patch). Entry
//! phases may create the run (state, ports, worktree, branch);
//! dependent phases validate the existing worktree and fail fast.
//! The composer executes serially and stops on the first failure.

pub mod context;
pub mod phase;
pub mod phases;
pub mod pipeline;

pub use context::PhaseContext;
pub use phase::{run_phase, Phase, PhaseOptions, PhaseResult};
pub use pipeline::{lookup_pipeline, pipeline_names, run_pipeline, PipelineOutcome, PipelineSpec};
