//! Pipeline registry and composer
//!
//! Pipelines are named, ordered phase lists. Execution is serial and
//! stops on the first failing phase; retries live inside the agent
//! runner, never here. Entry pipelines may mint the run id; dependent
//! pipelines require an existing run with a worktree.

use tracing::{error, info};

use adw_core::{generate_run_id, is_valid_run_id, Error, Result};

use crate::context::PhaseContext;
use crate::phase::{run_phase, Phase, PhaseOptions, PhaseResult};

/// A registered pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineSpec {
    pub name: &'static str,
    pub phases: &'static [Phase],
    /// Entry pipelines may create the run (worktree, ports, branch)
    pub entry: bool,
    /// Zero-touch: merges and cleans up without human intervention
    pub auto_ship: bool,
}

pub const PIPELINES: &[PipelineSpec] = &[
    PipelineSpec {
        name: "plan",
        phases: &[Phase::Plan],
        entry: true,
        auto_ship: false,
    },
    PipelineSpec {
        name: "patch",
        phases: &[Phase::Patch],
        entry: true,
        auto_ship: false,
    },
    PipelineSpec {
        name: "build",
        phases: &[Phase::Build],
        entry: false,
        auto_ship: false,
    },
    PipelineSpec {
        name: "test",
        phases: &[Phase::Test],
        entry: false,
        auto_ship: false,
    },
    PipelineSpec {
        name: "review",
        phases: &[Phase::Review],
        entry: false,
        auto_ship: false,
    },
    PipelineSpec {
        name: "document",
        phases: &[Phase::Document],
        entry: false,
        auto_ship: false,
    },
    PipelineSpec {
        name: "ship",
        phases: &[Phase::Ship],
        entry: false,
        auto_ship: false,
    },
    PipelineSpec {
        name: "plan_build",
        phases: &[Phase::Plan, Phase::Build],
        entry: true,
        auto_ship: false,
    },
    PipelineSpec {
        name: "plan_build_test",
        phases: &[Phase::Plan, Phase::Build, Phase::Test],
        entry: true,
        auto_ship: false,
    },
    PipelineSpec {
        name: "plan_build_test_review",
        phases: &[Phase::Plan, Phase::Build, Phase::Test, Phase::Review],
        entry: true,
        auto_ship: false,
    },
    PipelineSpec {
        name: "sdlc",
        phases: &[
            Phase::Plan,
            Phase::Build,
            Phase::Test,
            Phase::Review,
            Phase::Document,
        ],
        entry: true,
        auto_ship: false,
    },
    PipelineSpec {
        name: "sdlc_zte",
        phases: &[
            Phase::Plan,
            Phase::Build,
            Phase::Test,
            Phase::Review,
            Phase::Document,
            Phase::Ship,
        ],
        entry: true,
        auto_ship: true,
    },
];

pub fn lookup_pipeline(name: &str) -> Option<&'static PipelineSpec> {
    PIPELINES.iter().find(|spec| spec.name == name)
}

pub fn pipeline_names() -> Vec<&'static str> {
    PIPELINES.iter().map(|spec| spec.name).collect()
}

/// Result of a whole pipeline execution
#[derive(Debug)]
pub struct PipelineOutcome {
    pub pipeline: &'static str,
    pub run_id: String,
    pub success: bool,
    pub results: Vec<PhaseResult>,
}

impl PipelineOutcome {
    pub fn failed_phase(&self) -> Option<Phase> {
        self.results
            .iter()
            .find(|result| !result.success)
            .map(|result| result.phase)
    }

    /// The terminal error, when the pipeline failed.
    pub fn error(&self) -> Option<&Error> {
        self.results
            .iter()
            .find_map(|result| result.error.as_ref())
    }
}

/// Resolve (or mint) the run id a pipeline will execute under.
pub fn resolve_run_id(spec: &PipelineSpec, run_id: Option<&str>) -> Result<String> {
    match run_id {
        Some(id) => {
            if !is_valid_run_id(id) {
                return Err(Error::config(format!("invalid run id: {id:?}")));
            }
            Ok(id.to_string())
        }
        None if spec.entry => Ok(generate_run_id()),
        None => Err(Error::config(format!(
            "pipeline {} requires an existing run id",
            spec.name
        ))),
    }
}

/// Execute a named pipeline. Phases run strictly in order; the first
/// non-success halts the pipeline and the overall status is failed.
pub async fn run_pipeline(
    ctx: &PhaseContext,
    name: &str,
    run_id: Option<&str>,
    opts: &PhaseOptions,
) -> Result<PipelineOutcome> {
    let spec = lookup_pipeline(name)
        .ok_or_else(|| Error::config(format!("unknown pipeline: {name}")))?;
    let run_id = resolve_run_id(spec, run_id)?;

    info!(pipeline = %spec.name, run_id = %run_id, "Starting pipeline");

    let mut results = Vec::with_capacity(spec.phases.len());
    let mut success = true;
    for phase in spec.phases {
        let result = run_phase(ctx, *phase, &run_id, opts).await;
        let phase_ok = result.success;
        results.push(result);
        if !phase_ok {
            success = false;
            error!(
                pipeline = %spec.name,
                run_id = %run_id,
                phase = %phase,
                "Pipeline halted on phase failure"
            );
            break;
        }
    }

    info!(
        pipeline = %spec.name,
        run_id = %run_id,
        success = success,
        "Pipeline finished"
    );
    Ok(PipelineOutcome {
        pipeline: spec.name,
        run_id,
        success,
        results,
    })
}
