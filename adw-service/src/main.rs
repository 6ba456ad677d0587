//! ADW Service
//!
//! One binary, two jobs:
//! - `adw <pipeline> <issue> [run_id] [flags]` runs a pipeline to
//!   completion and maps the outcome to exit codes (0 success,
//!   1 phase failure, 2 usage error, 3 validation error).
//! - `adw serve` hosts the WebSocket hub that accepts trigger
//!   requests and fans out run broadcasts.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use adw_core::Config;
use adw_state::ModelSet;
use adw_web::{Hub, HubServer};
use adw_workflows::{lookup_pipeline, run_pipeline, PhaseContext, PhaseOptions};

mod exit {
    pub const SUCCESS: i32 = 0;
    pub const PHASE_FAILURE: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const VALIDATION: i32 = 3;
}

#[derive(Parser, Debug)]
#[command(name = "adw")]
#[command(about = "Agentic Development Workflow orchestrator")]
#[command(after_help = "\
PIPELINES:
    plan, patch, build, test, review, document, ship,
    plan_build, plan_build_test, plan_build_test_review, sdlc, sdlc_zte

Entry pipelines (plan, patch, plan_build, …, sdlc_zte) take an issue
number and mint a run id when none is given. Dependent pipelines
(build, test, review, document, ship) require both the issue number
and an existing run id.")]
struct Args {
    /// Pipeline to run, or "serve" to host the WebSocket hub
    pipeline: String,

    /// Issue number the run works against
    issue: Option<String>,

    /// Existing run id (required for dependent pipelines)
    run_id: Option<String>,

    /// Model tier for agent invocations
    #[arg(long, value_parser = parse_model_set, default_value = "base")]
    model_set: ModelSet,

    /// Skip browser end-to-end coverage (review/test)
    #[arg(long)]
    skip_e2e: bool,

    /// Skip the review blocker-resolution sub-loop
    #[arg(long)]
    skip_resolution: bool,

    /// Hub bind address (serve only; defaults to 127.0.0.1:$HUB_PORT)
    #[arg(long)]
    bind: Option<String>,
}

fn parse_model_set(s: &str) -> Result<ModelSet, String> {
    match s {
        "base" => Ok(ModelSet::Base),
        "heavy" => Ok(ModelSet::Heavy),
        other => Err(format!("expected base|heavy, got {other}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    adw_core::config::load_environment();

    let debug = adw_core::config::get_config_bool("DEBUG", false);
    let default_filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let args = Args::parse();
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(exit::USAGE);
        }
    };

    if args.pipeline == "serve" {
        return serve(config, args.bind).await;
    }

    std::process::exit(run(config, args).await);
}

/// Execute one pipeline run and map its outcome to an exit code.
async fn run(config: Config, args: Args) -> i32 {
    let Some(spec) = lookup_pipeline(&args.pipeline) else {
        eprintln!(
            "unknown pipeline: {} (expected one of: {})",
            args.pipeline,
            adw_workflows::pipeline_names().join(", ")
        );
        return exit::USAGE;
    };

    // Dependency requirements are an argv concern, before any work.
    if spec.entry && args.issue.is_none() && args.run_id.is_none() {
        eprintln!("pipeline {} requires an issue number", spec.name);
        return exit::USAGE;
    }
    if !spec.entry && args.run_id.is_none() {
        eprintln!("pipeline {} requires an existing run id", spec.name);
        return exit::USAGE;
    }

    let statestore = config.statestore_dir.clone();
    let ctx = PhaseContext::new(config);
    let opts = PhaseOptions {
        issue_number: args.issue.clone(),
        model_set: args.model_set,
        data_source: adw_state::DataSource::Forge,
        board_issue: None,
        skip_e2e: args.skip_e2e,
        skip_resolution: args.skip_resolution,
    };

    match run_pipeline(&ctx, spec.name, args.run_id.as_deref(), &opts).await {
        Ok(outcome) if outcome.success => {
            info!(run_id = %outcome.run_id, pipeline = %outcome.pipeline, "Pipeline succeeded");
            println!("{}", outcome.run_id);
            exit::SUCCESS
        }
        Ok(outcome) => {
            let code = match outcome.error() {
                Some(e) if e.is_validation() => exit::VALIDATION,
                _ => exit::PHASE_FAILURE,
            };
            if let Some(e) = outcome.error() {
                eprintln!("{e}");
            }
            eprintln!(
                "pipeline {} failed at phase {} (logs: {})",
                outcome.pipeline,
                outcome
                    .failed_phase()
                    .map(|p| p.name())
                    .unwrap_or("unknown"),
                statestore.join(&outcome.run_id).display()
            );
            code
        }
        Err(e) => {
            error!(error = %e, "Pipeline could not start");
            eprintln!("{e}");
            if e.is_validation() {
                exit::VALIDATION
            } else {
                exit::USAGE
            }
        }
    }
}

/// Host the notification hub until the process is stopped.
async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let addr: SocketAddr = match bind {
        Some(b) => b.parse()?,
        None => SocketAddr::from(([127, 0, 0, 1], config.hub_port)),
    };

    let ctx = PhaseContext::new(config);
    let hub = Hub::new(ctx);
    let server = HubServer::new(addr, Arc::clone(&hub));

    info!("Starting ADW hub");
    server.run().await?;
    Ok(())
}
