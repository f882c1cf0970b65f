//! Default command: expand the selection and run the batch

use std::time::Instant;

use tracing::info;
use vybes_core::batch::{BatchCoordinator, BatchSelection};
use vybes_core::error::ExitCode;
use vybes_core::run::{RunLayout, RunOrchestrator};
use vybes_core::trace_time;
use vybes_core::version::resolve_version;

use super::dispatch::Context;
use crate::cli::Cli;

pub fn execute(cli: &Cli, context: &Context) -> ExitCode {
    let start = Instant::now();
    let selection = BatchSelection {
        evaluations: cli.eval.clone(),
        configurations: cli.config.clone(),
        quick: cli.quick,
    };

    let repo_version = resolve_version(&context.root);
    info!(version = %repo_version, "Resolved repository version");

    let layout = RunLayout {
        prompts_dir: context.settings.prompts_dir(&context.root),
        outputs_dir: context.settings.outputs_dir(&context.root),
    };
    let orchestrator = RunOrchestrator::new(&context.configurations, &context.evaluations, layout)
        .with_repo_version(repo_version);
    let coordinator = BatchCoordinator::new(orchestrator);

    let requests = coordinator.plan(&selection, &context.settings.quick_configuration);
    let mut evaluations: Vec<&str> = Vec::new();
    let mut configurations: Vec<&str> = Vec::new();
    for request in &requests {
        if !evaluations.contains(&request.eval_name.as_str()) {
            evaluations.push(&request.eval_name);
        }
        if !configurations.contains(&request.config_id.as_str()) {
            configurations.push(&request.config_id);
        }
    }

    println!("RUNNING EVALUATIONS");
    println!("  Evaluations: {}", evaluations.join(", "));
    println!("  Configurations: {}", configurations.join(", "));
    println!("  Total runs: {}", requests.len());
    println!();

    let summary = coordinator.run(&requests);
    print!("{}", summary);
    trace_time!(start, "batch");

    summary.exit_code()
}
