//! Command dispatch logic for vybes
use std::env;
use std::path::PathBuf;
use std::time::Instant;

use vybes_core::error::{ExitCode, Result, VybesError};
use vybes_core::registry::{ConfigurationRegistry, EvaluationRegistry};
use vybes_core::settings::VybesSettings;
use vybes_core::trace_time;

use crate::cli::Cli;
use crate::commands;

/// Everything loaded once per invocation
pub struct Context {
    pub root: PathBuf,
    pub settings: VybesSettings,
    pub configurations: ConfigurationRegistry,
    pub evaluations: EvaluationRegistry,
}

fn resolve_root(cli: &Cli) -> Result<PathBuf> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => env::current_dir()?,
    };
    if !root.is_dir() {
        return Err(VybesError::UsageError(format!(
            "root is not a directory: {}",
            root.display()
        )));
    }
    // Stored paths and run archives are reported as absolute paths
    Ok(root.canonicalize().unwrap_or(root))
}

fn load_context(cli: &Cli) -> Result<Context> {
    let root = resolve_root(cli)?;
    let settings = VybesSettings::load_or_default(&root);
    let config_dir = settings.config_dir(&root);
    let configurations = ConfigurationRegistry::load(&config_dir)?;
    let evaluations = EvaluationRegistry::load(&config_dir, &root)?;

    Ok(Context {
        root,
        settings,
        configurations,
        evaluations,
    })
}

pub fn run(cli: &Cli, start: Instant) -> Result<ExitCode> {
    let context = load_context(cli)?;
    trace_time!(start, "load_context");

    if cli.list {
        commands::list::execute(&context);
        return Ok(ExitCode::Success);
    }

    Ok(commands::run::execute(cli, &context))
}
