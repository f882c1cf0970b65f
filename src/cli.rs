//! CLI argument parsing for vybes

use clap::Parser;
use std::path::PathBuf;

/// Vybes - run AI coding agents against the evaluation catalogue and score them
#[derive(Parser, Debug)]
#[command(name = "vybes")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Evaluations to run: a comma-separated list or ALL
    #[arg(long = "eval", value_name = "LIST")]
    pub eval: Option<String>,

    /// Agent configurations to run: a comma-separated list or ALL
    #[arg(long = "config", value_name = "LIST")]
    pub config: Option<String>,

    /// Run only the quick configuration when no configuration is named
    #[arg(long)]
    pub quick: bool,

    /// Repository root holding evals/, prompts/, problems/ and grading/
    #[arg(long, env = "VYBES_ROOT")]
    pub root: Option<PathBuf>,

    /// List evaluations and configurations, then exit
    #[arg(long)]
    pub list: bool,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Log level or filter directives (e.g. "debug", "vybes_core=trace")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}
