//! Declarative table record types
//!
//! Field names follow the camelCase JSON tables under `evals/config/`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Table of agent configurations (`cli-config.json`)
pub const CLI_CONFIG_FILE: &str = "cli-config.json";
/// Table of build/grade commands (`command-registry.json`)
pub const COMMAND_REGISTRY_FILE: &str = "command-registry.json";
/// Table of evaluations (`eval-config.json`)
pub const EVAL_CONFIG_FILE: &str = "eval-config.json";

/// Placeholder in stored evaluation paths replaced by the repository root
pub const EVAL_ROOT_PLACEHOLDER: &str = "${EVAL_ROOT}";

/// How to launch one agent under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfiguration {
    /// Table key; filled in on load
    #[serde(skip)]
    pub id: String,

    /// Executable to launch
    pub cli: String,

    /// Human-readable name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout in milliseconds
    pub timeout: u64,

    /// Whether the id appears in `defaultConfigurations`; filled in on load
    #[serde(skip)]
    pub default_run: bool,
}

impl AgentConfiguration {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

/// A named build or grade step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDefinition {
    /// Table key; filled in on load
    #[serde(skip)]
    pub name: String,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout in milliseconds
    pub timeout: u64,

    /// Stop the run's remaining steps when this one fails
    #[serde(default)]
    pub abort_on_failure: bool,
}

impl CommandDefinition {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// The command line as recorded in results
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Per-evaluation scoring parameters overriding the built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringOverride {
    pub multiplier: f64,
    pub time_limit_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// One task in the evaluation catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDefinition {
    /// Table key; filled in on load
    #[serde(skip)]
    pub name: String,

    /// Template workspace copied for every run
    pub workspace: PathBuf,

    /// Grading sandbox holding the hidden tests
    pub grading: PathBuf,

    /// Prompt fragment file name under `<prompts>/problems/`
    pub prompt: String,

    #[serde(default)]
    pub build_steps: Vec<String>,

    #[serde(default)]
    pub grade_steps: Vec<String>,

    #[serde(default, rename = "vybes", skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringOverride>,

    /// Explicit quality-gate step names; substring detection applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_gates: Option<Vec<String>>,
}

/// On-disk shape of `cli-config.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfigFile {
    #[serde(default)]
    pub configurations: BTreeMap<String, AgentConfiguration>,
    #[serde(default)]
    pub default_configurations: Vec<String>,
}

/// On-disk shape of `command-registry.json`
pub type CommandRegistryFile = BTreeMap<String, CommandDefinition>;

/// On-disk shape of `eval-config.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalConfigFile {
    #[serde(default)]
    pub evaluations: BTreeMap<String, EvaluationDefinition>,
}
