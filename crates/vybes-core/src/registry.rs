//! Lookup tables for agents, commands and evaluations
//!
//! Tables are read once from `<config_dir>` and never mutated afterwards.
//! Every lookup of an unknown name fails with [`VybesError::UnknownName`],
//! which carries the list of valid names.

pub mod types;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{NameKind, Result, VybesError};

pub use types::{
    AgentConfiguration, CliConfigFile, CommandDefinition, CommandRegistryFile, EvalConfigFile,
    EvaluationDefinition, ScoringOverride, CLI_CONFIG_FILE, COMMAND_REGISTRY_FILE,
    EVAL_CONFIG_FILE, EVAL_ROOT_PLACEHOLDER,
};

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| VybesError::config(path, format!("cannot read table: {}", e)))?;
    serde_json::from_str(&content).map_err(|e| VybesError::config(path, e))
}

/// Agent configurations and command definitions
#[derive(Debug, Clone, Default)]
pub struct ConfigurationRegistry {
    agents: BTreeMap<String, AgentConfiguration>,
    defaults: Vec<String>,
    commands: BTreeMap<String, CommandDefinition>,
}

impl ConfigurationRegistry {
    /// Load `cli-config.json` and `command-registry.json` from `config_dir`
    pub fn load(config_dir: &Path) -> Result<Self> {
        let cli: CliConfigFile = read_table(&config_dir.join(CLI_CONFIG_FILE))?;
        let commands: CommandRegistryFile = read_table(&config_dir.join(COMMAND_REGISTRY_FILE))?;
        let registry = Self::from_tables(cli, commands);
        debug!(
            agents = registry.agents.len(),
            commands = registry.commands.len(),
            "Loaded configuration registry"
        );
        Ok(registry)
    }

    /// Build from already-parsed tables
    pub fn from_tables(cli: CliConfigFile, commands: CommandRegistryFile) -> Self {
        let defaults = cli.default_configurations;
        let agents = cli
            .configurations
            .into_iter()
            .map(|(id, mut agent)| {
                agent.default_run = defaults.contains(&id);
                agent.id = id.clone();
                (id, agent)
            })
            .collect();
        let commands = commands
            .into_iter()
            .map(|(name, mut command)| {
                command.name = name.clone();
                (name, command)
            })
            .collect();

        Self {
            agents,
            defaults,
            commands,
        }
    }

    pub fn agent(&self, id: &str) -> Result<&AgentConfiguration> {
        self.agents
            .get(id)
            .ok_or_else(|| {
                VybesError::unknown_name(NameKind::AgentConfiguration, id, self.agents.keys())
            })
    }

    pub fn command(&self, name: &str) -> Result<&CommandDefinition> {
        self.commands
            .get(name)
            .ok_or_else(|| VybesError::unknown_name(NameKind::Command, name, self.commands.keys()))
    }

    /// All agent configuration ids, sorted
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Ids run when no configuration is selected, in table order
    pub fn default_agents(&self) -> &[String] {
        &self.defaults
    }

    /// All command names, sorted
    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }
}

/// The evaluation catalogue with paths resolved against the repository root
#[derive(Debug, Clone, Default)]
pub struct EvaluationRegistry {
    root: PathBuf,
    evaluations: BTreeMap<String, EvaluationDefinition>,
}

impl EvaluationRegistry {
    /// Load `eval-config.json` from `config_dir`, resolving paths against `root`
    pub fn load(config_dir: &Path, root: &Path) -> Result<Self> {
        let table: EvalConfigFile = read_table(&config_dir.join(EVAL_CONFIG_FILE))?;
        let registry = Self::from_table(table, root);
        debug!(evaluations = registry.evaluations.len(), "Loaded evaluation registry");
        Ok(registry)
    }

    pub fn from_table(table: EvalConfigFile, root: &Path) -> Self {
        let evaluations = table
            .evaluations
            .into_iter()
            .map(|(name, mut evaluation)| {
                evaluation.name = name.clone();
                evaluation.workspace = resolve_path(&evaluation.workspace, root);
                evaluation.grading = resolve_path(&evaluation.grading, root);
                (name, evaluation)
            })
            .collect();

        Self {
            root: root.to_path_buf(),
            evaluations,
        }
    }

    pub fn evaluation(&self, name: &str) -> Result<&EvaluationDefinition> {
        self.evaluations.get(name).ok_or_else(|| {
            VybesError::unknown_name(NameKind::Evaluation, name, self.evaluations.keys())
        })
    }

    /// All evaluation names, sorted
    pub fn evaluation_names(&self) -> Vec<String> {
        self.evaluations.keys().cloned().collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Substitute `${EVAL_ROOT}`; remaining relative paths are taken from `root`
pub fn resolve_path(stored: &Path, root: &Path) -> PathBuf {
    let text = stored.to_string_lossy();
    let substituted = PathBuf::from(text.replace(EVAL_ROOT_PLACEHOLDER, &root.to_string_lossy()));
    if substituted.is_absolute() {
        substituted
    } else {
        root.join(substituted)
    }
}
