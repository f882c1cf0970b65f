//! Batch expansion and sequential execution
//!
//! A batch is the cross product of the selected evaluations and configurations,
//! evaluation-major. Runs execute one at a time; a run that errors is recorded
//! as fatal and the batch moves on.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::ExitCode;
use crate::registry::{ConfigurationRegistry, EvaluationRegistry};
use crate::run::{RunOrchestrator, RunRecord};

/// Selection keyword meaning "every name"
pub const SELECT_ALL: &str = "ALL";

/// What the user asked to run; `None` means "not given"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSelection {
    pub evaluations: Option<String>,
    pub configurations: Option<String>,
    pub quick: bool,
}

/// One (evaluation, configuration) pair to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub eval_name: String,
    pub config_id: String,
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn selects_all(value: Option<&str>) -> bool {
    matches!(value, None | Some(SELECT_ALL))
}

impl BatchSelection {
    /// Evaluation names to run
    pub fn evaluation_names(&self, evaluations: &EvaluationRegistry) -> Vec<String> {
        match self.evaluations.as_deref() {
            value if selects_all(value) => evaluations.evaluation_names(),
            Some(list) => split_list(list),
            None => Vec::new(),
        }
    }

    /// Configuration ids to run. `--quick` only matters when none were named.
    pub fn configuration_ids(
        &self,
        configurations: &ConfigurationRegistry,
        quick_configuration: &str,
    ) -> Vec<String> {
        match self.configurations.as_deref() {
            value if selects_all(value) => {
                if self.quick {
                    vec![quick_configuration.to_string()]
                } else {
                    configurations.default_agents().to_vec()
                }
            }
            Some(list) => split_list(list),
            None => Vec::new(),
        }
    }

    /// Cross product, evaluation-major. Names are not validated here; unknown
    /// names fail their own run.
    pub fn expand(
        &self,
        configurations: &ConfigurationRegistry,
        evaluations: &EvaluationRegistry,
        quick_configuration: &str,
    ) -> Vec<RunRequest> {
        let config_ids = self.configuration_ids(configurations, quick_configuration);
        self.evaluation_names(evaluations)
            .into_iter()
            .flat_map(|eval_name| {
                config_ids.iter().map(move |config_id| RunRequest {
                    eval_name: eval_name.clone(),
                    config_id: config_id.clone(),
                })
            })
            .collect()
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Pass,
    Fail,
    /// The run errored before producing a record
    Fatal(String),
}

/// Summary line for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub eval_name: String,
    pub config_id: String,
    pub status: OutcomeStatus,
    pub duration: Duration,
    pub final_score: Option<f64>,
    pub results_path: Option<PathBuf>,
}

impl RunOutcome {
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            eval_name: record.eval_name.clone(),
            config_id: record.config_id.clone(),
            status: if record.success {
                OutcomeStatus::Pass
            } else {
                OutcomeStatus::Fail
            },
            duration: record.total_duration,
            final_score: record.score.as_ref().map(|score| score.final_score),
            results_path: Some(record.results_path()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Pass
    }
}

/// Every outcome of a batch, in execution order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub outcomes: Vec<RunOutcome>,
}

impl BatchSummary {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Success when at least one run passed
    pub fn exit_code(&self) -> ExitCode {
        if self.success_count() > 0 {
            ExitCode::Success
        } else {
            ExitCode::Failure
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EVALUATION SUMMARY")?;
        writeln!(f, "  Successful: {}/{}", self.success_count(), self.total())?;
        for outcome in &self.outcomes {
            let label = match &outcome.status {
                OutcomeStatus::Pass => "[OK]",
                OutcomeStatus::Fail => "[ERROR]",
                OutcomeStatus::Fatal(_) => "[FATAL]",
            };
            write!(
                f,
                "  {} {} + {} ({}s)",
                label,
                outcome.eval_name,
                outcome.config_id,
                outcome.duration.as_secs_f64().round()
            )?;
            if let Some(score) = outcome.final_score {
                write!(f, " vybes {:.2}", score)?;
            }
            if let OutcomeStatus::Fatal(reason) = &outcome.status {
                write!(f, ": {}", reason)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Runs a batch strictly sequentially
#[derive(Debug)]
pub struct BatchCoordinator<'a> {
    orchestrator: RunOrchestrator<'a>,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(orchestrator: RunOrchestrator<'a>) -> Self {
        Self { orchestrator }
    }

    /// Expand a selection against the orchestrator's registries
    pub fn plan(&self, selection: &BatchSelection, quick_configuration: &str) -> Vec<RunRequest> {
        selection.expand(
            self.orchestrator.configurations(),
            self.orchestrator.evaluations(),
            quick_configuration,
        )
    }

    pub fn run(&self, requests: &[RunRequest]) -> BatchSummary {
        info!(runs = requests.len(), "Starting batch");
        let mut summary = BatchSummary::default();

        for request in requests {
            let start = Instant::now();
            let outcome = match self.orchestrator.run(&request.eval_name, &request.config_id) {
                Ok(record) => RunOutcome::from_record(&record),
                Err(e) => {
                    error!(
                        eval = %request.eval_name,
                        config = %request.config_id,
                        error_type = e.error_type(),
                        error = %e,
                        "Run failed"
                    );
                    RunOutcome {
                        eval_name: request.eval_name.clone(),
                        config_id: request.config_id.clone(),
                        status: OutcomeStatus::Fatal(e.to_string()),
                        duration: start.elapsed(),
                        final_score: None,
                        results_path: None,
                    }
                }
            };
            summary.outcomes.push(outcome);
        }

        info!(
            successful = summary.success_count(),
            total = summary.total(),
            "Batch finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CliConfigFile, CommandRegistryFile, EvalConfigFile};
    use std::path::Path;

    fn registries() -> (ConfigurationRegistry, EvaluationRegistry) {
        let cli: CliConfigFile = serde_json::from_str(
            r#"{
                "configurations": {
                    "a": { "cli": "a", "name": "A", "args": [], "timeout": 1000 },
                    "b": { "cli": "b", "name": "B", "args": [], "timeout": 1000 },
                    "c": { "cli": "c", "name": "C", "args": [], "timeout": 1000 }
                },
                "defaultConfigurations": ["b", "a"]
            }"#,
        )
        .unwrap();
        let evals: EvalConfigFile = serde_json::from_str(
            r#"{
                "evaluations": {
                    "pagination": { "workspace": "w", "grading": "g", "prompt": "p.md" },
                    "base64-fix": { "workspace": "w", "grading": "g", "prompt": "p.md" }
                }
            }"#,
        )
        .unwrap();
        (
            ConfigurationRegistry::from_tables(cli, CommandRegistryFile::new()),
            EvaluationRegistry::from_table(evals, Path::new("/repo")),
        )
    }

    fn pairs(requests: &[RunRequest]) -> Vec<(&str, &str)> {
        requests
            .iter()
            .map(|r| (r.eval_name.as_str(), r.config_id.as_str()))
            .collect()
    }

    #[test]
    fn test_default_selection_uses_all_evals_and_default_configs() {
        let (configs, evals) = registries();
        let requests = BatchSelection::default().expand(&configs, &evals, "quick");
        assert_eq!(
            pairs(&requests),
            [
                ("base64-fix", "b"),
                ("base64-fix", "a"),
                ("pagination", "b"),
                ("pagination", "a")
            ]
        );
    }

    #[test]
    fn test_quick_replaces_defaults_only_when_no_config_named() {
        let (configs, evals) = registries();
        let quick = BatchSelection {
            evaluations: Some("pagination".to_string()),
            configurations: Some(SELECT_ALL.to_string()),
            quick: true,
        };
        assert_eq!(pairs(&quick.expand(&configs, &evals, "q")), [("pagination", "q")]);

        let named = BatchSelection {
            configurations: Some("c, a".to_string()),
            ..quick
        };
        assert_eq!(
            pairs(&named.expand(&configs, &evals, "q")),
            [("pagination", "c"), ("pagination", "a")]
        );
    }

    #[test]
    fn test_unknown_names_pass_through_expansion() {
        let (configs, evals) = registries();
        let selection = BatchSelection {
            evaluations: Some("nope,base64-fix".to_string()),
            configurations: Some("a".to_string()),
            quick: false,
        };
        assert_eq!(
            pairs(&selection.expand(&configs, &evals, "q")),
            [("nope", "a"), ("base64-fix", "a")]
        );
    }

    #[test]
    fn test_exit_code_depends_on_any_success() {
        let outcome = |status| RunOutcome {
            eval_name: "e".to_string(),
            config_id: "c".to_string(),
            status,
            duration: Duration::from_secs(3),
            final_score: None,
            results_path: None,
        };

        let failed = BatchSummary {
            outcomes: vec![
                outcome(OutcomeStatus::Fail),
                outcome(OutcomeStatus::Fatal("boom".to_string())),
            ],
        };
        assert_eq!(failed.exit_code(), ExitCode::Failure);
        assert_eq!(BatchSummary::default().exit_code(), ExitCode::Failure);

        let mut mixed = failed.clone();
        mixed.outcomes.push(outcome(OutcomeStatus::Pass));
        assert_eq!(mixed.exit_code(), ExitCode::Success);
        assert_eq!(mixed.success_count(), 1);

        let rendered = mixed.to_string();
        assert!(rendered.contains("Successful: 1/3"));
        assert!(rendered.contains("[FATAL] e + c (3s): boom"));
        assert!(rendered.contains("[OK] e + c (3s)"));
    }
}
