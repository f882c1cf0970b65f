//! Vybes scoring
//!
//! A run's score is `base × success × penalty`:
//! - `base` is `100 × multiplier` for the task's complexity.
//! - `success` is the fraction of hidden subtasks passed. It drops to 0 when a
//!   lint or typecheck step failed.
//! - `penalty` rewards finishing inside the task's time limit and never goes
//!   below [`MIN_PENALTY`].
//!
//! Scoring is pure apart from reading the breakdown files out of the archive.

pub mod breakdown;
pub mod types;

use std::path::Path;

use tracing::debug;

use crate::error::{Result, VybesError};
use crate::process::CommandResult;
use crate::registry::ScoringOverride;

pub use breakdown::{collect_breakdown, RESULTS_DIR};
pub use types::{DefaultTask, ModuleTally, ScoreRecord, TaskBreakdown, TaskParameters};

/// Lowest time-penalty multiplier, also applied when no elapsed time was measured
pub const MIN_PENALTY: f64 = 0.2;

/// Error tag recorded when a quality gate failed
pub const QUALITY_GATE_ERROR: &str = "lint/typecheck failed";

/// Step name or command fragments that mark a quality gate when none are listed
const QUALITY_GATE_MARKERS: &[&str] = &["lint", "typecheck"];

/// Built-in task parameters, checked in order
pub const DEFAULT_TASKS: &[DefaultTask] = &[
    DefaultTask {
        key: "base64-fix",
        multiplier: 1.0,
        time_limit_minutes: 2.0,
        description: "Base64 encoder/decoder utilities",
        category: "utilities",
    },
    DefaultTask {
        key: "regex-challenge",
        multiplier: 3.0,
        time_limit_minutes: 6.0,
        description: "Regex validation and transformation toolkit",
        category: "utilities",
    },
    DefaultTask {
        key: "report-builder",
        multiplier: 4.0,
        time_limit_minutes: 8.0,
        description: "Spreadsheet to HTML report rendering",
        category: "integrations",
    },
    DefaultTask {
        key: "form-capture",
        multiplier: 5.0,
        time_limit_minutes: 10.0,
        description: "Full-stack contact form application",
        category: "full-stack",
    },
    DefaultTask {
        key: "pagination",
        multiplier: 5.0,
        time_limit_minutes: 10.0,
        description: "Server + client pagination repair",
        category: "full-stack",
    },
    DefaultTask {
        key: "react-evaluation",
        multiplier: 5.0,
        time_limit_minutes: 10.0,
        description: "Reactive programming primitives",
        category: "foundations",
    },
];

/// Parameters for evaluations matching no built-in key
pub const GENERIC_TASK: DefaultTask = DefaultTask {
    key: "general",
    multiplier: 3.0,
    time_limit_minutes: 6.0,
    description: "General evaluation task",
    category: "general",
};

/// Everything needed to score one finished run
#[derive(Debug, Clone)]
pub struct ScoringContext<'a> {
    pub eval_name: &'a str,
    pub config_id: &'a str,
    pub scoring_override: Option<&'a ScoringOverride>,
    /// Archived workspace; breakdowns are read from its `results/`
    pub archive_path: &'a Path,
    pub agent: &'a CommandResult,
    pub build: &'a [CommandResult],
    pub grade: &'a [CommandResult],
    pub overall_success: bool,
    /// Explicit quality-gate step names, if the evaluation lists them
    pub quality_gates: Option<&'a [String]>,
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Agent wall-clock time in minutes; zero when nothing usable was measured
pub fn elapsed_minutes(duration_ms: u64) -> f64 {
    let minutes = duration_ms as f64 / 60_000.0;
    if minutes.is_finite() && minutes > 0.0 {
        minutes
    } else {
        0.0
    }
}

/// `limit / elapsed` bounded to `[MIN_PENALTY, 1.0]`
pub fn time_penalty(elapsed_minutes: f64, limit_minutes: f64) -> f64 {
    if elapsed_minutes <= 0.0 || !elapsed_minutes.is_finite() {
        return MIN_PENALTY;
    }
    (limit_minutes / elapsed_minutes).clamp(MIN_PENALTY, 1.0)
}

/// Whether a step result counts as a lint/typecheck quality gate
pub fn is_quality_gate(result: &CommandResult, explicit: Option<&[String]>) -> bool {
    match explicit {
        Some(gates) => gates.iter().any(|gate| gate == &result.name),
        None => {
            let name = result.name.to_lowercase();
            let command = result.command.to_lowercase();
            QUALITY_GATE_MARKERS
                .iter()
                .any(|marker| name.contains(marker) || command.contains(marker))
        }
    }
}

/// Computes [`ScoreRecord`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Override if present, else the first built-in key contained in the
    /// lower-cased name, else the generic parameters.
    pub fn resolve_parameters(
        &self,
        eval_name: &str,
        scoring_override: Option<&ScoringOverride>,
    ) -> TaskParameters {
        if let Some(provided) = scoring_override {
            return provided.into();
        }

        let normalized = eval_name.to_lowercase();
        DEFAULT_TASKS
            .iter()
            .find(|task| normalized.contains(task.key))
            .unwrap_or(&GENERIC_TASK)
            .parameters()
    }

    pub fn calculate(&self, context: &ScoringContext<'_>) -> Result<ScoreRecord> {
        let params = self.resolve_parameters(context.eval_name, context.scoring_override);
        validate(&params)?;

        let base_score = 100.0 * params.multiplier;
        let breakdown = collect_breakdown(&context.archive_path.join(RESULTS_DIR));

        let mut success = if breakdown.subtasks_total > 0 {
            breakdown.subtasks_passed as f64 / breakdown.subtasks_total as f64
        } else if context.overall_success {
            1.0
        } else {
            0.0
        };

        let quality_failed = context
            .build
            .iter()
            .chain(context.grade)
            .any(|result| !result.success() && is_quality_gate(result, context.quality_gates));
        let error = if quality_failed {
            success = 0.0;
            Some(QUALITY_GATE_ERROR.to_string())
        } else {
            None
        };

        let actual_minutes = elapsed_minutes(context.agent.duration_ms());
        let penalty = time_penalty(actual_minutes, params.time_limit_minutes);
        let final_score = round_to(base_score * success * penalty, 2);

        debug!(
            eval = context.eval_name,
            config = context.config_id,
            success,
            penalty,
            final_score,
            "Calculated score"
        );

        Ok(ScoreRecord {
            task_name: context.eval_name.to_string(),
            config_id: context.config_id.to_string(),
            complexity_multiplier: params.multiplier,
            time_limit_minutes: params.time_limit_minutes,
            base_score,
            success_percentage: round_to(success, 4),
            time_penalty_multiplier: round_to(penalty, 4),
            final_score,
            actual_time_minutes: round_to(actual_minutes, 3),
            description: params.description,
            category: params.category,
            breakdown: Some(breakdown),
            error,
            repo_version: None,
        })
    }
}

/// A multiplier must be positive. A zero time limit is allowed and always lands on
/// the penalty floor.
fn validate(params: &TaskParameters) -> Result<()> {
    if !params.multiplier.is_finite() || params.multiplier <= 0.0 {
        return Err(VybesError::failed(
            "score run",
            format!("invalid complexity multiplier {}", params.multiplier),
        ));
    }
    if !params.time_limit_minutes.is_finite() || params.time_limit_minutes < 0.0 {
        return Err(VybesError::failed(
            "score run",
            format!("invalid time limit {} minutes", params.time_limit_minutes),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Termination;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    fn result(name: &str, command: &str, exit_code: i32, millis: u64) -> CommandResult {
        CommandResult {
            name: name.to_string(),
            command: command.to_string(),
            cwd: PathBuf::from("/tmp"),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(millis),
            termination: Termination::Exited,
        }
    }

    fn write_all_passing(archive: &Path, count: usize) {
        let results = archive.join(RESULTS_DIR);
        fs::create_dir_all(&results).unwrap();
        let entries: Vec<_> = (0..count)
            .map(|i| serde_json::json!({ "taskId": format!("task-{i}"), "passed": true }))
            .collect();
        fs::write(results.join("base64.json"), serde_json::to_string(&entries).unwrap()).unwrap();
    }

    fn score(
        eval_name: &str,
        archive: &Path,
        agent: &CommandResult,
        build: &[CommandResult],
        overall_success: bool,
    ) -> ScoreRecord {
        ScoringEngine::new()
            .calculate(&ScoringContext {
                eval_name,
                config_id: "test-config",
                scoring_override: None,
                archive_path: archive,
                agent,
                build,
                grade: &[],
                overall_success,
                quality_gates: None,
            })
            .unwrap()
    }

    #[test]
    fn test_fast_full_pass_scores_base() {
        let dir = tempdir().unwrap();
        write_all_passing(dir.path(), 12);
        let agent = result("agent", "llxprt", 0, 60_000);

        let record = score("base64-fix", dir.path(), &agent, &[], true);
        assert_eq!(record.success_percentage, 1.0);
        assert_eq!(record.time_penalty_multiplier, 1.0);
        assert_eq!(record.final_score, 100.0);
        assert_eq!(record.actual_time_minutes, 1.0);
        assert_eq!(record.category.as_deref(), Some("utilities"));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_slow_run_is_penalized() {
        let dir = tempdir().unwrap();
        write_all_passing(dir.path(), 12);
        let agent = result("agent", "llxprt", 0, 6 * 60_000);

        let record = score("base64-fix", dir.path(), &agent, &[], true);
        assert_eq!(record.time_penalty_multiplier, 0.3333);
        assert_eq!(record.final_score, 33.33);
    }

    #[test]
    fn test_failed_lint_zeroes_success() {
        let dir = tempdir().unwrap();
        write_all_passing(dir.path(), 12);
        let agent = result("agent", "llxprt", 0, 60_000);
        let build = [result("lint", "npm run lint", 1, 500)];

        let record = score("base64-fix", dir.path(), &agent, &build, false);
        assert_eq!(record.success_percentage, 0.0);
        assert_eq!(record.final_score, 0.0);
        assert_eq!(record.error.as_deref(), Some(QUALITY_GATE_ERROR));
        assert_eq!(record.breakdown.as_ref().unwrap().subtasks_passed, 12);
    }

    #[test]
    fn test_no_breakdown_uses_overall_success() {
        let dir = tempdir().unwrap();
        let agent = result("agent", "llxprt", 0, 60_000);

        let passed = score("base64-fix", dir.path(), &agent, &[], true);
        assert_eq!(passed.success_percentage, 1.0);
        assert_eq!(passed.breakdown, Some(TaskBreakdown::default()));

        let failed = score("base64-fix", dir.path(), &agent, &[], false);
        assert_eq!(failed.success_percentage, 0.0);
    }

    #[test]
    fn test_zero_elapsed_gets_minimum_penalty() {
        let dir = tempdir().unwrap();
        let agent = result("agent", "llxprt", 1, 0);

        let record = score("base64-fix", dir.path(), &agent, &[], true);
        assert_eq!(record.time_penalty_multiplier, MIN_PENALTY);
        assert_eq!(record.final_score, 20.0);
    }

    #[test]
    fn test_penalty_is_bounded_and_non_increasing() {
        let mut previous = f64::INFINITY;
        for seconds in (1..=3600).step_by(7) {
            let penalty = time_penalty(elapsed_minutes(seconds * 1000), 10.0);
            assert!((MIN_PENALTY..=1.0).contains(&penalty));
            assert!(penalty <= previous);
            previous = penalty;
        }
        assert_eq!(time_penalty(0.0, 10.0), MIN_PENALTY);
        assert_eq!(time_penalty(1000.0, 10.0), MIN_PENALTY);
    }

    #[test]
    fn test_elapsed_time_only_changes_penalty() {
        let dir = tempdir().unwrap();
        write_all_passing(dir.path(), 4);
        let quick = score("pagination", dir.path(), &result("agent", "a", 0, 5 * 60_000), &[], true);
        let slow = score("pagination", dir.path(), &result("agent", "a", 0, 40 * 60_000), &[], true);

        assert_eq!(quick.success_percentage, slow.success_percentage);
        assert_eq!(quick.base_score, slow.base_score);
        assert_eq!(slow.time_penalty_multiplier, 0.25);
        assert_eq!(
            slow.final_score,
            round_to(slow.base_score * slow.success_percentage * slow.time_penalty_multiplier, 2)
        );
        assert!(slow.final_score < quick.final_score);
    }

    #[test]
    fn test_parameter_resolution() {
        let engine = ScoringEngine::new();
        let params = engine.resolve_parameters("My-Regex-Challenge-v2", None);
        assert_eq!(params.multiplier, 3.0);
        assert_eq!(params.category.as_deref(), Some("utilities"));

        let generic = engine.resolve_parameters("unheard-of", None);
        assert_eq!(generic.multiplier, 3.0);
        assert_eq!(generic.time_limit_minutes, 6.0);
        assert_eq!(generic.description.as_deref(), Some("General evaluation task"));
        assert_eq!(generic.category.as_deref(), Some("general"));

        let provided = ScoringOverride {
            multiplier: 7.0,
            time_limit_minutes: 15.0,
            description: None,
            category: None,
        };
        let overridden = engine.resolve_parameters("base64-fix", Some(&provided));
        assert_eq!(overridden.multiplier, 7.0);
        assert!(overridden.category.is_none());
    }

    #[test]
    fn test_explicit_gates_replace_substring_detection() {
        let lint = result("lint", "npm run lint", 1, 10);
        let check = result("check-types", "tsc --noEmit", 1, 10);
        let gates = ["check-types".to_string()];

        assert!(is_quality_gate(&lint, None));
        assert!(!is_quality_gate(&check, None));
        assert!(!is_quality_gate(&lint, Some(&gates)));
        assert!(is_quality_gate(&check, Some(&gates)));
        assert!(is_quality_gate(&result("verify", "npm run TypeCheck", 1, 10), None));
    }

    fn score_with_override(provided: &ScoringOverride) -> Result<ScoreRecord> {
        let dir = tempdir().unwrap();
        let agent = result("agent", "a", 0, 60_000);
        ScoringEngine::new().calculate(&ScoringContext {
            eval_name: "x",
            config_id: "y",
            scoring_override: Some(provided),
            archive_path: dir.path(),
            agent: &agent,
            build: &[],
            grade: &[],
            overall_success: true,
            quality_gates: None,
        })
    }

    fn override_with(multiplier: f64, time_limit_minutes: f64) -> ScoringOverride {
        ScoringOverride {
            multiplier,
            time_limit_minutes,
            description: None,
            category: None,
        }
    }

    #[test]
    fn test_non_positive_multiplier_is_an_error() {
        let err = score_with_override(&override_with(0.0, 5.0)).unwrap_err();
        assert!(err.to_string().contains("invalid complexity multiplier"));

        let err = score_with_override(&override_with(-1.0, 5.0)).unwrap_err();
        assert!(err.to_string().contains("invalid complexity multiplier"));
    }

    #[test]
    fn test_negative_time_limit_is_an_error() {
        let err = score_with_override(&override_with(1.0, -1.0)).unwrap_err();
        assert!(err.to_string().contains("invalid time limit"));
    }

    #[test]
    fn test_zero_time_limit_scores_at_penalty_floor() {
        let record = score_with_override(&override_with(2.0, 0.0)).unwrap();
        assert_eq!(record.time_penalty_multiplier, MIN_PENALTY);
        assert_eq!(record.final_score, 40.0);
    }
}
