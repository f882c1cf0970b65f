//! Single-run orchestration
//!
//! One run takes an (evaluation, agent configuration) pair through a fixed
//! sequence of phases, see [`RunPhase`]. The provisioned workspace is owned by a
//! drop guard, so it is removed on every exit path.

pub mod records;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{Result, VybesError};
use crate::process::{CommandResult, ProcessRequest, ProcessRunner};
use crate::prompt;
use crate::registry::{
    AgentConfiguration, CommandDefinition, ConfigurationRegistry, EvaluationDefinition,
    EvaluationRegistry,
};
use crate::scoring::{ScoreRecord, ScoringContext, ScoringEngine, RESULTS_DIR};
use crate::trace_time;
use crate::workspace::{copy_tree, CopyFilter, ProvisionedWorkspace, WorkspaceProvisioner, WORKSPACE_DIR};

pub use records::{run_dir_name, CommandRecord, RunRecord, RunResultsFile, RunStatus, RESULTS_FILE};

/// Lifecycle of a single run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Provisioned,
    PromptWritten,
    AgentExecuted,
    BuildStepsExecuted,
    SyncedForGrading,
    GradeStepsExecuted,
    Archived,
    Scored,
    Persisted,
    CleanedUp,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Provisioned => "provisioned",
            RunPhase::PromptWritten => "prompt_written",
            RunPhase::AgentExecuted => "agent_executed",
            RunPhase::BuildStepsExecuted => "build_steps_executed",
            RunPhase::SyncedForGrading => "synced_for_grading",
            RunPhase::GradeStepsExecuted => "grade_steps_executed",
            RunPhase::Archived => "archived",
            RunPhase::Scored => "scored",
            RunPhase::Persisted => "persisted",
            RunPhase::CleanedUp => "cleaned_up",
        };
        write!(f, "{}", name)
    }
}

/// Where prompt inputs are read from and run output is written to
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub prompts_dir: PathBuf,
    pub outputs_dir: PathBuf,
}

/// A resolved run: every name looked up before provisioning
#[derive(Clone, Copy)]
struct RunPlan<'p> {
    evaluation: &'p EvaluationDefinition,
    agent: &'p AgentConfiguration,
    build_steps: &'p [&'p CommandDefinition],
    grade_steps: &'p [&'p CommandDefinition],
    started_at: DateTime<Utc>,
    start: Instant,
}

/// Results of running a list of steps
struct StepOutcome {
    results: Vec<CommandResult>,
    aborted_by: Option<String>,
}

/// Executes one (evaluation, configuration) pair end to end
#[derive(Debug)]
pub struct RunOrchestrator<'a> {
    configurations: &'a ConfigurationRegistry,
    evaluations: &'a EvaluationRegistry,
    layout: RunLayout,
    runner: ProcessRunner,
    provisioner: WorkspaceProvisioner,
    scoring: ScoringEngine,
    repo_version: Option<String>,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(
        configurations: &'a ConfigurationRegistry,
        evaluations: &'a EvaluationRegistry,
        layout: RunLayout,
    ) -> Self {
        Self {
            configurations,
            evaluations,
            layout,
            runner: ProcessRunner::new(),
            provisioner: WorkspaceProvisioner::new(),
            scoring: ScoringEngine::new(),
            repo_version: None,
        }
    }

    /// Stamp every record and score with this repository version
    pub fn with_repo_version(mut self, version: impl Into<String>) -> Self {
        self.repo_version = Some(version.into());
        self
    }

    pub fn configurations(&self) -> &ConfigurationRegistry {
        self.configurations
    }

    pub fn evaluations(&self) -> &EvaluationRegistry {
        self.evaluations
    }

    /// Run, archive, score and persist one pair.
    ///
    /// Unknown names and step names fail before anything touches the disk.
    #[tracing::instrument(skip(self), fields(eval = %eval_name, config = %config_id))]
    pub fn run(&self, eval_name: &str, config_id: &str) -> Result<RunRecord> {
        let started_at = Utc::now();
        let start = Instant::now();

        let evaluation = self.evaluations.evaluation(eval_name)?;
        let agent = self.configurations.agent(config_id)?;
        let build_steps = self.resolve_steps(&evaluation.build_steps)?;
        let grade_steps = self.resolve_steps(&evaluation.grade_steps)?;

        info!("Starting run");
        let workspace = self.provisioner.provision(&evaluation.workspace)?;
        self.transition(RunPhase::Provisioned, workspace.path());

        let plan = RunPlan {
            evaluation,
            agent,
            build_steps: &build_steps,
            grade_steps: &grade_steps,
            started_at,
            start,
        };
        let record = self.execute(&plan, &workspace).and_then(|record| {
            let path = record.persist()?;
            self.transition(RunPhase::Persisted, &path);
            Ok(record)
        });

        let root = workspace.root().to_path_buf();
        workspace.cleanup();
        self.transition(RunPhase::CleanedUp, &root);
        trace_time!(start, "run", eval = eval_name, config = config_id);

        record
    }

    fn resolve_steps(&self, names: &[String]) -> Result<Vec<&'a CommandDefinition>> {
        names
            .iter()
            .map(|name| self.configurations.command(name))
            .collect()
    }

    fn transition(&self, phase: RunPhase, path: &Path) {
        info!(phase = %phase, path = %path.display(), "Run phase");
    }

    /// Everything between provisioning and persisting
    fn execute(&self, plan: &RunPlan<'_>, workspace: &ProvisionedWorkspace) -> Result<RunRecord> {
        let RunPlan {
            evaluation, agent, ..
        } = *plan;
        let prompt_text = prompt::assemble(&self.layout.prompts_dir, &evaluation.prompt, workspace.path())?;
        let prompt_path = prompt::write(workspace.path(), &prompt_text)?;
        self.transition(RunPhase::PromptWritten, &prompt_path);

        let agent_result = self.run_agent(agent, workspace.path(), prompt_text);
        self.transition(RunPhase::AgentExecuted, workspace.path());

        let build = self.run_steps(plan.build_steps, workspace.path());
        self.transition(RunPhase::BuildStepsExecuted, workspace.path());

        let grade = match &build.aborted_by {
            Some(step) => {
                warn!(step = %step, "Skipping grading after aborting step failed");
                StepOutcome {
                    results: Vec::new(),
                    aborted_by: None,
                }
            }
            None => {
                let synced = self
                    .provisioner
                    .sync_for_grading(workspace.path(), &evaluation.grading)?;
                self.transition(RunPhase::SyncedForGrading, &synced);
                let grade = self.run_steps(plan.grade_steps, &evaluation.grading);
                self.transition(RunPhase::GradeStepsExecuted, &evaluation.grading);
                grade
            }
        };
        let graded = build.aborted_by.is_none();
        let aborted_by = build.aborted_by.or(grade.aborted_by);

        let success = agent_result.success()
            && build.results.iter().all(CommandResult::success)
            && grade.results.iter().all(CommandResult::success)
            && aborted_by.is_none();

        let run_dir = self.create_run_dir(&evaluation.name, &agent.id, plan.started_at)?;
        let archive_path = self.provisioner.archive(workspace.path(), &run_dir)?;
        if graded {
            carry_grading_results(&evaluation.grading, &archive_path)?;
        }
        self.transition(RunPhase::Archived, &archive_path);

        let mut record = RunRecord {
            eval_name: evaluation.name.clone(),
            config_id: agent.id.clone(),
            agent: agent_result,
            build: build.results,
            grade: grade.results,
            success,
            started_at: plan.started_at,
            finished_at: Utc::now(),
            total_duration: plan.start.elapsed(),
            run_dir,
            archive_path,
            aborted_by,
            score: None,
            repo_version: self.repo_version.clone(),
        };
        record.score = self.score(evaluation, &record);
        self.transition(RunPhase::Scored, &record.archive_path);

        record.total_duration = plan.start.elapsed();
        record.finished_at = Utc::now();
        Ok(record)
    }

    fn run_agent(&self, agent: &AgentConfiguration, workspace: &Path, prompt: String) -> CommandResult {
        let request = ProcessRequest::new(&agent.id, &agent.cli, &agent.args, workspace, agent.timeout())
            .with_stdin(prompt);
        let result = self.runner.run(&request);
        if result.success() {
            info!(config = %agent.id, duration_ms = result.duration_ms(), "Agent completed");
        } else {
            warn!(
                config = %agent.id,
                exit_code = result.exit_code,
                termination = ?result.termination,
                "Agent failed"
            );
        }
        result
    }

    /// Run steps in order. A failing step does not stop the rest unless it is
    /// flagged `abortOnFailure`.
    fn run_steps(&self, steps: &[&CommandDefinition], cwd: &Path) -> StepOutcome {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            let request = ProcessRequest::new(&step.name, &step.command, &step.args, cwd, step.timeout());
            let result = self.runner.run(&request);
            let failed = !result.success();

            if failed {
                warn!(
                    step = %step.name,
                    exit_code = result.exit_code,
                    termination = ?result.termination,
                    "Step failed"
                );
            } else {
                info!(step = %step.name, duration_ms = result.duration_ms(), "Step passed");
            }
            results.push(result);

            if failed && step.abort_on_failure {
                warn!(step = %step.name, "Aborting remaining steps");
                return StepOutcome {
                    results,
                    aborted_by: Some(step.name.clone()),
                };
            }
        }

        StepOutcome {
            results,
            aborted_by: None,
        }
    }

    fn create_run_dir(
        &self,
        eval_name: &str,
        config_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let run_dir = self
            .layout
            .outputs_dir
            .join(run_dir_name(eval_name, started_at))
            .join(config_id);
        fs::create_dir_all(&run_dir)
            .map_err(|e| VybesError::io_operation("create", run_dir.display(), e))?;
        Ok(run_dir)
    }

    /// Scoring failures degrade to a record without a score
    fn score(&self, evaluation: &EvaluationDefinition, record: &RunRecord) -> Option<ScoreRecord> {
        let context = ScoringContext {
            eval_name: &record.eval_name,
            config_id: &record.config_id,
            scoring_override: evaluation.scoring.as_ref(),
            archive_path: &record.archive_path,
            agent: &record.agent,
            build: &record.build,
            grade: &record.grade,
            overall_success: record.success,
            quality_gates: evaluation.quality_gates.as_deref(),
        };

        match self.scoring.calculate(&context) {
            Ok(mut score) => {
                score.repo_version = self.repo_version.clone();
                info!(
                    final_score = score.final_score,
                    success = score.success_percentage,
                    penalty = score.time_penalty_multiplier,
                    "Vybes score"
                );
                Some(score)
            }
            Err(e) => {
                warn!(error = %e, "Failed to calculate vybes score");
                None
            }
        }
    }
}

/// Copy `<grading>/workspace/results` into `<archive>/results` when present
fn carry_grading_results(grading: &Path, archive_path: &Path) -> Result<()> {
    let source = grading.join(WORKSPACE_DIR).join(RESULTS_DIR);
    if !source.is_dir() {
        return Ok(());
    }
    let destination = archive_path.join(RESULTS_DIR);
    let files = copy_tree(&source, &destination, &CopyFilter::unfiltered())?;
    info!(destination = %destination.display(), files, "Copied grading results");
    Ok(())
}
