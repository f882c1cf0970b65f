//! In-memory run record and its `results.json` form

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VybesError};
use crate::process::{CommandResult, Termination};
use crate::scoring::ScoreRecord;

/// Result file written next to the archived workspace
pub const RESULTS_FILE: &str = "results.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pass,
    Fail,
}

/// One command as persisted in `results.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub name: String,
    pub command: String,
    pub cwd: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Milliseconds
    pub duration: u64,
    pub success: bool,
    pub termination: Termination,
}

impl From<&CommandResult> for CommandRecord {
    fn from(result: &CommandResult) -> Self {
        Self {
            name: result.name.clone(),
            command: result.command.clone(),
            cwd: result.cwd.display().to_string(),
            exit_code: result.exit_code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            duration: result.duration_ms(),
            success: result.success(),
            termination: result.termination,
        }
    }
}

/// On-disk shape of `results.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResultsFile {
    pub eval_name: String,
    pub config_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Milliseconds
    pub total_duration: u64,
    pub commands: Vec<CommandRecord>,
    pub workspace_archive: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vybes: Option<ScoreRecord>,
}

impl RunResultsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Everything that happened during one (evaluation, configuration) run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub eval_name: String,
    pub config_id: String,
    pub agent: CommandResult,
    pub build: Vec<CommandResult>,
    pub grade: Vec<CommandResult>,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_duration: Duration,
    /// `<outputs>/<eval>-<timestamp>/<config>`
    pub run_dir: PathBuf,
    pub archive_path: PathBuf,
    /// Step whose failure short-circuited the run
    pub aborted_by: Option<String>,
    pub score: Option<ScoreRecord>,
    pub repo_version: Option<String>,
}

impl RunRecord {
    pub fn status(&self) -> RunStatus {
        if self.success {
            RunStatus::Pass
        } else {
            RunStatus::Fail
        }
    }

    /// Agent first, then build steps, then grade steps
    pub fn commands(&self) -> impl Iterator<Item = &CommandResult> {
        std::iter::once(&self.agent)
            .chain(self.build.iter())
            .chain(self.grade.iter())
    }

    pub fn results_path(&self) -> PathBuf {
        self.run_dir.join(RESULTS_FILE)
    }

    pub fn to_results_file(&self) -> RunResultsFile {
        RunResultsFile {
            eval_name: self.eval_name.clone(),
            config_id: self.config_id.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status(),
            total_duration: u64::try_from(self.total_duration.as_millis()).unwrap_or(u64::MAX),
            commands: self.commands().map(CommandRecord::from).collect(),
            workspace_archive: self.archive_path.clone(),
            aborted_by: self.aborted_by.clone(),
            repo_version: self.repo_version.clone(),
            vybes: self.score.clone(),
        }
    }

    /// Write `<run_dir>/results.json`
    pub fn persist(&self) -> Result<PathBuf> {
        let path = self.results_path();
        let content = serde_json::to_string_pretty(&self.to_results_file())?;
        fs::write(&path, content).map_err(|e| VybesError::io_operation("write", path.display(), e))?;
        Ok(path)
    }
}

/// `<eval>-<timestamp>` with `:` and `.` replaced so the name is portable
pub fn run_dir_name(eval_name: &str, started_at: DateTime<Utc>) -> String {
    let stamp = started_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}-{}", eval_name, stamp)
}
