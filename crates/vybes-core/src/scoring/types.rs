use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::ScoringOverride;

/// Complexity and time budget a task is scored against
#[derive(Debug, Clone, PartialEq)]
pub struct TaskParameters {
    pub multiplier: f64,
    pub time_limit_minutes: f64,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl From<&ScoringOverride> for TaskParameters {
    fn from(value: &ScoringOverride) -> Self {
        Self {
            multiplier: value.multiplier,
            time_limit_minutes: value.time_limit_minutes,
            description: value.description.clone(),
            category: value.category.clone(),
        }
    }
}

/// Built-in parameters matched by substring of the evaluation name
#[derive(Debug, Clone, Copy)]
pub struct DefaultTask {
    pub key: &'static str,
    pub multiplier: f64,
    pub time_limit_minutes: f64,
    pub description: &'static str,
    pub category: &'static str,
}

impl DefaultTask {
    pub fn parameters(&self) -> TaskParameters {
        TaskParameters {
            multiplier: self.multiplier,
            time_limit_minutes: self.time_limit_minutes,
            description: Some(self.description.to_string()),
            category: Some(self.category.to_string()),
        }
    }
}

/// Pass/fail tally for one results file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTally {
    pub passed: usize,
    pub total: usize,
    pub passed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
}

impl ModuleTally {
    pub fn record(&mut self, task_id: &str, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
            self.passed_tasks.push(task_id.to_string());
        } else {
            self.failed_tasks.push(task_id.to_string());
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// Subtask results aggregated across every results file of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBreakdown {
    pub subtasks_passed: usize,
    pub subtasks_total: usize,
    pub modules_completed: Vec<String>,
    pub modules_incomplete: Vec<String>,
    pub modules: BTreeMap<String, ModuleTally>,
}

/// The Vybes score of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub task_name: String,
    pub config_id: String,
    pub complexity_multiplier: f64,
    pub time_limit_minutes: f64,
    pub base_score: f64,
    /// Fraction of subtasks passed, 0..=1
    pub success_percentage: f64,
    pub time_penalty_multiplier: f64,
    pub final_score: f64,
    pub actual_time_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<TaskBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_version: Option<String>,
}
