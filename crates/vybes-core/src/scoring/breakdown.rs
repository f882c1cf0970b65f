//! Reads per-module subtask results out of an archived workspace

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ModuleTally, TaskBreakdown};

/// Directory inside an archived workspace holding `<module>.json` files
pub const RESULTS_DIR: &str = "results";

/// Run result file name; never treated as a breakdown module
const RUN_RESULTS_FILE: &str = "results.json";

/// Tally one results file. `None` when the file is unreadable or not a JSON array.
fn read_module(path: &Path) -> Option<ModuleTally> {
    let content = fs::read_to_string(path)
        .map_err(|e| warn!(path = %path.display(), error = %e, "Skipping unreadable results file"))
        .ok()?;
    let parsed: Value = serde_json::from_str(&content)
        .map_err(|e| warn!(path = %path.display(), error = %e, "Skipping malformed results file"))
        .ok()?;
    let Value::Array(entries) = parsed else {
        warn!(path = %path.display(), "Skipping results file that is not an array");
        return None;
    };

    let mut tally = ModuleTally::default();
    for entry in &entries {
        let Some(task_id) = entry.get("taskId").and_then(Value::as_str) else {
            continue;
        };
        let passed = entry.get("passed").and_then(Value::as_bool).unwrap_or(false);
        tally.record(task_id, passed);
    }
    Some(tally)
}

/// Aggregate every `*.json` file under `results_dir`, in file name order.
///
/// A missing directory or one without any subtasks yields an empty breakdown.
pub fn collect_breakdown(results_dir: &Path) -> TaskBreakdown {
    let entries = match fs::read_dir(results_dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!(dir = %results_dir.display(), "No results directory");
            return TaskBreakdown::default();
        }
    };

    let mut files: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some("json")
                && path.file_name().and_then(|n| n.to_str()) != Some(RUN_RESULTS_FILE)
        })
        .collect();
    files.sort();

    let mut breakdown = TaskBreakdown::default();
    for path in files {
        let Some(module) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        if let Some(tally) = read_module(&path) {
            breakdown.subtasks_passed += tally.passed;
            breakdown.subtasks_total += tally.total;
            breakdown.modules.insert(module, tally);
        }
    }

    if breakdown.subtasks_total == 0 {
        return TaskBreakdown::default();
    }

    for (module, tally) in &breakdown.modules {
        if tally.total == 0 {
            continue;
        }
        if tally.is_complete() {
            breakdown.modules_completed.push(module.clone());
        } else {
            breakdown.modules_incomplete.push(module.clone());
        }
    }

    breakdown
}
