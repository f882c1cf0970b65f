//! Agent prompt assembly

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, VybesError};

/// Task description shipped inside every template workspace
pub const PROBLEM_FILE: &str = "problem.md";
/// Assembled prompt written into the workspace for the agent to re-read
pub const PROMPT_FILE: &str = "prompt.md";
/// Instructions shared by all evaluations, under the prompts directory
pub const SHARED_INSTRUCTIONS: &str = "shared/evaluation-instructions.md";

const SEPARATOR: &str = "\n\n";

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| VybesError::io_operation("read prompt input", path.display(), e))
}

/// Build the prompt from the problem template, the workspace's `problem.md`
/// and the shared instructions, separated by blank lines.
pub fn assemble(prompts_dir: &Path, prompt_file: &str, workspace: &Path) -> Result<String> {
    let parts = [
        read(&prompts_dir.join("problems").join(prompt_file))?,
        read(&workspace.join(PROBLEM_FILE))?,
        read(&prompts_dir.join(SHARED_INSTRUCTIONS))?,
    ];
    Ok(parts.join(SEPARATOR))
}

/// Write the prompt to `<workspace>/prompt.md`
pub fn write(workspace: &Path, prompt: &str) -> Result<PathBuf> {
    let path = workspace.join(PROMPT_FILE);
    fs::write(&path, prompt).map_err(|e| VybesError::io_operation("write", path.display(), e))?;
    Ok(path)
}
