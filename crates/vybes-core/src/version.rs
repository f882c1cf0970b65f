//! Repository version label stamped into every run record

use std::path::Path;
use std::process::Command;

/// Label used when the directory is not a readable git checkout
pub const UNKNOWN_VERSION: &str = "unknown";

const FALLBACK_BRANCH: &str = "main";

/// Run `git -C <dir> <args>` and return trimmed stdout when it succeeds with output
fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").arg("-C").arg(dir).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// A detached HEAD or empty branch name is reported as `main`
fn branch_label(branch: Option<&str>) -> &str {
    match branch {
        Some(name) if !name.is_empty() && name != "HEAD" => name,
        _ => FALLBACK_BRANCH,
    }
}

/// Describe the checkout at `dir`.
///
/// Tries `git describe --tags --dirty`, then `<branch>@<short-hash>`, then
/// [`UNKNOWN_VERSION`]. Never fails.
pub fn resolve_version(dir: &Path) -> String {
    if let Some(described) = git(dir, &["describe", "--tags", "--dirty"]) {
        return described;
    }

    if let Some(hash) = git(dir, &["rev-parse", "--short", "HEAD"]) {
        let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]);
        return format!("{}@{}", branch_label(branch.as_deref()), hash);
    }

    UNKNOWN_VERSION.to_string()
}
