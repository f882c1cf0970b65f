//! Workspace provisioning, grading sync and archiving
//!
//! All three copies go through [`copy_tree`] with a [`CopyFilter`]; they differ only
//! in the filter and the destination.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, VybesError};
use crate::trace_time;

/// Dependency caches regenerated by the grading pipeline itself
pub const DEPENDENCY_DIRS: &[&str] = &["node_modules"];
/// Coverage output regenerated by the grading pipeline itself
pub const COVERAGE_DIRS: &[&str] = &["coverage"];
/// Build output the agent produced
pub const BUILD_OUTPUT_DIRS: &[&str] = &["dist"];

/// Prefix for per-run temporary roots created next to a template
pub const TEMP_WORKSPACE_PREFIX: &str = ".tmp-workspace-";
/// Name of the workspace directory inside temporary roots, sandboxes and archives
pub const WORKSPACE_DIR: &str = "workspace";

/// Name-based pruning applied to directories and symlinks during a copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyFilter {
    excluded: Vec<String>,
    retain_build_output: bool,
}

impl CopyFilter {
    /// Copy everything
    pub fn unfiltered() -> Self {
        Self {
            excluded: Vec::new(),
            retain_build_output: true,
        }
    }

    /// Exclude the given directory names; build output is dropped unless retained
    pub fn excluding<I, S>(names: I, retain_build_output: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: names.into_iter().map(Into::into).collect(),
            retain_build_output,
        }
    }

    /// Filter used when syncing a finished workspace into its grading sandbox
    pub fn grading() -> Self {
        Self::excluding(DEPENDENCY_DIRS.iter().chain(COVERAGE_DIRS).copied(), true)
    }

    /// Filter used when archiving a workspace into permanent run storage.
    ///
    /// Always identical to [`CopyFilter::grading`].
    pub fn archive() -> Self {
        Self::grading()
    }

    /// Whether a directory with this name is skipped along with its subtree
    pub fn excludes(&self, name: &str) -> bool {
        if BUILD_OUTPUT_DIRS.contains(&name) {
            return !self.retain_build_output;
        }
        self.excluded.iter().any(|excluded| excluded == name)
    }

    /// Whether a walked entry is left out together with its subtree.
    ///
    /// Symlinks are judged by name like directories, so a linked `node_modules`
    /// never reaches a copy where its target may not exist.
    fn prunes(&self, entry: &DirEntry) -> bool {
        let file_type = entry.file_type();
        (file_type.is_dir() || file_type.is_symlink())
            && self.excludes(&entry.file_name().to_string_lossy())
    }
}

/// Recursively copy `src` into `dst`, pruning directories the filter excludes.
///
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, filter: &CopyFilter) -> Result<usize> {
    fs::create_dir_all(dst).map_err(|e| VybesError::io_operation("create", dst.display(), e))?;

    let mut copied = 0;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !filter.prunes(entry));

    for entry in walker {
        let entry = entry.map_err(|e| VybesError::io_operation("walk", src.display(), e))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| VybesError::io_operation("relativize", entry.path().display(), e))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| VybesError::io_operation("create", target.display(), e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            copied += 1;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| VybesError::io_operation("copy", entry.path().display(), e))?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link =
        fs::read_link(src).map_err(|e| VybesError::io_operation("read link", src.display(), e))?;
    std::os::unix::fs::symlink(&link, dst)
        .map_err(|e| VybesError::io_operation("link", dst.display(), e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| VybesError::io_operation("copy", src.display(), e))
}

/// Best-effort recursive delete; missing paths are fine
pub fn cleanup(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "Removed directory"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove directory"),
    }
}

/// A freshly provisioned run workspace.
///
/// Owns its temporary root: dropping the value deletes it, so the workspace is
/// removed on every exit path of a run, including early returns and panics.
#[derive(Debug)]
pub struct ProvisionedWorkspace {
    root: PathBuf,
    path: PathBuf,
    released: bool,
}

impl ProvisionedWorkspace {
    /// The workspace directory the agent works in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The unique temporary root containing the workspace
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete the temporary root now
    pub fn cleanup(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            cleanup(&self.root);
            self.released = true;
        }
    }
}

impl Drop for ProvisionedWorkspace {
    fn drop(&mut self) {
        self.release();
    }
}

/// Creates, syncs and archives run workspaces
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkspaceProvisioner;

impl WorkspaceProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// Copy a template into a new uniquely named directory next to it.
    ///
    /// The template is copied unfiltered: the agent sees lockfiles and any
    /// prebuilt artifacts the task ships with.
    #[tracing::instrument(skip(self, template), fields(template = %template.display()))]
    pub fn provision(&self, template: &Path) -> Result<ProvisionedWorkspace> {
        let start = Instant::now();
        if !template.is_dir() {
            return Err(VybesError::io_operation(
                "provision from",
                template.display(),
                "template workspace does not exist",
            ));
        }

        let parent = template.parent().unwrap_or_else(|| Path::new("."));
        let root = parent.join(format!("{}{}", TEMP_WORKSPACE_PREFIX, ulid::Ulid::new()));
        // create_dir (not create_dir_all) fails if the name is already taken
        fs::create_dir(&root).map_err(|e| VybesError::io_operation("create", root.display(), e))?;

        let workspace = ProvisionedWorkspace {
            path: root.join(WORKSPACE_DIR),
            root,
            released: false,
        };
        let files = copy_tree(template, workspace.path(), &CopyFilter::unfiltered())?;

        info!(workspace = %workspace.path().display(), files, "Provisioned workspace");
        trace_time!(start, "provision");
        Ok(workspace)
    }

    /// Replace the grading sandbox's workspace with a filtered copy of `workspace`.
    ///
    /// Must only run after every build step has finished.
    #[tracing::instrument(
        skip(self, workspace, grading_sandbox),
        fields(sandbox = %grading_sandbox.display())
    )]
    pub fn sync_for_grading(&self, workspace: &Path, grading_sandbox: &Path) -> Result<PathBuf> {
        let start = Instant::now();
        let target = grading_sandbox.join(WORKSPACE_DIR);
        if target.exists() {
            fs::remove_dir_all(&target)
                .map_err(|e| VybesError::io_operation("clear", target.display(), e))?;
        }

        let files = copy_tree(workspace, &target, &CopyFilter::grading())?;
        info!(target = %target.display(), files, "Synced workspace for grading");
        trace_time!(start, "sync_for_grading");
        Ok(target)
    }

    /// Copy `workspace` into `<run_dir>/workspace`, keeping build output
    #[tracing::instrument(skip(self, workspace, run_dir), fields(run_dir = %run_dir.display()))]
    pub fn archive(&self, workspace: &Path, run_dir: &Path) -> Result<PathBuf> {
        let start = Instant::now();
        let target = run_dir.join(WORKSPACE_DIR);
        let files = copy_tree(workspace, &target, &CopyFilter::archive())?;
        info!(archive = %target.display(), files, "Archived workspace");
        trace_time!(start, "archive");
        Ok(target)
    }

    /// Best-effort recursive delete; idempotent
    pub fn cleanup(&self, path: &Path) {
        cleanup(path);
    }
}
