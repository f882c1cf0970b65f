//! Vybes Core Library
//!
//! Evaluation orchestration and scoring for autonomous coding agents: isolated
//! workspaces, supervised agent and grading processes, archived evidence and a
//! single comparable score per run.

pub mod batch;
pub mod error;
pub mod logging;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod run;
pub mod scoring;
pub mod settings;
pub mod version;
pub mod workspace;
