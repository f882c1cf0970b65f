//! A throwaway evaluation repository whose agents and graders are `sh` scripts

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;
use vybes_core::registry::{ConfigurationRegistry, EvaluationRegistry};
use vybes_core::run::{RunLayout, RunOrchestrator};

pub const EVAL: &str = "base64-fix";
pub const PROMPT: &str = "Fix base64.\n\n# Base64\n\nShared rules.";

fn sh(script: &str) -> serde_json::Value {
    json!(["-c", script])
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fixture.write_tables();
        fixture.write_prompts();
        fixture.write_template();
        fixture.write_grading();
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join("evals/config")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.root().join("outputs")
    }

    pub fn template(&self) -> PathBuf {
        self.root().join("problems").join(EVAL).join("workspace")
    }

    pub fn grading(&self) -> PathBuf {
        self.root().join("grading").join(EVAL)
    }

    pub fn layout(&self) -> RunLayout {
        RunLayout {
            prompts_dir: self.root().join("prompts"),
            outputs_dir: self.outputs_dir(),
        }
    }

    pub fn registries(&self) -> (ConfigurationRegistry, EvaluationRegistry) {
        (
            ConfigurationRegistry::load(&self.config_dir()).unwrap(),
            EvaluationRegistry::load(&self.config_dir(), self.root()).unwrap(),
        )
    }

    pub fn orchestrator<'a>(
        &self,
        configurations: &'a ConfigurationRegistry,
        evaluations: &'a EvaluationRegistry,
    ) -> RunOrchestrator<'a> {
        RunOrchestrator::new(configurations, evaluations, self.layout()).with_repo_version("test-version")
    }

    /// Provisioning directories left next to the template
    pub fn leftover_workspaces(&self) -> Vec<PathBuf> {
        fs::read_dir(self.template().parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(".tmp-workspace-")
            })
            .collect()
    }

    fn write_tables(&self) {
        let cli = json!({
            "configurations": {
                "echo-agent": {
                    "cli": "sh",
                    "name": "Echo agent",
                    "args": sh("cat > received-prompt.txt && mkdir -p node_modules/cache && echo x > node_modules/cache/f"),
                    "timeout": 10000
                },
                "failing-agent": {
                    "cli": "sh",
                    "name": "Failing agent",
                    "args": sh("cat > /dev/null; exit 2"),
                    "timeout": 10000
                },
                "slow-agent": {
                    "cli": "sh",
                    "name": "Slow agent",
                    "args": sh("sleep 5"),
                    "timeout": 200
                }
            },
            "defaultConfigurations": ["echo-agent"]
        });

        let commands = json!({
            "build": { "command": "sh", "args": sh("mkdir -p dist && echo built > dist/app.js"), "timeout": 10000 },
            "lint": { "command": "sh", "args": sh("exit 0"), "timeout": 10000 },
            "lint-broken": { "command": "sh", "args": sh("echo 'lint errors' >&2; exit 1"), "timeout": 10000 },
            "install-broken": {
                "command": "sh",
                "args": sh("exit 1"),
                "timeout": 10000,
                "abortOnFailure": true
            },
            "grade": {
                "command": "sh",
                "args": sh("test -f workspace/dist/app.js && test ! -e workspace/node_modules && test ! -e workspace/coverage && mkdir -p workspace/results && cp expected.json workspace/results/core.json"),
                "timeout": 10000
            }
        });

        let evaluation = |build: &[&str]| {
            json!({
                "workspace": "${EVAL_ROOT}/problems/base64-fix/workspace",
                "grading": "${EVAL_ROOT}/grading/base64-fix",
                "prompt": "base64-fix.md",
                "buildSteps": build,
                "gradeSteps": ["grade"]
            })
        };
        let mut bad_scoring = evaluation(&["build", "lint"]);
        bad_scoring["vybes"] = json!({ "multiplier": 0, "timeLimitMinutes": 5 });
        let evals = json!({
            "evaluations": {
                "base64-fix": evaluation(&["build", "lint"]),
                "bad-scoring": bad_scoring,
                "lint-failure": evaluation(&["build", "lint-broken"]),
                "aborting": evaluation(&["install-broken", "build"]),
                "broken-steps": evaluation(&["missing-step"]),
                "missing-template": {
                    "workspace": "${EVAL_ROOT}/problems/absent/workspace",
                    "grading": "${EVAL_ROOT}/grading/absent",
                    "prompt": "base64-fix.md",
                    "buildSteps": [],
                    "gradeSteps": []
                }
            }
        });

        let dir = self.config_dir();
        write(&dir.join("cli-config.json"), &cli.to_string());
        write(&dir.join("command-registry.json"), &commands.to_string());
        write(&dir.join("eval-config.json"), &evals.to_string());
    }

    pub fn shared_instructions(&self) -> PathBuf {
        self.root().join("prompts/shared/evaluation-instructions.md")
    }

    fn write_prompts(&self) {
        let prompts = self.root().join("prompts");
        write(&prompts.join("problems/base64-fix.md"), "Fix base64.");
        write(&self.shared_instructions(), "Shared rules.");
    }

    fn write_template(&self) {
        let template = self.template();
        write(&template.join("problem.md"), "# Base64");
        write(&template.join("src/base64.ts"), "export const encode = () => '';");
        write(&template.join("node_modules/leftover/index.js"), "module.exports = {};");
        write(&template.join("coverage/lcov.info"), "TN:");
    }

    fn write_grading(&self) {
        write(
            &self.grading().join("expected.json"),
            r#"[{"taskId":"encode","passed":true},{"taskId":"decode","passed":true}]"#,
        );
    }
}
