use assert_cmd::{cargo::cargo_bin_cmd, Command};
use serde_json::json;
use std::fs;
use std::path::Path;

pub fn vybes() -> Command {
    let mut cmd = cargo_bin_cmd!("vybes");
    cmd.env_remove("VYBES_ROOT").env_remove("RUST_LOG").env_remove("VYBES_LOG");
    cmd
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Lay out a minimal evaluation repository whose agents and graders are `sh` scripts
#[allow(dead_code)]
pub fn create_eval_repo(root: &Path) {
    let config = root.join("evals/config");
    write(
        &config.join("cli-config.json"),
        &json!({
            "configurations": {
                "echo-agent": {
                    "cli": "sh",
                    "name": "Echo agent",
                    "args": ["-c", "cat > received-prompt.txt"],
                    "timeout": 10000
                },
                "failing-agent": {
                    "cli": "sh",
                    "name": "Failing agent",
                    "args": ["-c", "cat > /dev/null; exit 1"],
                    "timeout": 10000
                }
            },
            "defaultConfigurations": ["echo-agent"]
        })
        .to_string(),
    );
    write(
        &config.join("command-registry.json"),
        &json!({
            "build": {
                "command": "sh",
                "args": ["-c", "mkdir -p dist && echo built > dist/app.js"],
                "timeout": 10000
            },
            "grade": {
                "command": "sh",
                "args": ["-c", "mkdir -p workspace/results && cp expected.json workspace/results/core.json"],
                "timeout": 10000
            }
        })
        .to_string(),
    );
    write(
        &config.join("eval-config.json"),
        &json!({
            "evaluations": {
                "base64-fix": {
                    "workspace": "${EVAL_ROOT}/problems/base64-fix/workspace",
                    "grading": "${EVAL_ROOT}/grading/base64-fix",
                    "prompt": "base64-fix.md",
                    "buildSteps": ["build"],
                    "gradeSteps": ["grade"]
                }
            }
        })
        .to_string(),
    );

    write(&root.join("prompts/problems/base64-fix.md"), "Fix base64.");
    write(&root.join("prompts/shared/evaluation-instructions.md"), "Shared rules.");
    write(&root.join("problems/base64-fix/workspace/problem.md"), "# Base64");
    write(
        &root.join("grading/base64-fix/expected.json"),
        r#"[{"taskId":"encode","passed":true}]"#,
    );
}
