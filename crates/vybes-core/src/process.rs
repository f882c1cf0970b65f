//! Subprocess execution with captured output and a hard timeout
//!
//! Every invocation produces a [`CommandResult`]; nothing here returns an error.
//! Spawn failures, signal deaths and timeouts all collapse to exit code 1 so callers
//! only ever ask "did it succeed", while [`Termination`] keeps the actual cause.
//!
//! On unix each child leads its own process group. When the child exits or times out
//! the whole group is killed, so background processes it started cannot hold the
//! output pipes open or keep writing into the workspace.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Exit code reported for anything other than a normal process exit
pub const FAILURE_EXIT_CODE: i32 = 1;

/// How long to wait for output pipes to drain after the child is gone
const PIPE_GRACE: Duration = Duration::from_millis(500);

/// Why a process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The process exited on its own with a status code
    Exited,
    /// The process outlived its timeout and was killed
    TimedOut,
    /// The process was killed by a signal it did not ask for
    Signaled,
    /// The process could not be started or supervised
    SpawnFailed,
}

/// One subprocess invocation to perform
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Step or configuration name the invocation is recorded under
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    /// Bytes written to the child's stdin, which is then closed
    pub stdin: Option<String>,
}

impl ProcessRequest {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            timeout,
            stdin: None,
        }
    }

    /// Pipe the given text to the child's standard input
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// The command line as it is displayed and recorded
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Normalized outcome of one subprocess invocation
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub name: String,
    pub command: String,
    pub cwd: PathBuf,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub termination: Termination,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Runs external commands synchronously
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(
        skip(self, request),
        fields(name = %request.name, cwd = %request.cwd.display())
    )]
    pub fn run(&self, request: &ProcessRequest) -> CommandResult {
        let start = Instant::now();
        let command_line = request.display_command();
        debug!(command = %command_line, timeout = ?request.timeout, "spawn");

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.cwd)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command_line, error = %e, "Failed to spawn process");
                return CommandResult {
                    name: request.name.clone(),
                    command: command_line,
                    cwd: request.cwd.clone(),
                    exit_code: FAILURE_EXIT_CODE,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    duration: start.elapsed(),
                    termination: Termination::SpawnFailed,
                };
            }
        };

        // Feed stdin from its own thread so a child that fills its output pipes
        // before reading input cannot deadlock us.
        let stdin_thread = match (child.stdin.take(), request.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(thread::spawn(move || {
                let _ = pipe.write_all(input.as_bytes());
            })),
            _ => None,
        };
        let stdout_pipe = child.stdout.take().map(PipeReader::spawn);
        let stderr_pipe = child.stderr.take().map(PipeReader::spawn);

        let (exit_code, termination) = wait_with_timeout(&mut child, request.timeout);
        if termination == Termination::TimedOut {
            warn!(
                command = %command_line,
                timeout = ?request.timeout,
                "Process timed out and was killed"
            );
        }

        let stdout = PipeReader::collect(stdout_pipe);
        let stderr = PipeReader::collect(stderr_pipe);
        if let Some(handle) = stdin_thread {
            let _ = handle.join();
        }

        let duration = start.elapsed();
        debug!(exit_code, ?termination, elapsed = ?duration, "exit");

        CommandResult {
            name: request.name.clone(),
            command: command_line,
            cwd: request.cwd.clone(),
            exit_code,
            stdout,
            stderr,
            duration,
            termination,
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> (i32, Termination) {
    match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            kill_process_group(child);
            classify(status)
        }
        Ok(None) => {
            kill_process_group(child);
            let _ = child.kill();
            let _ = child.wait();
            (FAILURE_EXIT_CODE, Termination::TimedOut)
        }
        Err(e) => {
            warn!(error = %e, "Failed to wait for child process");
            kill_process_group(child);
            let _ = child.kill();
            let _ = child.wait();
            (FAILURE_EXIT_CODE, Termination::SpawnFailed)
        }
    }
}

/// Kill every process left in the child's group. ESRCH just means nothing is left.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid only signals the group led by our child.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        debug!(pgid, "Killed process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn classify(status: ExitStatus) -> (i32, Termination) {
    match status.code() {
        Some(code) => (code, Termination::Exited),
        None => (FAILURE_EXIT_CODE, Termination::Signaled),
    }
}

/// Drains one output pipe into a shared buffer as bytes arrive
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl PipeReader {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = channel();
        let shared = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match pipe.read(&mut buf) {
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Ok(0) | Err(_) => break,
                    Ok(n) => match shared.lock() {
                        Ok(mut output) => output.extend_from_slice(&buf[..n]),
                        Err(_) => break,
                    },
                }
            }
            let _ = done_tx.send(());
        });
        Self { buffer, done }
    }

    /// Wait up to [`PIPE_GRACE`] for end-of-file, then keep whatever was read.
    fn collect(reader: Option<Self>) -> String {
        let Some(reader) = reader else {
            return String::new();
        };
        let _ = reader.done.recv_timeout(PIPE_GRACE);
        let bytes = match reader.buffer.lock() {
            Ok(output) => output.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
