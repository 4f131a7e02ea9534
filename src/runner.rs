//! Runner (§4.5): executes one compiled solution against one test case
//! under resource limits, producing a [`RunOutcome`].
//!
//! No sandbox beyond subprocess/process-group isolation is provided here
//! (see Non-goals) — memory limits are passed as best-effort hints to
//! runtimes whose command line accepts them (e.g. JVM heap sizing) and are
//! otherwise recorded but not enforced.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::languages::{Language, RecipeVars};

/// Interval between a graceful termination signal and a forced kill
/// after the deadline expires (§4.5, §9 glossary).
pub const GRACE_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum ExitKind {
    Normal(i32),
    Timeout,
    Signaled(i32),
    LaunchError(String),
}

#[derive(Debug, Clone)]
pub struct RunLimits {
    pub time_limit_ms: u64,
    pub memory_limit_mb: u32,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_kind: ExitKind,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    pub wall_elapsed_ms: u64,
    pub lean_elapsed_ms: u64,
}

/// Executes a build against one testcase under resource limits. A trait
/// so `runner.name` in the effective config can select among
/// implementations; the core ships one, subprocess-based.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        language: &Language,
        artifact_path: &Path,
        work_dir: &Path,
        input_path: &Path,
        output_path: &Path,
        limits: &RunLimits,
    ) -> RunOutcome;
}

/// Direct subprocess execution with no sandbox beyond process-group
/// isolation (see Non-goals).
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        SubprocessRunner
    }
}

#[async_trait]
impl Runner for SubprocessRunner {
    async fn run(
        &self,
        language: &Language,
        artifact_path: &Path,
        work_dir: &Path,
        input_path: &Path,
        output_path: &Path,
        limits: &RunLimits,
    ) -> RunOutcome {
        let vars = RecipeVars {
            artifact: artifact_path.to_string_lossy().to_string(),
            artifact_dir: work_dir.to_string_lossy().to_string(),
            source: artifact_path.to_string_lossy().to_string(),
            source_dir: work_dir.to_string_lossy().to_string(),
            input_file: input_path.to_string_lossy().to_string(),
            output_file: output_path.to_string_lossy().to_string(),
            memory_mb: limits.memory_limit_mb,
        };
        let (program, args) = language.run_recipe.instantiate(&vars);
        let recipe_mentions = |needle: &str| {
            language.run_recipe.program.contains(needle)
                || language.run_recipe.args.iter().any(|a| a.contains(needle))
        };
        let uses_input_file_var = recipe_mentions("{input_file}");
        let uses_output_file_var = recipe_mentions("{output_file}");

        let harness_start = Instant::now();

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if uses_input_file_var {
            command.stdin(Stdio::null());
        } else {
            command.stdin(Stdio::piped());
        }

        // Put the child in its own process group so a timeout can signal
        // the whole tree, not just the immediate child (interpreters like
        // the JVM commonly fork helpers of their own).
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
            });
        }

        let spawn_result = command.spawn();
        let mut child = match spawn_result {
            Ok(c) => c,
            Err(e) => {
                return RunOutcome {
                    exit_kind: ExitKind::LaunchError(e.to_string()),
                    stdout_path: None,
                    stderr_path: None,
                    wall_elapsed_ms: harness_start.elapsed().as_millis() as u64,
                    lean_elapsed_ms: 0,
                };
            }
        };
        let pid = child.id();

        let exec_start = Instant::now();

        if !uses_input_file_var {
            if let Some(mut stdin) = child.stdin.take() {
                match tokio::fs::read(input_path).await {
                    Ok(bytes) => {
                        if let Err(e) = stdin.write_all(&bytes).await {
                            debug!("failed to feed stdin to {:?}: {}", pid, e);
                        }
                    }
                    Err(e) => warn!("failed to read input file {:?}: {}", input_path, e),
                }
                drop(stdin);
            }
        }

        let deadline = Duration::from_millis(limits.time_limit_ms);
        let wait = tokio::time::timeout(deadline, child.wait_with_output()).await;

        let outcome = match wait {
            Ok(Ok(output)) => {
                let lean_elapsed_ms = exec_start.elapsed().as_millis() as u64;
                let stderr_path = output_path.with_extension("stderr");
                if !uses_output_file_var {
                    // The recipe communicates via stdin/stdout: the
                    // program's stdout *is* the actual output.
                    let _ = std::fs::write(output_path, &output.stdout);
                }
                let _ = std::fs::write(&stderr_path, &output.stderr);
                let stdout_path = output_path.to_path_buf();

                let exit_kind = exit_kind_from_status(&output.status);
                RunOutcome {
                    exit_kind,
                    stdout_path: Some(stdout_path),
                    stderr_path: Some(stderr_path),
                    wall_elapsed_ms: harness_start.elapsed().as_millis() as u64,
                    lean_elapsed_ms,
                }
            }
            Ok(Err(e)) => RunOutcome {
                exit_kind: ExitKind::LaunchError(e.to_string()),
                stdout_path: None,
                stderr_path: None,
                wall_elapsed_ms: harness_start.elapsed().as_millis() as u64,
                lean_elapsed_ms: 0,
            },
            Err(_) => {
                if let Some(pid) = pid {
                    terminate_tree(pid).await;
                }
                RunOutcome {
                    exit_kind: ExitKind::Timeout,
                    stdout_path: None,
                    stderr_path: None,
                    wall_elapsed_ms: harness_start.elapsed().as_millis() as u64,
                    lean_elapsed_ms: deadline.as_millis() as u64,
                }
            }
        };

        outcome
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn exit_kind_from_status(status: &std::process::ExitStatus) -> ExitKind {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
        ExitKind::Signaled(signal)
    } else {
        ExitKind::Normal(status.code().unwrap_or(-1))
    }
}

/// Graceful-then-forced termination of the process group rooted at `pid`.
async fn terminate_tree(pid: u32) {
    let group = Pid::from_raw(-(pid as i32));
    if let Err(e) = signal::kill(group, Signal::SIGTERM) {
        debug!("SIGTERM to process group {} failed: {}", pid, e);
    }
    tokio::time::sleep(GRACE_PERIOD).await;
    if let Err(e) = signal::kill(group, Signal::SIGKILL) {
        debug!("SIGKILL to process group {} failed (likely already dead): {}", pid, e);
    }
}
