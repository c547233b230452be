/// Language Runner - compile (optionally) and run staged code
///
/// **Process layer rules, shared by every strategy:**
/// - No shell: argv comes from the toolchain template, never from user text
/// - stdin is the staged input file handle, not a pipe fed by us
/// - Each child leads its own process group, killed as a whole once the step ends
/// - Every step runs under a wall-clock limit; on expiry the group is killed
/// - Captured output is capped; overflow kills the group
///
/// **Classification:**
/// - Compile step: non-zero exit or any stderr text → CompileError
/// - Run step: timeout → TimeoutError, non-zero exit → RuntimeError,
///   zero exit with stderr text → RuntimeError (stderr is never ignored)

use arbiter_common::types::FailureKind;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::{Strategy, Toolchain};
use crate::staging::Workspace;

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub run_timeout: Duration,
    pub compile_timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(10),
            compile_timeout: Duration::from_secs(30),
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Compile(String),
    #[error("{0}")]
    Runtime(String),
    #[error("Time limit exceeded: execution took longer than {0} ms")]
    Timeout(u128),
    /// Failures of the executor itself (staging I/O), not of the submitted code
    #[error("internal execution error: {0}")]
    Internal(#[from] io::Error),
}

impl RunError {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            RunError::Compile(_) => Some(FailureKind::Compile),
            RunError::Runtime(_) => Some(FailureKind::Runtime),
            RunError::Timeout(_) => Some(FailureKind::Timeout),
            RunError::Internal(_) => None,
        }
    }

    /// Strip the workspace location from user-facing diagnostics
    fn scrub(self, dir: &Path) -> Self {
        let prefix = format!("{}/", dir.display());
        let dir = dir.display().to_string();
        let clean = |text: String| text.replace(&prefix, "").replace(&dir, ".");
        match self {
            RunError::Compile(text) => RunError::Compile(clean(text)),
            RunError::Runtime(text) => RunError::Runtime(clean(text)),
            other => other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunError::Compile(_) => "compile_error",
            RunError::Runtime(_) => "runtime_error",
            RunError::Timeout(_) => "timeout",
            RunError::Internal(_) => "internal_error",
        }
    }
}

/// Raw result of one child process
#[derive(Debug)]
struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

#[derive(Debug)]
enum Outcome {
    Exited(ProcessOutput),
    TimedOut(Duration),
    OutputExceeded,
    /// The program itself could not be started (toolchain not installed)
    NotFound(String),
}

/// Compile (if the strategy needs it) and run the staged job.
///
/// Returns the program's stdout on success.
pub async fn execute(
    toolchain: &Toolchain,
    workspace: &Workspace,
    limits: &Limits,
) -> Result<String, RunError> {
    let source = workspace.source_path().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no source file staged")
    })?;
    let input = workspace.input_path().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no input file staged")
    })?;

    let run = match &toolchain.strategy {
        Strategy::Compiled { compile, run } => {
            let argv = expand(compile, source, workspace.dir());
            compile_step(&argv, toolchain, workspace.dir(), limits)
                .await
                .map_err(|e| e.scrub(workspace.dir()))?;
            run
        }
        Strategy::Interpreted { run } => run,
    };

    let argv = expand(run, source, workspace.dir());
    run_step(&argv, toolchain, workspace.dir(), input, limits)
        .await
        .map_err(|e| e.scrub(workspace.dir()))
}

async fn compile_step(
    argv: &[String],
    toolchain: &Toolchain,
    dir: &Path,
    limits: &Limits,
) -> Result<(), RunError> {
    let started = Instant::now();
    let outcome = run_process(
        argv,
        dir,
        None,
        &toolchain.unset_env,
        limits.compile_timeout,
        limits.max_output_bytes,
    )
    .await?;

    debug!(
        program = %argv[0],
        compile_ms = started.elapsed().as_millis() as u64,
        "Compile step finished"
    );

    match outcome {
        Outcome::Exited(out) => {
            if out.status.success() && out.stderr.trim().is_empty() {
                return Ok(());
            }
            let diagnostic = if !out.stderr.trim().is_empty() {
                out.stderr
            } else if !out.stdout.trim().is_empty() {
                out.stdout
            } else {
                format!("Compilation failed ({})", describe_status(&out.status))
            };
            Err(RunError::Compile(diagnostic))
        }
        Outcome::TimedOut(limit) => Err(RunError::Timeout(limit.as_millis())),
        Outcome::OutputExceeded => Err(RunError::Compile(
            "Compiler output limit exceeded".to_string(),
        )),
        Outcome::NotFound(program) => Err(RunError::Compile(format!(
            "Compiler '{}' is not installed on the execution host",
            program
        ))),
    }
}

async fn run_step(
    argv: &[String],
    toolchain: &Toolchain,
    dir: &Path,
    input: &Path,
    limits: &Limits,
) -> Result<String, RunError> {
    let outcome = run_process(
        argv,
        dir,
        Some(input),
        &toolchain.unset_env,
        limits.run_timeout,
        limits.max_output_bytes,
    )
    .await?;

    match outcome {
        Outcome::Exited(out) => {
            if !out.status.success() {
                if out.stderr.trim().is_empty() {
                    return Err(RunError::Runtime(format!(
                        "Process {}",
                        describe_status(&out.status)
                    )));
                }
                return Err(RunError::Runtime(out.stderr));
            }
            if !out.stderr.trim().is_empty() {
                return Err(RunError::Runtime(out.stderr));
            }
            Ok(out.stdout)
        }
        Outcome::TimedOut(limit) => Err(RunError::Timeout(limit.as_millis())),
        Outcome::OutputExceeded => Err(RunError::Runtime("Output limit exceeded".to_string())),
        Outcome::NotFound(program) => Err(RunError::Runtime(format!(
            "Runtime '{}' is not installed on the execution host",
            program
        ))),
    }
}

/// Substitute `{source}` and `{dir}` in a command template
fn expand(template: &[String], source: &Path, dir: &Path) -> Vec<String> {
    let source = source.to_string_lossy();
    let dir = dir.to_string_lossy();
    template
        .iter()
        .map(|part| part.replace("{source}", &source).replace("{dir}", &dir))
        .collect()
}

#[cfg(unix)]
fn describe_status(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with code {}", code),
        (None, Some(signal)) => format!("terminated by signal {}", signal),
        (None, None) => "terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {}", code),
        None => "terminated abnormally".to_string(),
    }
}

/// Spawn one child and wait for it under `timeout`.
///
/// Timeouts and output overflow kill the child before returning. Anything it
/// forked is killed with its process group on every path.
async fn run_process(
    argv: &[String],
    cwd: &Path,
    stdin: Option<&Path>,
    unset_env: &[String],
    timeout: Duration,
    max_output_bytes: usize,
) -> io::Result<Outcome> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

    let stdin = match stdin {
        Some(path) => Stdio::from(tokio::fs::File::open(path).await?.into_std().await),
        None => Stdio::null(),
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for key in unset_env {
        cmd.env_remove(key);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Outcome::NotFound(program.clone()));
        }
        Err(e) => return Err(e),
    };
    // Read before reaping, `id()` is gone afterwards
    let group = child.id();

    let collected = tokio::time::timeout(timeout, collect(&mut child, max_output_bytes)).await;

    match collected {
        Ok(Ok(Some(output))) => {
            // Background processes that outlived the program
            kill_group(group, program);
            Ok(Outcome::Exited(output))
        }
        Ok(Ok(None)) => {
            kill(&mut child, group, program).await;
            Ok(Outcome::OutputExceeded)
        }
        Ok(Err(e)) => {
            kill(&mut child, group, program).await;
            Err(e)
        }
        Err(_) => {
            kill(&mut child, group, program).await;
            Ok(Outcome::TimedOut(timeout))
        }
    }
}

async fn kill(child: &mut Child, group: Option<u32>, program: &str) {
    kill_group(group, program);
    if let Err(e) = child.kill().await {
        warn!(program = %program, error = %e, "Failed to kill child process");
    }
}

#[cfg(unix)]
fn kill_group(group: Option<u32>, program: &str) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers; a group that is already gone yields ESRCH
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(program = %program, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>, _program: &str) {}

/// Drain stdout/stderr and reap the child. `None` means a stream overflowed.
async fn collect(child: &mut Child, max_output_bytes: usize) -> io::Result<Option<ProcessOutput>> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // try_join so an overflowing stream stops the wait immediately
    let captured = tokio::try_join!(
        read_capped(stdout, max_output_bytes),
        read_capped(stderr, max_output_bytes),
    );
    let (stdout, stderr) = match captured {
        Ok(streams) => streams,
        Err(CaptureError::Overflow) => return Ok(None),
        Err(CaptureError::Io(e)) => return Err(e),
    };

    let status = child.wait().await?;

    Ok(Some(ProcessOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }))
}

enum CaptureError {
    Overflow,
    Io(io::Error),
}

async fn read_capped<R: AsyncRead + Unpin>(
    stream: Option<R>,
    max_bytes: usize,
) -> Result<Vec<u8>, CaptureError> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        (&mut stream)
            .take(max_bytes as u64 + 1)
            .read_to_end(&mut buf)
            .await
            .map_err(CaptureError::Io)?;
    }
    if buf.len() > max_bytes {
        return Err(CaptureError::Overflow);
    }
    Ok(buf)
}
