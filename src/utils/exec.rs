//! External command execution.
//!
//! Runs collaborator tools (bundler, minifier) with piped stdio, an optional
//! stdin payload, a wall-clock timeout and cooperative cancellation. A child
//! that outlives its deadline or whose run is cancelled gets killed, so no
//! run can hang on a tool that never returns.

use super::cancel::CancelToken;
use crate::log;
use regex::Regex;
use std::{
    ffi::OsString,
    io::{self, Read, Write},
    path::Path,
    process::{Child, Command, ExitStatus, Output, Stdio},
    sync::OnceLock,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use wait_timeout::ChildExt;

/// Longest stretch between cancellation checks while a child runs.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty command")]
    Empty,

    #[error("failed to execute `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("`{name}` did not finish within {}s", .timeout.as_secs())]
    Timeout { name: String, timeout: Duration },

    #[error("`{name}` was cancelled")]
    Cancelled { name: String },

    #[error("{0}")]
    Failed(String),

    #[error("lost track of `{name}`")]
    Wait {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Per-invocation settings.
#[derive(Default)]
pub struct ExecOptions<'a> {
    /// Working directory.
    pub root: Option<&'a Path>,
    /// Bytes fed to the child's stdin (stdin is null when `None`).
    pub stdin: Option<&'a [u8]>,
    /// Kill the child after this long.
    pub timeout: Option<Duration>,
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute `cmd` followed by `args` and capture its output.
///
/// # Errors
/// Spawn failure, non-zero exit, timeout or cancellation.
pub fn exec(
    cmd: &[String],
    args: &[OsString],
    options: &ExecOptions<'_>,
    cancel: &CancelToken,
) -> Result<Output, ExecError> {
    let (name, mut command) = prepare(options.root, cmd, args)?;

    if cancel.is_cancelled() {
        return Err(ExecError::Cancelled { name });
    }

    command
        .stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        name: name.clone(),
        source,
    })?;

    // Feed stdin from a helper thread: a child that fills its stdout pipe
    // before draining stdin would otherwise deadlock against us.
    let writer = match (child.stdin.take(), options.stdin) {
        (Some(mut pipe), Some(input)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || {
                // Broken pipe means the child exited early; its status tells the story.
                let _ = pipe.write_all(&input);
            }))
        }
        _ => None,
    };
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let status = wait_with_deadline(&mut child, &name, options.timeout, cancel)?;

    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let output = Output {
        status,
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    };

    log_output(&name, &output)?;
    Ok(output)
}

/// Wait for the child in short slices until it exits, the deadline passes,
/// or the run is cancelled.
fn wait_with_deadline(
    child: &mut Child,
    name: &str,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<ExitStatus, ExecError> {
    let started = Instant::now();

    loop {
        if cancel.is_cancelled() {
            kill(child);
            return Err(ExecError::Cancelled {
                name: name.to_owned(),
            });
        }

        let slice = match timeout {
            Some(timeout) => match timeout.checked_sub(started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => POLL_INTERVAL.min(remaining),
                _ => {
                    kill(child);
                    return Err(ExecError::Timeout {
                        name: name.to_owned(),
                        timeout,
                    });
                }
            },
            None => POLL_INTERVAL,
        };

        match child.wait_timeout(slice) {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(source) => {
                kill(child);
                return Err(ExecError::Wait {
                    name: name.to_owned(),
                    source,
                });
            }
        }
    }
}

fn kill(child: &mut Child) {
    child.kill().ok();
    child.wait().ok();
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).ok();
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Prepare a Command from components.
fn prepare(
    root: Option<&Path>,
    cmd: &[String],
    args: &[OsString],
) -> Result<(String, Command), ExecError> {
    let (program, rest) = cmd.split_first().ok_or(ExecError::Empty)?;

    let mut command = Command::new(program);
    command.args(rest).args(args);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((program.clone(), command))
}

// ============================================================================
// Output Handling
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ansi pattern"));
    re.replace_all(s, "")
}

/// Log stderr of a successful command, or turn a failed one into an error.
fn log_output(name: &str, output: &Output) -> Result<(), ExecError> {
    if !output.status.success() {
        return Err(ExecError::Failed(format_error(name, output)));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = strip_ansi(stderr.trim());
    let lines: Vec<_> = stderr.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
    if !lines.is_empty() {
        log!(name; "{}", lines.join("\n"));
    }
    Ok(())
}

fn format_error(name: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let error_msg = stderr.trim();

    let mut msg = format!("Command `{name}` failed with {}", output.status);
    if !error_msg.is_empty() {
        msg.push('\n');
        msg.push_str(&strip_ansi(error_msg));
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
