//! Bounded execution of external tools (git, composer)
//!
//! Output is drained concurrently so a chatty child never blocks on a full pipe.
//! Anything past `max_output_bytes` is a hard failure instead of a silent
//! truncation, and an optional timeout kills runaway processes.

use crate::core::error::{ReleaseResult, ToolError};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default output buffer: 4 MiB per stream
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Resource bounds applied to every external invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
  pub max_output_bytes: usize,
  /// `None` waits indefinitely
  pub timeout: Option<Duration>,
}

impl Default for ProcessLimits {
  fn default() -> Self {
    Self {
      max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
      timeout: None,
    }
  }
}

/// How stderr output of a process that exited successfully is judged
#[derive(Debug, Clone, Copy)]
pub enum StderrPolicy {
  /// Every stderr line is an error unless it starts with one of these prefixes
  Strict(&'static [&'static str]),
  /// stderr is informational as a whole when it contains one of these markers
  Informational(&'static [&'static str]),
}

impl StderrPolicy {
  /// stderr left over after removing known informational output
  fn residual(&self, stderr: &str) -> String {
    match self {
      StderrPolicy::Strict(prefixes) => stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !prefixes.iter().any(|p| line.trim_start().starts_with(p)))
        .collect::<Vec<_>>()
        .join("\n"),
      StderrPolicy::Informational(markers) => {
        if markers.iter().any(|m| stderr.contains(m)) {
          String::new()
        } else {
          stderr.trim().to_string()
        }
      }
    }
  }
}

/// Render a command for logs and error messages
pub fn describe_command(cmd: &Command) -> String {
  let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
  parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
  parts.join(" ")
}

/// Run a command and return its stdout
///
/// Fails when the process cannot start, exits non-zero, times out, exceeds the
/// output buffer, or writes to stderr anything the policy does not excuse.
pub fn run_tool(mut cmd: Command, limits: &ProcessLimits, policy: StderrPolicy) -> ReleaseResult<String> {
  let command = describe_command(&cmd);
  cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

  debug!(command = %command, "spawning");
  let mut child = cmd.spawn().map_err(|e| ToolError::Spawn {
    command: command.clone(),
    reason: e.to_string(),
  })?;

  let stdout = child.stdout.take().ok_or_else(|| ToolError::Spawn {
    command: command.clone(),
    reason: "stdout was not piped".to_string(),
  })?;
  let stderr = child.stderr.take().ok_or_else(|| ToolError::Spawn {
    command: command.clone(),
    reason: "stderr was not piped".to_string(),
  })?;

  let limit = limits.max_output_bytes;
  let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
  let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

  let status = match limits.timeout {
    Some(timeout) => match child.wait_timeout(timeout)? {
      Some(status) => status,
      None => {
        warn!(command = %command, timeout_secs = timeout.as_secs(), "command timed out, killing");
        child.kill()?;
        child.wait()?;
        return Err(ToolError::TimedOut { command, timeout }.into());
      }
    },
    None => child.wait()?,
  };

  let (stdout, stdout_truncated) = join_output(stdout_handle, &command)?;
  let (stderr, stderr_truncated) = join_output(stderr_handle, &command)?;

  if stdout_truncated > 0 || stderr_truncated > 0 {
    return Err(ToolError::OutputTooLarge { command, limit }.into());
  }

  let stderr = String::from_utf8_lossy(&stderr).to_string();
  debug!(command = %command, exit_code = ?status.code(), "finished");

  if !status.success() {
    return Err(
      ToolError::Failed {
        command,
        status: status.code(),
        stderr,
      }
      .into(),
    );
  }

  let residual = policy.residual(&stderr);
  if !residual.is_empty() {
    return Err(
      ToolError::Failed {
        command,
        status: status.code(),
        stderr: residual,
      }
      .into(),
    );
  }

  Ok(String::from_utf8_lossy(&stdout).to_string())
}

fn join_output(
  handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
  command: &str,
) -> ReleaseResult<(Vec<u8>, usize)> {
  match handle.join() {
    Ok(result) => Ok(result?),
    Err(_) => Err(
      ToolError::Spawn {
        command: command.to_string(),
        reason: "output reader thread panicked".to_string(),
      }
      .into(),
    ),
  }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
  let mut buf = Vec::new();
  let mut truncated = 0usize;
  let mut chunk = [0u8; 8192];

  loop {
    let n = reader.read(&mut chunk)?;
    if n == 0 {
      break;
    }
    let remaining = limit.saturating_sub(buf.len());
    if remaining > 0 {
      let keep = n.min(remaining);
      buf.extend_from_slice(&chunk[..keep]);
      truncated += n.saturating_sub(keep);
    } else {
      truncated += n;
    }
  }

  Ok((buf, truncated))
}
