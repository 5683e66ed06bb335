//! Process execution for command tasks.
//!
//! Commands run through the platform shell in the project root with the
//! caller's environment. Standard output and standard error are captured
//! together, line by line in arrival order; the streaming variant also hands
//! each line to a callback while the process runs.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::types::TaskError;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
  /// Exit code, `None` when the process was terminated by a signal.
  pub code: Option<i32>,

  /// Combined stdout and stderr.
  pub output: String,
}

impl CmdOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Run a command and capture its combined output.
///
/// A nonzero exit is not an error here; inspect [`CmdOutput::success`].
/// Only failing to spawn or read from the process is.
pub async fn run_cmd(cmd: &str, cwd: &Path, shell: Option<&str>) -> Result<CmdOutput, TaskError> {
  run_cmd_streaming(cmd, cwd, shell, |_| {}).await
}

/// Run a command, forwarding each output line to `on_line` as it arrives.
pub async fn run_cmd_streaming(
  cmd: &str,
  cwd: &Path,
  shell: Option<&str>,
  mut on_line: impl FnMut(&str),
) -> Result<CmdOutput, TaskError> {
  let (shell_cmd, shell_args) = get_shell(shell);
  debug!(cmd = %cmd, shell = %shell_cmd, cwd = %cwd.display(), "spawning process");

  let spawn_err = |source| TaskError::Process {
    cmd: cmd.to_string(),
    source,
  };

  let mut child = Command::new(&shell_cmd)
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(spawn_err)?;

  let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
    return Err(spawn_err(std::io::Error::other("process pipes unavailable")));
  };
  let mut stdout = BufReader::new(stdout);
  let mut stderr = BufReader::new(stderr);
  let mut out_buf = Vec::new();
  let mut err_buf = Vec::new();
  let (mut out_done, mut err_done) = (false, false);
  let mut output = String::new();

  let mut emit = |buf: &mut Vec<u8>| {
    let text = String::from_utf8_lossy(buf);
    let line = text.trim_end_matches(['\n', '\r']);
    on_line(line);
    output.push_str(line);
    output.push('\n');
    buf.clear();
  };

  // read_until keeps partial reads in the buffer, so losing the race in
  // select! does not drop data. A buffer only holds a complete line once it
  // ends in a newline; whatever remains at end of stream is the unterminated
  // last line.
  while !(out_done && err_done) {
    tokio::select! {
      read = stdout.read_until(b'\n', &mut out_buf), if !out_done => {
        let eof = read.map_err(spawn_err)? == 0;
        if eof || out_buf.ends_with(b"\n") {
          if !out_buf.is_empty() {
            emit(&mut out_buf);
          }
          out_done = eof;
        }
      }
      read = stderr.read_until(b'\n', &mut err_buf), if !err_done => {
        let eof = read.map_err(spawn_err)? == 0;
        if eof || err_buf.ends_with(b"\n") {
          if !err_buf.is_empty() {
            emit(&mut err_buf);
          }
          err_done = eof;
        }
      }
    }
  }

  let status = child.wait().await.map_err(spawn_err)?;
  debug!(cmd = %cmd, code = ?status.code(), "process exited");

  Ok(CmdOutput {
    code: status.code(),
    output,
  })
}

/// Get the shell command and arguments for the current platform.
///
/// An explicit override picks its argument style from the shell name;
/// otherwise `/bin/sh -c` (Unix) or `cmd.exe /C` (Windows) is used.
pub(crate) fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), vec!["/C".to_string()])
  }
}
