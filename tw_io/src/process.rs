//! Running external tools.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use tw_core::Error;

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn spawn_error(program: &str, e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::ToolUnavailable {
            tool: program.to_string(),
        }
    } else {
        Error::CommandFailed {
            command: program.to_string(),
            code: None,
            stderr: e.to_string(),
        }
    }
}

/// Run `program` to completion, capturing its output.
///
/// A missing executable is `ToolUnavailable`; a non-zero exit is `CommandFailed`.
pub async fn run_command(
    program: &str,
    args: &[&str],
    work_dir: Option<&Path>,
) -> Result<CommandOutput, Error> {
    let line = command_line(program, args);
    debug!(command = %line, dir = ?work_dir, "running");

    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    if let Some(dir) = work_dir {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| spawn_error(program, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        debug!(command = %line, code = ?output.status.code(), "command failed");
        return Err(Error::CommandFailed {
            command: line,
            code: output.status.code(),
            stderr: if stderr.trim().is_empty() { stdout } else { stderr },
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Run `program` attached to the terminal, for interactive tools like editors.
pub async fn run_interactive(program: &str, args: &[&str]) -> Result<(), Error> {
    let line = command_line(program, args);
    debug!(command = %line, "running interactively");

    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| spawn_error(program, e))?;

    if !status.success() {
        return Err(Error::CommandFailed {
            command: line,
            code: status.code(),
            stderr: String::new(),
        });
    }

    Ok(())
}
