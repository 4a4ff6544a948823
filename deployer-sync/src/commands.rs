//! Post-sync command execution.
//!
//! Commands are split on whitespace (no shell) and run inside the working
//! copy with the process environment plus the secrets-file variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::error::CommandError;

/// Captured output of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

/// Run one command synchronously in `dir`.
pub fn run_command(
    command: &str,
    dir: &Path,
    envs: &BTreeMap<String, String>,
) -> Result<CommandOutput, CommandError> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or(CommandError::Empty)?;

    tracing::debug!(command, dir = %dir.display(), "running command");
    let output = Command::new(program)
        .args(parts)
        .current_dir(dir)
        .envs(envs)
        .output()
        .map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            code: output.status.code(),
            stdout,
            stderr,
        });
    }

    Ok(CommandOutput {
        command: command.to_string(),
        stdout,
        stderr,
    })
}

/// Run `commands` in order, stopping at the first failure.
pub fn run_commands(
    commands: &[String],
    dir: &Path,
    envs: &BTreeMap<String, String>,
) -> Result<Vec<CommandOutput>, CommandError> {
    let mut outputs = Vec::with_capacity(commands.len());
    for command in commands {
        outputs.push(run_command(command, dir, envs)?);
    }
    Ok(outputs)
}
