use std::ffi::OsStr;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Environment adjustments applied on top of the inherited environment.
#[derive(Debug, Clone, Default)]
pub struct ChildEnv {
    set: Vec<(String, String)>,
    remove: Vec<String>,
}

impl ChildEnv {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set.push((key.into(), value.into()));
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.remove.push(key.into());
        self
    }
}

fn configured_command<S: AsRef<OsStr>>(program: &OsStr, args: &[S], env: &ChildEnv) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    for key in &env.remove {
        command.env_remove(key);
    }
    for (key, value) in &env.set {
        command.env(key, value);
    }
    command
}

/// Runs a program with inherited stdio and returns its exit code.
///
/// Termination by signal is reported as `-1`.
///
/// # Errors
/// Returns an error when the program cannot be started.
pub fn run_passthrough<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    env: &ChildEnv,
) -> Result<i32> {
    let program = program.as_ref();
    let mut command = configured_command(program, args, env);
    command.stdin(Stdio::inherit());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    let status = command
        .status()
        .with_context(|| format!("failed to start {}", program.to_string_lossy()))?;
    Ok(status.code().unwrap_or(-1))
}
