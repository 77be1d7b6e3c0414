//! Child-process execution.
//!
//! Recipe `Build`/`Install` bodies are author-provided shell fragments; they
//! run under `sh -eu` (strict mode, any failing command aborts) with the
//! body piped on stdin and all output appended to the stage log. Command
//! templates from the configuration (`fetch_cmd`, `strip_cmd`) are
//! tokenized and executed as argv arrays, never through a shell.

use crate::error::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Run a script body under `sh -eu` in `cwd` with extra environment
/// variables, stdout and stderr appended to `log`.
pub fn run_script(
    script: &str,
    cwd: &Path,
    envs: &[(&str, String)],
    log: &File,
) -> Result<ExitStatus> {
    let mut child = Command::new("sh")
        .arg("-eu")
        .current_dir(cwd)
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?))
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(script.as_bytes())?;
    }
    Ok(child.wait()?)
}

/// Run an argv array directly (no shell), output appended to `log`.
pub fn run_argv(argv: &[String], log: &File) -> Result<ExitStatus> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command template")
    })?;

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?))
        .status()?;
    Ok(status)
}

/// Split a command template on whitespace into an argv array.
pub fn tokenize(template: &str) -> Vec<String> {
    template.split_whitespace().map(String::from).collect()
}
