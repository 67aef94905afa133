//! Subprocess invocation for package managers, service managers, and cloud
//! tooling. Two entry points with deliberately different failure semantics:
//!
//! - [`run`]: a non-zero exit is an error. Used by actions, where the
//!   underlying tool's message must surface verbatim.
//! - [`run_status`]: a non-zero exit is an answer. Used by probes, where
//!   `systemctl is-active` returning 3 means "inactive", not "broken".

use crate::error::{ConvergeError, Result};
use std::process::{Command, Stdio};

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    /// stdout with surrounding whitespace removed; what probes compare on.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Run a command and capture output without treating a non-zero exit as an
/// error. Spawn failures (binary missing, permission denied) still error.
pub fn run_status(program: &str, args: &[&str]) -> Result<CmdOutput> {
    let line = command_line(program, args);
    tracing::debug!(command = %line, "exec");

    let output = Command::new(program)
        .args(args)
        // Never let apt or dpkg stop for a prompt.
        .env("DEBIAN_FRONTEND", "noninteractive")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ConvergeError::CommandFailed {
            command: line,
            detail: format!("failed to spawn: {e}"),
        })?;

    Ok(CmdOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command, erroring on non-zero exit with the tool's own message.
pub fn run(program: &str, args: &[&str]) -> Result<CmdOutput> {
    let out = run_status(program, args)?;
    if !out.success {
        return Err(ConvergeError::CommandFailed {
            command: command_line(program, args),
            detail: failure_detail(&out),
        });
    }
    Ok(out)
}

/// The tail of stderr (or stdout when stderr is empty), capped so a noisy
/// tool does not drown the report.
fn failure_detail(out: &CmdOutput) -> String {
    let text = if out.stderr.trim().is_empty() {
        out.stdout.trim()
    } else {
        out.stderr.trim()
    };
    if text.is_empty() {
        return match out.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
    }
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(5);
    let msg = lines[start..].join("\n");
    match out.code {
        Some(code) => format!("exit status {code}: {msg}"),
        None => msg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_captures_stdout() {
        let out = run_status("echo", &["hello"]).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout_trimmed(), "hello");
    }

    #[test]
    fn run_status_nonzero_exit_is_not_an_error() {
        let out = run_status("false", &[]).unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(1));
    }

    #[test]
    fn run_errors_on_nonzero_exit_with_exit_status() {
        let err = run("false", &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("false"), "command line in message: {msg}");
        assert!(msg.contains("exit status 1"), "{msg}");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let err = run_status("definitely-not-a-real-binary-xyz", &[]).unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    fn failure_detail_keeps_stderr_tail() {
        let out = CmdOutput {
            success: false,
            code: Some(100),
            stdout: String::new(),
            stderr: "E: Unable to locate package jenkins\n".to_string(),
        };
        let detail = failure_detail(&out);
        assert!(detail.contains("Unable to locate package jenkins"));
        assert!(detail.contains("exit status 100"));
    }
}
