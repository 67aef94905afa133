//! Cloud-template deployment glue.
//!
//! The stack lifecycle lives entirely in CloudFormation; this module only
//! shells out to the `aws` CLI and polls the opaque remote state machine
//! (`CREATE_IN_PROGRESS → CREATE_COMPLETE | ROLLBACK_*`) to a terminal
//! state. Nothing here is convergence logic — deploy is already idempotent
//! on the service side.

use crate::error::{ConvergeError, Result};
use crate::exec;
use std::path::PathBuf;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// StackStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    RollbackInProgress,
    RollbackComplete,
    DeleteInProgress,
    DeleteComplete,
    NotFound,
    Other(String),
}

impl StackStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::NotFound => "NOT_FOUND",
            Self::Other(s) => s,
        }
    }

    pub fn in_progress(&self) -> bool {
        matches!(
            self,
            Self::CreateInProgress | Self::RollbackInProgress | Self::DeleteInProgress
        )
    }

    /// Rollbacks mean the template failed to provision.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::RollbackInProgress | Self::RollbackComplete)
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// aws CLI wrappers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StackSpec {
    pub name: String,
    pub template: PathBuf,
    pub parameters: Vec<(String, String)>,
}

fn aws_bin() -> Result<String> {
    let path = which::which("aws").map_err(|_| ConvergeError::AwsCliMissing)?;
    Ok(path.to_string_lossy().into_owned())
}

pub fn deploy_stack(spec: &StackSpec) -> Result<()> {
    let aws = aws_bin()?;
    let template = spec.template.to_string_lossy().into_owned();
    let mut args: Vec<String> = vec![
        "cloudformation".into(),
        "deploy".into(),
        "--stack-name".into(),
        spec.name.clone(),
        "--template-file".into(),
        template,
        "--capabilities".into(),
        "CAPABILITY_IAM".into(),
    ];
    if !spec.parameters.is_empty() {
        args.push("--parameter-overrides".into());
        for (key, value) in &spec.parameters {
            args.push(format!("{key}={value}"));
        }
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    exec::run(&aws, &arg_refs)?;
    Ok(())
}

pub fn stack_status(name: &str) -> Result<StackStatus> {
    let aws = aws_bin()?;
    let out = exec::run_status(
        &aws,
        &[
            "cloudformation",
            "describe-stacks",
            "--stack-name",
            name,
            "--query",
            "Stacks[0].StackStatus",
            "--output",
            "text",
        ],
    )?;
    if !out.success {
        if out.stderr.contains("does not exist") {
            return Ok(StackStatus::NotFound);
        }
        return Err(ConvergeError::CommandFailed {
            command: format!("aws cloudformation describe-stacks --stack-name {name}"),
            detail: out.stderr.trim().to_string(),
        });
    }
    Ok(StackStatus::parse(out.stdout_trimmed()))
}

/// Poll until the stack leaves `*_IN_PROGRESS`. A rollback is a provisioning
/// failure; the template's own events hold the reason.
pub fn wait_for_stack(name: &str, timeout: Duration, interval: Duration) -> Result<StackStatus> {
    let started = Instant::now();
    loop {
        let status = stack_status(name)?;
        if !status.in_progress() {
            if status.is_failure() {
                return Err(ConvergeError::CommandFailed {
                    command: format!("stack {name}"),
                    detail: format!("stack rolled back ({status}); see CloudFormation events"),
                });
            }
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            return Err(ConvergeError::Timeout {
                what: format!("stack {name} still {status}"),
                seconds: timeout.as_secs(),
            });
        }
        std::thread::sleep(interval);
    }
}

pub fn delete_stack(name: &str) -> Result<()> {
    let aws = aws_bin()?;
    exec::run(
        &aws,
        &["cloudformation", "delete-stack", "--stack-name", name],
    )?;
    Ok(())
}

/// Fetch a decrypted SSM parameter (e.g. the generated admin credential).
pub fn get_parameter(name: &str) -> Result<String> {
    let aws = aws_bin()?;
    let out = exec::run(
        &aws,
        &[
            "ssm",
            "get-parameter",
            "--name",
            name,
            "--with-decryption",
            "--query",
            "Parameter.Value",
            "--output",
            "text",
        ],
    )?;
    Ok(out.stdout_trimmed().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_roundtrip() {
        for raw in [
            "CREATE_IN_PROGRESS",
            "CREATE_COMPLETE",
            "ROLLBACK_IN_PROGRESS",
            "ROLLBACK_COMPLETE",
            "DELETE_IN_PROGRESS",
            "DELETE_COMPLETE",
        ] {
            assert_eq!(StackStatus::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn unknown_status_preserved_verbatim() {
        let status = StackStatus::parse("UPDATE_COMPLETE");
        assert_eq!(status, StackStatus::Other("UPDATE_COMPLETE".to_string()));
        assert_eq!(status.as_str(), "UPDATE_COMPLETE");
    }

    #[test]
    fn rollback_is_failure_create_is_not() {
        assert!(StackStatus::RollbackComplete.is_failure());
        assert!(StackStatus::RollbackInProgress.is_failure());
        assert!(!StackStatus::CreateComplete.is_failure());
        assert!(StackStatus::CreateInProgress.in_progress());
        assert!(!StackStatus::CreateComplete.in_progress());
    }
}
