use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error("step '{step}': probe failed: {detail}")]
    Probe { step: String, detail: String },

    #[error("step '{step}': action failed: {detail}")]
    Action { step: String, detail: String },

    #[error("step '{step}' blocked by failed prerequisite '{blocked_on}'")]
    Blocked { step: String, blocked_on: String },

    #[error("step '{step}': forced re-run failed after convergence: {detail}")]
    PostConvergence { step: String, detail: String },

    #[error("prerequisite cycle involving steps: {0}")]
    DependencyCycle(String),

    #[error("'{step}' references unknown step '{unknown}'")]
    UnknownStep { step: String, unknown: String },

    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("command failed ({command}): {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("aws CLI not found on PATH; install awscli v2 and retry")]
    AwsCliMissing,

    #[error("unsupported platform: {0}")]
    Unsupported(String),

    #[error("root privileges required: {0}")]
    NeedsRoot(String),

    #[error("timed out after {seconds}s: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConvergeError>;
