use crate::error::Result;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Verdict / Outcome / FailureKind
// ---------------------------------------------------------------------------

/// Result of a state probe. Probes never mutate system state; an error from
/// a probe means "cannot determine state" and is fatal, never `Unsatisfied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Satisfied,
    Unsatisfied,
}

/// Per-run outcome of a step. Never persisted; re-derived from live system
/// state on every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Skipped,
    Applied,
    Failed,
}

/// Why a step ended `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Probe could not determine state. Always fatal.
    Probe,
    /// Action ran and failed. Fatal unless the step is recoverable.
    Action,
    /// A prerequisite failed; the action was never invoked.
    Blocked,
    /// A forced re-run (change notification) failed after primary
    /// convergence succeeded.
    PostConvergence,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

type ProbeFn<C> = Box<dyn Fn(&C) -> Result<Verdict>>;
type ActionFn<C> = Box<dyn FnMut(&mut C) -> Result<()>>;
type CleanupFn<C> = Box<dyn FnMut(&mut C)>;

/// A single convergence step: a side-effect-free probe plus an action that
/// runs only when the probe reports `Unsatisfied`.
///
/// Contract: a successfully applied action must make this step's own probe
/// return `Satisfied` on immediate re-check. A step that violates this is not
/// idempotent and will re-apply on every run.
pub struct Step<C> {
    pub(crate) name: String,
    pub(crate) probe: ProbeFn<C>,
    pub(crate) action: ActionFn<C>,
    pub(crate) cleanup: Option<CleanupFn<C>>,
    pub(crate) requires: Vec<String>,
    pub(crate) recoverable: bool,
}

impl<C> Step<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probe: Box::new(|_| Ok(Verdict::Unsatisfied)),
            action: Box::new(|_| Ok(())),
            cleanup: None,
            requires: Vec::new(),
            recoverable: false,
        }
    }

    /// A step whose probe always reports `Satisfied`: it runs only when a
    /// change-notification link forces it (e.g. daemon reload after a config
    /// file changed).
    pub fn triggered(name: impl Into<String>) -> Self {
        Self::new(name).probe(|_| Ok(Verdict::Satisfied))
    }

    pub fn probe(mut self, probe: impl Fn(&C) -> Result<Verdict> + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn action(mut self, action: impl FnMut(&mut C) -> Result<()> + 'static) -> Self {
        self.action = Box::new(action);
        self
    }

    /// Side-effect-free cleanup (e.g. temp file removal), run best-effort
    /// when a later halt abandons the sequence.
    pub fn cleanup(mut self, cleanup: impl FnMut(&mut C) + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub fn requires(mut self, step: impl Into<String>) -> Self {
        self.requires.push(step.into());
        self
    }

    /// Mark this step's action failure as recoverable: the sequence keeps
    /// going, dependents of this step are blocked, and re-running the
    /// installer is the documented recovery path.
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C> std::fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("recoverable", &self.recoverable)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// StepReport
// ---------------------------------------------------------------------------

/// Per-step entry in the run report, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub outcome: Outcome,
    /// True when the action was re-run by a change-notification link after
    /// the primary pass.
    #[serde(default)]
    pub forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Outcome::Skipped).unwrap(), "\"skipped\"");
        assert_eq!(serde_json::to_string(&Outcome::Applied).unwrap(), "\"applied\"");
        assert_eq!(
            serde_json::to_string(&FailureKind::PostConvergence).unwrap(),
            "\"post_convergence\""
        );
    }

    #[test]
    fn triggered_step_probe_is_satisfied() {
        let step: Step<()> = Step::triggered("reload-daemon");
        assert_eq!((step.probe)(&()).unwrap(), Verdict::Satisfied);
    }

    #[test]
    fn step_report_json_roundtrip() {
        let report = StepReport {
            name: "write-config".to_string(),
            outcome: Outcome::Applied,
            forced: false,
            failure: None,
            message: Some("override.conf updated".to_string()),
            duration_ms: 12,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("failure"), "None fields are omitted");
        let parsed: StepReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
