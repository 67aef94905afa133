//! Ordered composition of convergence steps.
//!
//! A sequence is built once per invocation, holds no state between runs, and
//! re-probes everything from live system state. Execution is strictly
//! sequential: steps are few and I/O-bound, and each depends on the previous
//! one reaching a definite OS-level state before the next can safely probe.
//!
//! Two edge kinds form the DAG:
//! - `requires`: prerequisite ordering; a failed prerequisite blocks its
//!   dependents without invoking their actions.
//! - change links (`notify`): if the source's action actually executed this
//!   run, the target's action is forced even when the target's own probe is
//!   satisfied ("config changed, so restart the service"). Link edges
//!   participate in the topological order so a single notification pass
//!   propagates chains transitively.

use crate::error::{ConvergeError, Result};
use crate::step::{FailureKind, Outcome, Step, StepReport, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

// ---------------------------------------------------------------------------
// ChangeLink / RunState
// ---------------------------------------------------------------------------

/// "Re-run `target`'s action whenever `source`'s action actually changed
/// something this run." Fires on `Applied`, never on `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLink {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    /// Every evaluated step ended `Skipped` or `Applied`.
    Completed,
    /// Stopped on an unrecoverable failure, or finished with failed steps.
    Halted,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Probe-only preview of what a run would do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub name: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    /// Evaluated steps in execution order. Steps abandoned by a halt are not
    /// listed; `state` says why the run stopped.
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn outcome_of(&self, name: &str) -> Option<Outcome> {
        self.steps.iter().find(|s| s.name == name).map(|s| s.outcome)
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed
    }

    /// First failed step, if any. Post-convergence failures come after
    /// primary ones in execution order, so a primary failure wins here.
    pub fn first_failure(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.outcome == Outcome::Failed)
    }
}

// ---------------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------------

pub struct Sequence<C> {
    steps: Vec<Step<C>>,
    links: Vec<ChangeLink>,
    state: RunState,
}

impl<C> Default for Sequence<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Sequence<C> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            links: Vec::new(),
            state: RunState::NotStarted,
        }
    }

    pub fn step(mut self, step: Step<C>) -> Self {
        self.steps.push(step);
        self
    }

    /// Notify `target` whenever `source`'s action actually executes.
    pub fn notify(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.links.push(ChangeLink {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    // -- Validation / ordering ----------------------------------------------

    /// Kahn topological sort over `requires` and link edges. Duplicate names,
    /// unknown references, and cycles are configuration errors detected
    /// before any step runs.
    fn ordered(&self) -> Result<Vec<usize>> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.name.as_str(), i).is_some() {
                return Err(ConvergeError::DuplicateStep(step.name.clone()));
            }
        }

        let lookup = |owner: &str, name: &str| -> Result<usize> {
            index
                .get(name)
                .copied()
                .ok_or_else(|| ConvergeError::UnknownStep {
                    step: owner.to_string(),
                    unknown: name.to_string(),
                })
        };

        // edges[from] -> Vec<to>
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        let mut indegree: Vec<usize> = vec![0; self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            for req in &step.requires {
                let from = lookup(&step.name, req)?;
                edges[from].push(i);
                indegree[i] += 1;
            }
        }
        for link in &self.links {
            let from = lookup(&format!("link to {}", link.target), &link.source)?;
            let to = lookup(&format!("link from {}", link.source), &link.target)?;
            edges[from].push(to);
            indegree[to] += 1;
        }

        // Seed with declaration order so independent steps keep their
        // declared sequence.
        let mut ready: Vec<usize> = (0..self.steps.len()).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(i) = ready.first().copied() {
            ready.remove(0);
            order.push(i);
            for &next in &edges[i] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(next);
                    ready.sort_unstable();
                }
            }
        }

        if order.len() != self.steps.len() {
            let cyclic: Vec<&str> = (0..self.steps.len())
                .filter(|i| !order.contains(i))
                .map(|i| self.steps[i].name.as_str())
                .collect();
            return Err(ConvergeError::DependencyCycle(cyclic.join(", ")));
        }
        Ok(order)
    }

    // -- Probe-only preview --------------------------------------------------

    pub fn plan(&self, ctx: &C) -> Result<Vec<PlanEntry>> {
        let order = self.ordered()?;
        let mut entries = Vec::with_capacity(order.len());
        for i in order {
            let step = &self.steps[i];
            let verdict = (step.probe)(ctx).map_err(|e| ConvergeError::Probe {
                step: step.name.clone(),
                detail: e.to_string(),
            })?;
            entries.push(PlanEntry {
                name: step.name.clone(),
                verdict,
            });
        }
        Ok(entries)
    }

    // -- Execution -----------------------------------------------------------

    pub fn run(&mut self, ctx: &mut C) -> Result<RunReport> {
        let order = self.ordered()?;
        self.state = RunState::Running;
        let started_at = Utc::now();

        let mut outcomes: HashMap<usize, Outcome> = HashMap::new();
        let mut reports: Vec<StepReport> = Vec::new();
        let mut report_index: HashMap<usize, usize> = HashMap::new();
        let mut evaluated: Vec<usize> = Vec::new();
        let mut halted = false;

        // Primary pass: probe, then act only when unsatisfied.
        for &i in &order {
            let started = Instant::now();
            let (outcome, failure, message) = self.evaluate(i, ctx, &outcomes);
            outcomes.insert(i, outcome);
            evaluated.push(i);
            report_index.insert(i, reports.len());
            reports.push(StepReport {
                name: self.steps[i].name.clone(),
                outcome,
                forced: false,
                failure,
                message,
                duration_ms: started.elapsed().as_millis() as u64,
            });

            let fatal = outcome == Outcome::Failed
                && match failure {
                    Some(FailureKind::Probe) => true,
                    Some(FailureKind::Action) => !self.steps[i].recoverable,
                    // Only reachable when the upstream failure was
                    // recoverable, so the block itself does not halt.
                    Some(FailureKind::Blocked) => false,
                    _ => false,
                };
            if fatal {
                halted = true;
                self.run_cleanups(&evaluated, ctx);
                break;
            }
        }

        // Notification pass: force link targets whose source actually
        // changed something. Link edges are ordering edges, so walking the
        // topological order once propagates chains (A applied -> B forced ->
        // C forced). Targets that already applied in the primary pass ran
        // after their source and are not re-run; targets that failed are not
        // retried.
        let mut post_failure = false;
        if !halted {
            for &t in &order {
                if outcomes.get(&t) != Some(&Outcome::Skipped) {
                    continue;
                }
                let notified = self.links.iter().any(|l| {
                    l.target == self.steps[t].name
                        && self
                            .steps
                            .iter()
                            .position(|s| s.name == l.source)
                            .is_some_and(|s| outcomes.get(&s) == Some(&Outcome::Applied))
                });
                if !notified {
                    continue;
                }

                let started = Instant::now();
                let report = &mut reports[report_index[&t]];
                report.forced = true;
                match (self.steps[t].action)(ctx) {
                    Ok(()) => {
                        outcomes.insert(t, Outcome::Applied);
                        report.outcome = Outcome::Applied;
                    }
                    Err(e) => {
                        outcomes.insert(t, Outcome::Failed);
                        report.outcome = Outcome::Failed;
                        report.failure = Some(FailureKind::PostConvergence);
                        report.message = Some(e.to_string());
                        post_failure = true;
                    }
                }
                report.duration_ms += started.elapsed().as_millis() as u64;
            }
        }

        let all_converged = !halted
            && !post_failure
            && outcomes
                .values()
                .all(|o| matches!(o, Outcome::Skipped | Outcome::Applied));
        self.state = if all_converged {
            RunState::Completed
        } else {
            RunState::Halted
        };

        Ok(RunReport {
            state: self.state,
            started_at,
            steps: reports,
        })
    }

    fn evaluate(
        &mut self,
        i: usize,
        ctx: &mut C,
        outcomes: &HashMap<usize, Outcome>,
    ) -> (Outcome, Option<FailureKind>, Option<String>) {
        // Fail-fast propagation: never invoke the action below a failed
        // prerequisite, and report which upstream step caused the block.
        for req in &self.steps[i].requires {
            let failed = self
                .steps
                .iter()
                .position(|s| &s.name == req)
                .is_some_and(|r| outcomes.get(&r) == Some(&Outcome::Failed));
            if failed {
                return (
                    Outcome::Failed,
                    Some(FailureKind::Blocked),
                    Some(format!("blocked by failed prerequisite '{req}'")),
                );
            }
        }

        match (self.steps[i].probe)(ctx) {
            Ok(Verdict::Satisfied) => (Outcome::Skipped, None, None),
            Ok(Verdict::Unsatisfied) => match (self.steps[i].action)(ctx) {
                Ok(()) => (Outcome::Applied, None, None),
                Err(e) => (Outcome::Failed, Some(FailureKind::Action), Some(e.to_string())),
            },
            Err(e) => (Outcome::Failed, Some(FailureKind::Probe), Some(e.to_string())),
        }
    }

    /// Best-effort cleanup of already-evaluated steps, newest first.
    fn run_cleanups(&mut self, evaluated: &[usize], ctx: &mut C) {
        for &i in evaluated.iter().rev() {
            let step = &mut self.steps[i];
            if let Some(cleanup) = step.cleanup.as_mut() {
                tracing::debug!(step = %step.name, "running cleanup");
                cleanup(ctx);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvergeError;
    use std::collections::{HashMap, HashSet};

    /// In-memory stand-in for live OS state: a set of satisfied conditions
    /// plus an action call counter per step.
    #[derive(Default)]
    struct World {
        satisfied: HashSet<&'static str>,
        calls: HashMap<&'static str, u32>,
        cleaned: Vec<&'static str>,
    }

    impl World {
        fn calls(&self, name: &str) -> u32 {
            self.calls.get(name).copied().unwrap_or(0)
        }
    }

    /// A step whose action marks its own condition satisfied (idempotence
    /// closure holds).
    fn converging(name: &'static str) -> Step<World> {
        Step::new(name)
            .probe(move |w: &World| {
                Ok(if w.satisfied.contains(name) {
                    Verdict::Satisfied
                } else {
                    Verdict::Unsatisfied
                })
            })
            .action(move |w: &mut World| {
                *w.calls.entry(name).or_default() += 1;
                w.satisfied.insert(name);
                Ok(())
            })
    }

    fn failing(name: &'static str) -> Step<World> {
        Step::new(name)
            .probe(|_| Ok(Verdict::Unsatisfied))
            .action(move |w: &mut World| {
                *w.calls.entry(name).or_default() += 1;
                Err(ConvergeError::CommandFailed {
                    command: name.to_string(),
                    detail: "exit status 1".to_string(),
                })
            })
    }

    // -- Idempotence ---------------------------------------------------------

    #[test]
    fn applied_then_skipped_on_rerun() {
        let mut seq = Sequence::new().step(converging("install"));
        let mut world = World::default();

        let first = seq.run(&mut world).unwrap();
        assert_eq!(first.outcome_of("install"), Some(Outcome::Applied));

        let second = seq.run(&mut world).unwrap();
        assert_eq!(second.outcome_of("install"), Some(Outcome::Skipped));
        assert_eq!(world.calls("install"), 1);
    }

    #[test]
    fn no_links_fire_when_nothing_applied() {
        let mut seq = Sequence::new()
            .step(converging("write-config"))
            .step(Step::triggered("restart").action(|w: &mut World| {
                *w.calls.entry("restart").or_default() += 1;
                Ok(())
            }))
            .notify("write-config", "restart");
        let mut world = World::default();
        world.satisfied.insert("write-config");

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(world.calls("restart"), 0, "no change, no restart");
    }

    // -- Fail-fast propagation ----------------------------------------------

    #[test]
    fn failed_prerequisite_blocks_dependent_without_invoking_action() {
        let mut seq = Sequence::new()
            .step(failing("repo").recoverable())
            .step(converging("install").requires("repo"));
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Halted);
        assert_eq!(world.calls("install"), 0, "blocked action must never run");

        let blocked = &report.steps[1];
        assert_eq!(blocked.outcome, Outcome::Failed);
        assert_eq!(blocked.failure, Some(FailureKind::Blocked));
        assert!(blocked.message.as_deref().unwrap().contains("'repo'"));
    }

    #[test]
    fn unrecoverable_failure_halts_remaining_steps() {
        let mut seq = Sequence::new()
            .step(failing("download"))
            .step(converging("install"));
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Halted);
        assert_eq!(report.steps.len(), 1, "later steps are not evaluated");
        assert_eq!(world.calls("install"), 0);
        assert_eq!(
            report.first_failure().unwrap().failure,
            Some(FailureKind::Action)
        );
        assert!(report.first_failure().unwrap().message.as_deref().unwrap().contains("exit status 1"));
    }

    #[test]
    fn recoverable_failure_continues_with_independent_steps() {
        let mut seq = Sequence::new()
            .step(failing("optional").recoverable())
            .step(converging("install"));
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Halted, "a failed step is never Completed");
        assert_eq!(report.outcome_of("install"), Some(Outcome::Applied));
    }

    #[test]
    fn cleanup_runs_on_halt_in_reverse_order() {
        let mut seq = Sequence::new()
            .step(converging("download").cleanup(|w: &mut World| w.cleaned.push("download")))
            .step(converging("unpack").cleanup(|w: &mut World| w.cleaned.push("unpack")))
            .step(failing("install"));
        let mut world = World::default();

        seq.run(&mut world).unwrap();
        assert_eq!(world.cleaned, vec!["unpack", "download"]);
    }

    #[test]
    fn probe_error_is_fatal_even_for_recoverable_steps() {
        let mut seq = Sequence::new()
            .step(
                Step::new("query-packages")
                    .probe(|_: &World| {
                        Err(ConvergeError::CommandFailed {
                            command: "dpkg-query".to_string(),
                            detail: "database is locked".to_string(),
                        })
                    })
                    .recoverable(),
            )
            .step(converging("install"));
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Halted);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].failure, Some(FailureKind::Probe));
        assert!(report.steps[0].message.as_deref().unwrap().contains("database is locked"));
    }

    // -- Change notification -------------------------------------------------

    #[test]
    fn forced_restart_despite_satisfied_probe() {
        let mut seq = Sequence::new()
            .step(converging("write-config"))
            .step(
                Step::new("service")
                    // Service is already running: probe alone says Satisfied.
                    .probe(|_| Ok(Verdict::Satisfied))
                    .action(|w: &mut World| {
                        *w.calls.entry("service").or_default() += 1;
                        Ok(())
                    }),
            )
            .notify("write-config", "service");
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(world.calls("service"), 1, "restart forced by config change");
        let service = report.steps.iter().find(|s| s.name == "service").unwrap();
        assert_eq!(service.outcome, Outcome::Applied);
        assert!(service.forced);
    }

    #[test]
    fn notification_chain_propagates_transitively_in_one_pass() {
        let mut seq = Sequence::new()
            .step(converging("a"))
            .step(Step::triggered("b").action(|w: &mut World| {
                *w.calls.entry("b").or_default() += 1;
                Ok(())
            }))
            .step(Step::triggered("c").action(|w: &mut World| {
                *w.calls.entry("c").or_default() += 1;
                Ok(())
            }))
            .notify("a", "b")
            .notify("b", "c");
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(world.calls("b"), 1);
        assert_eq!(world.calls("c"), 1);
        assert_eq!(report.outcome_of("b"), Some(Outcome::Applied));
        assert_eq!(report.outcome_of("c"), Some(Outcome::Applied));
    }

    #[test]
    fn target_already_applied_is_not_rerun() {
        // Both converge in the primary pass; the link must not restart the
        // target a second time.
        let mut seq = Sequence::new()
            .step(converging("write-config"))
            .step(converging("service").requires("write-config"))
            .notify("write-config", "service");
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(world.calls("service"), 1);
        assert!(!report.steps.iter().find(|s| s.name == "service").unwrap().forced);
    }

    #[test]
    fn forced_failure_is_post_convergence_and_halts_verdict() {
        let mut seq = Sequence::new()
            .step(converging("write-config"))
            .step(Step::triggered("restart").action(|w: &mut World| {
                *w.calls.entry("restart").or_default() += 1;
                Err(ConvergeError::CommandFailed {
                    command: "systemctl restart jenkins".to_string(),
                    detail: "job failed".to_string(),
                })
            }))
            .notify("write-config", "restart");
        let mut world = World::default();

        let report = seq.run(&mut world).unwrap();
        assert_eq!(report.state, RunState::Halted);
        let restart = report.steps.iter().find(|s| s.name == "restart").unwrap();
        assert_eq!(restart.failure, Some(FailureKind::PostConvergence));
        assert_eq!(
            report.outcome_of("write-config"),
            Some(Outcome::Applied),
            "primary convergence still succeeded"
        );
    }

    // -- Graph validation ----------------------------------------------------

    #[test]
    fn prerequisite_cycle_is_fatal_before_any_step_runs() {
        let mut seq = Sequence::new()
            .step(converging("a").requires("b"))
            .step(converging("b").requires("a"));
        let mut world = World::default();

        let err = seq.run(&mut world).unwrap_err();
        assert!(matches!(err, ConvergeError::DependencyCycle(_)));
        assert_eq!(world.calls("a") + world.calls("b"), 0);
    }

    #[test]
    fn unknown_prerequisite_rejected() {
        let mut seq = Sequence::new().step(converging("a").requires("ghost"));
        let err = seq.run(&mut World::default()).unwrap_err();
        assert!(matches!(err, ConvergeError::UnknownStep { .. }));
    }

    #[test]
    fn unknown_link_target_names_the_link() {
        let mut seq = Sequence::new().step(converging("a")).notify("a", "ghost");
        let err = seq.run(&mut World::default()).unwrap_err();
        match err {
            ConvergeError::UnknownStep { step, unknown } => {
                assert_eq!(step, "link from a");
                assert_eq!(unknown, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_link_source_names_the_link() {
        let mut seq = Sequence::new().step(converging("a")).notify("ghost", "a");
        let err = seq.run(&mut World::default()).unwrap_err();
        match err {
            ConvergeError::UnknownStep { step, unknown } => {
                assert_eq!(step, "link to a");
                assert_eq!(unknown, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_step_name_rejected() {
        let mut seq = Sequence::new().step(converging("a")).step(converging("a"));
        let err = seq.run(&mut World::default()).unwrap_err();
        assert!(matches!(err, ConvergeError::DuplicateStep(_)));
    }

    #[test]
    fn requires_orders_execution_regardless_of_declaration() {
        let mut seq = Sequence::new()
            .step(converging("second").requires("first"))
            .step(converging("first"));
        let report = seq.run(&mut World::default()).unwrap();
        let names: Vec<&str> = report.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    // -- plan ----------------------------------------------------------------

    #[test]
    fn plan_probes_without_acting() {
        let seq = Sequence::new()
            .step(converging("install"))
            .step(Step::triggered("reload"));
        let world = World::default();

        let plan = seq.plan(&world).unwrap();
        assert_eq!(plan[0].verdict, Verdict::Unsatisfied);
        assert_eq!(plan[1].verdict, Verdict::Satisfied);
        assert_eq!(world.calls("install"), 0);
    }

    #[test]
    fn report_serializes_to_json() {
        let mut seq = Sequence::new().step(converging("install"));
        let report = seq.run(&mut World::default()).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"state\":\"completed\""));
        assert!(json.contains("\"outcome\":\"applied\""));
    }
}
