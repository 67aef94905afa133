//! The Jenkins installation sequence.
//!
//! Six steps, one definition for both platforms. The dependency edges say
//! what must exist first; the notification chain says what must re-run when
//! a change actually lands:
//!
//! ```text
//! ensure-java ──┐
//!               ├─> install-jenkins ─> write-config ─> ensure-service
//! package-source┘                          │                ^
//!                                          └─> reload-daemon┘  (notify)
//! ```
//!
//! Re-running against a converged host evaluates every probe, applies
//! nothing, and therefore restarts nothing.

use crate::context::SequenceContext;
use crate::error::{ConvergeError, Result};
use crate::platform::Package;
use crate::sequence::Sequence;
use crate::step::{Step, Verdict};

pub const ENSURE_JAVA: &str = "ensure-java";
pub const PACKAGE_SOURCE: &str = "package-source";
pub const INSTALL_JENKINS: &str = "install-jenkins";
pub const WRITE_CONFIG: &str = "write-config";
pub const RELOAD_DAEMON: &str = "reload-daemon";
pub const ENSURE_SERVICE: &str = "ensure-service";

fn verdict(satisfied: bool) -> Verdict {
    if satisfied {
        Verdict::Satisfied
    } else {
        Verdict::Unsatisfied
    }
}

pub fn build_sequence() -> Sequence<SequenceContext> {
    Sequence::new()
        .step(
            Step::new(ENSURE_JAVA)
                .probe(|ctx: &SequenceContext| {
                    Ok(verdict(ctx.platform.package_installed(Package::Java)?))
                })
                .action(|ctx: &mut SequenceContext| ctx.platform.install_package(Package::Java)),
        )
        .step(
            Step::new(PACKAGE_SOURCE)
                .probe(|ctx: &SequenceContext| Ok(verdict(ctx.platform.package_source_ready()?)))
                .action(|ctx: &mut SequenceContext| ctx.platform.ensure_package_source())
                .cleanup(|ctx: &mut SequenceContext| ctx.platform.discard_source_artifacts()),
        )
        .step(
            Step::new(INSTALL_JENKINS)
                .probe(|ctx: &SequenceContext| {
                    Ok(verdict(ctx.platform.package_installed(Package::Jenkins)?))
                })
                .action(|ctx: &mut SequenceContext| ctx.platform.install_package(Package::Jenkins))
                .requires(ENSURE_JAVA)
                .requires(PACKAGE_SOURCE),
        )
        .step(
            Step::new(WRITE_CONFIG)
                .probe(|ctx: &SequenceContext| {
                    Ok(verdict(ctx.platform.config_satisfied(&ctx.settings)?))
                })
                .action(|ctx: &mut SequenceContext| {
                    let settings = ctx.settings.clone();
                    // The probe already established the config differs, so
                    // the changed-bool carries no extra signal here.
                    ctx.platform.apply_config(&settings)?;
                    Ok(())
                })
                .requires(INSTALL_JENKINS),
        )
        // Runs only when notified: nothing to converge on its own, but a
        // changed drop-in is invisible to systemd until daemon-reload.
        .step(
            Step::triggered(RELOAD_DAEMON)
                .action(|ctx: &mut SequenceContext| ctx.platform.reload_manager()),
        )
        .step(
            Step::new(ENSURE_SERVICE)
                .probe(|ctx: &SequenceContext| {
                    let service = ctx.settings.service.as_str();
                    let running = ctx.platform.service_running(service)?;
                    let enabled = ctx.platform.service_enabled(service)?;
                    Ok(verdict(running && enabled))
                })
                // Restart doubles as start on a stopped service; when this
                // runs the service is either down or about to pick up a
                // config change, so there are no connections worth keeping.
                .action(|ctx: &mut SequenceContext| {
                    let service = ctx.settings.service.clone();
                    if !ctx.platform.service_enabled(&service)? {
                        ctx.platform.enable_service(&service)?;
                    }
                    ctx.platform.restart_service(&service)
                })
                .requires(INSTALL_JENKINS)
                .requires(WRITE_CONFIG),
        )
        .notify(WRITE_CONFIG, RELOAD_DAEMON)
        .notify(RELOAD_DAEMON, ENSURE_SERVICE)
}

/// Unix-only preflight: package and service managers need root.
pub fn require_root() -> Result<()> {
    if !cfg!(unix) {
        return Ok(());
    }
    let out = crate::exec::run_status("id", &["-u"])?;
    if out.stdout_trimmed() != "0" {
        return Err(ConvergeError::NeedsRoot(
            "re-run with sudo".to_string(),
        ));
    }
    Ok(())
}
