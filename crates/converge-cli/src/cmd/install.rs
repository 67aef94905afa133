use crate::output::{print_json, print_run_report};
use anyhow::Context;
use converge_core::health::{endpoint_url, wait_for_ready};
use converge_core::jenkins;
use std::time::Duration;

pub fn run(
    port: u16,
    keep_wizard: bool,
    platform: Option<&str>,
    no_verify: bool,
    timeout_seconds: u64,
    json: bool,
) -> anyhow::Result<()> {
    jenkins::require_root().context("preflight failed")?;

    let mut ctx = super::build_context(port, keep_wizard, platform)?;
    ctx.platform.preflight().context("preflight failed")?;
    tracing::info!(platform = ctx.platform.name(), port, "starting convergence run");

    let report = jenkins::build_sequence()
        .run(&mut ctx)
        .context("sequence configuration error")?;

    if json {
        print_json(&report)?;
    } else {
        print_run_report(&report);
    }

    if !report.succeeded() {
        match report.first_failure() {
            Some(failed) => anyhow::bail!(
                "halted at step '{}': {}\nre-running after fixing the cause is safe; converged steps will skip",
                failed.name,
                failed.message.as_deref().unwrap_or("unknown failure")
            ),
            None => anyhow::bail!("sequence halted"),
        }
    }

    if no_verify {
        return Ok(());
    }

    let url = endpoint_url("localhost", port);
    eprintln!("waiting for Jenkins to answer at {url} (up to {timeout_seconds}s)...");
    let signal = wait_for_ready(
        &url,
        Duration::from_secs(timeout_seconds),
        Duration::from_secs(5),
    )?;
    let note = if signal.status == 403 {
        " (auth required)"
    } else {
        ""
    };
    let line = format!(
        "Jenkins is up: HTTP {}{} on port {} after {}s",
        signal.status,
        note,
        port,
        signal.waited.as_secs()
    );
    // Keep stdout pure JSON when asked for it.
    if json {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
    Ok(())
}
