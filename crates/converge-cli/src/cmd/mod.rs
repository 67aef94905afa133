pub mod install;
pub mod plan;
pub mod stack;
pub mod validate;

use anyhow::Context;
use converge_core::context::{InstallSettings, SequenceContext};
use converge_core::platform::{host_platform, platform_by_name};

/// Shared construction for install/plan: settings from flags plus the host
/// (or overridden) platform implementation.
pub fn build_context(
    port: u16,
    keep_wizard: bool,
    platform: Option<&str>,
) -> anyhow::Result<SequenceContext> {
    let platform = match platform {
        Some(name) => platform_by_name(name).context("unknown --platform value")?,
        None => host_platform().context("no platform implementation for this host")?,
    };
    let settings = InstallSettings {
        http_port: port,
        disable_setup_wizard: !keep_wizard,
        ..InstallSettings::default()
    };
    Ok(SequenceContext::new(settings, platform))
}
