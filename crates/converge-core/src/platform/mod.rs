//! Platform capability interface.
//!
//! One installation sequence, parameterized over the small set of operations
//! that differ between operating systems: package ensure, package source,
//! config write, service ensure. Probes (`&self`) never mutate system state;
//! mutations (`&mut self`) surface the underlying tool's message verbatim on
//! failure.

use crate::context::InstallSettings;
use crate::error::Result;

mod linux;
mod windows;

pub use linux::LinuxPlatform;
pub use windows::WindowsPlatform;

/// Logical packages the sequence converges. Each platform maps these to its
/// own package names or installer artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Package {
    Java,
    Jenkins,
}

impl Package {
    pub fn as_str(&self) -> &'static str {
        match self {
            Package::Java => "java",
            Package::Jenkins => "jenkins",
        }
    }
}

pub trait PlatformOps {
    fn name(&self) -> &'static str;

    /// Host sanity check run before any step: refuse early with a clear
    /// message instead of letting the package manager fail mid-sequence.
    /// The default accepts any host.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    // -- Package manager ----------------------------------------------------

    /// Probe: is the package present? Inability to query the package
    /// database is an error, not "absent".
    fn package_installed(&self, package: Package) -> Result<bool>;

    fn install_package(&mut self, package: Package) -> Result<()>;

    // -- Package source -----------------------------------------------------

    /// Probe: signing key and repository entry in place (Linux), or
    /// installer artifacts retrievable (Windows).
    fn package_source_ready(&self) -> Result<bool>;

    fn ensure_package_source(&mut self) -> Result<()>;

    /// Best-effort removal of temporary download artifacts; invoked as a
    /// cleanup hook when a halt abandons the sequence.
    fn discard_source_artifacts(&mut self) {}

    // -- Configuration ------------------------------------------------------

    /// Probe: does the live config already declare the desired port and
    /// wizard setting?
    fn config_satisfied(&self, settings: &InstallSettings) -> Result<bool>;

    /// Converge the config. Returns whether file content actually changed.
    /// The installation sequence gates this call behind `config_satisfied`,
    /// so the change link fires off the step outcome, not this bool; callers
    /// invoking `apply_config` directly should consult it.
    fn apply_config(&mut self, settings: &InstallSettings) -> Result<bool>;

    // -- Service manager ----------------------------------------------------

    fn service_running(&self, service: &str) -> Result<bool>;
    fn service_enabled(&self, service: &str) -> Result<bool>;
    fn enable_service(&mut self, service: &str) -> Result<()>;
    fn start_service(&mut self, service: &str) -> Result<()>;

    /// Restart the service, starting it if stopped. A restart drops active
    /// connections, so callers reach it only when a probe found the service
    /// unhealthy or an upstream change demands a reload.
    fn restart_service(&mut self, service: &str) -> Result<()>;

    /// Make the service manager re-read unit definitions (systemd
    /// daemon-reload). No-op where the manager re-reads on restart.
    fn reload_manager(&mut self) -> Result<()>;
}

/// Pick the implementation for the host OS.
pub fn host_platform() -> Result<Box<dyn PlatformOps>> {
    if cfg!(target_os = "linux") {
        Ok(Box::new(LinuxPlatform::new()))
    } else if cfg!(target_os = "windows") {
        Ok(Box::new(WindowsPlatform::new()))
    } else {
        Err(crate::error::ConvergeError::Unsupported(
            std::env::consts::OS.to_string(),
        ))
    }
}

/// Resolve a `--platform` override by name.
pub fn platform_by_name(name: &str) -> Result<Box<dyn PlatformOps>> {
    match name {
        "linux" => Ok(Box::new(LinuxPlatform::new())),
        "windows" => Ok(Box::new(WindowsPlatform::new())),
        other => Err(crate::error::ConvergeError::Unsupported(other.to_string())),
    }
}
