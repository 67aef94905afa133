//! MSI / Service Control Manager implementation.
//!
//! Packages install from downloaded MSIs via `msiexec /qn`; the port and
//! setup-wizard settings converge by rewriting the `<arguments>` element of
//! the service wrapper's `jenkins.xml`. The SCM re-reads `jenkins.xml` when
//! the service restarts, so `reload_manager` is a no-op here and the
//! change-notification chain alone carries the restart.

use super::{Package, PlatformOps};
use crate::context::InstallSettings;
use crate::error::{ConvergeError, Result};
use crate::exec;
use crate::io;
use regex::Regex;
use std::path::PathBuf;

const JENKINS_MSI_URL: &str =
    "https://get.jenkins.io/windows-stable/jenkins.msi";
const JAVA_MSI_URL: &str =
    "https://github.com/adoptium/temurin17-binaries/releases/latest/download/OpenJDK17U-jdk_x64_windows_hotspot.msi";

const WIZARD_FLAG: &str = "-Djenkins.install.runSetupWizard=false";

pub struct WindowsPlatform {
    install_dir: PathBuf,
    download_dir: PathBuf,
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowsPlatform {
    pub fn new() -> Self {
        Self {
            install_dir: PathBuf::from(r"C:\Program Files\Jenkins"),
            download_dir: std::env::temp_dir(),
        }
    }

    fn msi_path(&self, package: Package) -> PathBuf {
        let file = match package {
            Package::Java => "temurin17-jdk.msi",
            Package::Jenkins => "jenkins.msi",
        };
        self.download_dir.join(file)
    }

    fn download_msi(&self, package: Package) -> Result<PathBuf> {
        let target = self.msi_path(package);
        // An existing download is reused; a partial one from an interrupted
        // run is removed by the cleanup hook, so presence means complete.
        if target.exists() {
            return Ok(target);
        }
        let url = match package {
            Package::Java => JAVA_MSI_URL,
            Package::Jenkins => JENKINS_MSI_URL,
        };
        exec::run(
            "powershell",
            &[
                "-NoProfile",
                "-Command",
                &format!(
                    "Invoke-WebRequest -Uri '{}' -OutFile '{}'",
                    url,
                    target.display()
                ),
            ],
        )?;
        Ok(target)
    }

    fn config_path(&self) -> PathBuf {
        self.install_dir.join("jenkins.xml")
    }
}

/// Rewrite the `<arguments>` element for the desired port and wizard
/// setting. Returns `None` when the content already satisfies `settings`.
pub fn rewrite_service_arguments(content: &str, settings: &InstallSettings) -> Option<String> {
    let port_re = Regex::new(r"--httpPort=\d+").expect("static regex");
    let desired_port = format!("--httpPort={}", settings.http_port);

    let mut updated = if port_re.is_match(content) {
        port_re.replace_all(content, desired_port.as_str()).into_owned()
    } else {
        content.replacen("</arguments>", &format!(" {desired_port}</arguments>"), 1)
    };

    if settings.disable_setup_wizard && !updated.contains(WIZARD_FLAG) {
        updated = updated.replacen("<arguments>", &format!("<arguments>{WIZARD_FLAG} "), 1);
    }

    if updated == content {
        None
    } else {
        Some(updated)
    }
}

fn arguments_satisfied(content: &str, settings: &InstallSettings) -> bool {
    content.contains(&format!("--httpPort={}", settings.http_port))
        && (!settings.disable_setup_wizard || content.contains(WIZARD_FLAG))
}

impl PlatformOps for WindowsPlatform {
    fn name(&self) -> &'static str {
        "windows (msi/sc)"
    }

    fn package_installed(&self, package: Package) -> Result<bool> {
        match package {
            Package::Java => Ok(which::which("java").is_ok()),
            Package::Jenkins => Ok(self.install_dir.join("jenkins.war").exists()),
        }
    }

    fn install_package(&mut self, package: Package) -> Result<()> {
        let msi = self.download_msi(package)?;
        exec::run(
            "msiexec",
            &["/i", &msi.to_string_lossy(), "/qn", "/norestart"],
        )?;
        Ok(())
    }

    fn package_source_ready(&self) -> Result<bool> {
        // No repository to configure; installers download on demand and an
        // already-present complete download satisfies the probe.
        Ok(self.msi_path(Package::Jenkins).exists())
    }

    fn ensure_package_source(&mut self) -> Result<()> {
        self.download_msi(Package::Jenkins)?;
        Ok(())
    }

    fn discard_source_artifacts(&mut self) {
        let _ = std::fs::remove_file(self.msi_path(Package::Jenkins));
        let _ = std::fs::remove_file(self.msi_path(Package::Java));
    }

    fn config_satisfied(&self, settings: &InstallSettings) -> Result<bool> {
        match std::fs::read_to_string(self.config_path()) {
            Ok(content) => Ok(arguments_satisfied(&content, settings)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn apply_config(&mut self, settings: &InstallSettings) -> Result<bool> {
        let path = self.config_path();
        let content = std::fs::read_to_string(&path).map_err(|e| ConvergeError::CommandFailed {
            command: format!("read {}", path.display()),
            detail: format!("jenkins.xml not found ({e}); is Jenkins installed?"),
        })?;
        match rewrite_service_arguments(&content, settings) {
            Some(updated) => {
                io::atomic_write(&path, updated.as_bytes())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn service_running(&self, service: &str) -> Result<bool> {
        let out = exec::run_status("sc.exe", &["query", service])?;
        Ok(out.success && out.stdout.contains("RUNNING"))
    }

    fn service_enabled(&self, service: &str) -> Result<bool> {
        let out = exec::run_status("sc.exe", &["qc", service])?;
        Ok(out.success && out.stdout.contains("AUTO_START"))
    }

    fn enable_service(&mut self, service: &str) -> Result<()> {
        exec::run("sc.exe", &["config", service, "start=", "auto"])?;
        Ok(())
    }

    fn start_service(&mut self, service: &str) -> Result<()> {
        if self.service_running(service)? {
            return Ok(());
        }
        exec::run("sc.exe", &["start", service])?;
        Ok(())
    }

    fn restart_service(&mut self, service: &str) -> Result<()> {
        exec::run(
            "powershell",
            &[
                "-NoProfile",
                "-Command",
                &format!("Restart-Service -Name '{service}' -Force"),
            ],
        )?;
        Ok(())
    }

    fn reload_manager(&mut self) -> Result<()> {
        // The SCM picks up jenkins.xml on the next service start.
        Ok(())
    }
}
