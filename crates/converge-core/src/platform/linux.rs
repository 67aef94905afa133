//! apt/systemd implementation for Ubuntu 22.04 LTS.
//!
//! Port and setup-wizard settings converge through a systemd drop-in
//! override rather than edits to `/etc/default/jenkins`, so the base file
//! shipped by the package stays untouched. The drop-in is why the sequence
//! carries a triggered `reload-daemon` step: systemd only sees a new
//! override after `daemon-reload`.

use super::{Package, PlatformOps};
use crate::context::InstallSettings;
use crate::error::{ConvergeError, Result};
use crate::exec;
use crate::io;
use std::path::{Path, PathBuf};

const JAVA_PACKAGE: &str = "openjdk-17-jdk";
const JENKINS_PACKAGE: &str = "jenkins";

const KEY_URL: &str = "https://pkg.jenkins.io/debian-stable/jenkins.io-2023.key";
const KEYRING_PATH: &str = "/usr/share/keyrings/jenkins-keyring.asc";
const SOURCES_PATH: &str = "/etc/apt/sources.list.d/jenkins.list";
const SOURCES_LINE: &str = "deb [signed-by=/usr/share/keyrings/jenkins-keyring.asc] https://pkg.jenkins.io/debian-stable binary/";

const OVERRIDE_PATH: &str = "/etc/systemd/system/jenkins.service.d/override.conf";
const WIZARD_FLAG: &str = "-Djenkins.install.runSetupWizard=false";

const OS_RELEASE_PATH: &str = "/etc/os-release";

pub struct LinuxPlatform {
    /// Filesystem prefix, `/` in production. Tests point this at a tempdir.
    root: PathBuf,
    /// apt index refreshed at most once per invocation, and again after the
    /// package source changes.
    index_fresh: bool,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPlatform {
    pub fn new() -> Self {
        Self::rooted("/")
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_fresh: false,
        }
    }

    fn path(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    fn key_download_path(&self) -> PathBuf {
        std::env::temp_dir().join("jenkins.io-2023.key")
    }

    fn refresh_index(&mut self) -> Result<()> {
        exec::run("apt-get", &["update", "-qq"])?;
        self.index_fresh = true;
        Ok(())
    }

    fn keyring_valid(&self) -> Result<bool> {
        let path = self.path(KEYRING_PATH);
        match std::fs::read(&path) {
            // ASCII-armored files start with "-----BEGIN"; a valid binary
            // keyring does not.
            Ok(bytes) => Ok(!bytes.is_empty() && !bytes.starts_with(b"-----")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn sources_present(&self) -> Result<bool> {
        let path = self.path(SOURCES_PATH);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content.lines().any(|l| l.trim() == SOURCES_LINE)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn override_path(&self) -> PathBuf {
        self.path(OVERRIDE_PATH)
    }
}

/// Drop-in content for the desired end-state.
pub fn override_content(settings: &InstallSettings) -> String {
    let mut content = format!(
        "[Service]\nEnvironment=\"JENKINS_PORT={}\"\n",
        settings.http_port
    );
    if settings.disable_setup_wizard {
        content.push_str(&format!("Environment=\"JAVA_OPTS={WIZARD_FLAG}\"\n"));
    }
    content
}

impl PlatformOps for LinuxPlatform {
    fn name(&self) -> &'static str {
        "linux (apt/systemd)"
    }

    fn preflight(&self) -> Result<()> {
        // Missing os-release reads as empty, which also fails the gate.
        let release = std::fs::read_to_string(self.path(OS_RELEASE_PATH)).unwrap_or_default();
        if release.contains("Ubuntu") {
            Ok(())
        } else {
            Err(ConvergeError::Unsupported(
                "host is not Ubuntu (this installer targets Ubuntu 22.04)".to_string(),
            ))
        }
    }

    fn package_installed(&self, package: Package) -> Result<bool> {
        let name = match package {
            Package::Java => JAVA_PACKAGE,
            Package::Jenkins => JENKINS_PACKAGE,
        };
        let out = exec::run_status("dpkg-query", &["-W", "-f=${Status}", name])?;
        Ok(out.success && out.stdout.contains("install ok installed"))
    }

    fn install_package(&mut self, package: Package) -> Result<()> {
        if !self.index_fresh {
            self.refresh_index()?;
        }
        let name = match package {
            Package::Java => JAVA_PACKAGE,
            Package::Jenkins => JENKINS_PACKAGE,
        };
        exec::run("apt-get", &["install", "-y", "-qq", name])?;
        Ok(())
    }

    fn package_source_ready(&self) -> Result<bool> {
        Ok(self.keyring_valid()? && self.sources_present()?)
    }

    fn ensure_package_source(&mut self) -> Result<()> {
        if !self.keyring_valid()? {
            let download = self.key_download_path();
            let download_str = download.to_string_lossy().into_owned();
            exec::run("curl", &["-fsSL", KEY_URL, "-o", &download_str])?;

            let keyring = self.path(KEYRING_PATH);
            io::ensure_dir(keyring.parent().unwrap_or(Path::new("/")))?;
            exec::run(
                "gpg",
                &[
                    "--batch",
                    "--yes",
                    "--dearmor",
                    "-o",
                    &keyring.to_string_lossy(),
                    &download_str,
                ],
            )?;
            let _ = std::fs::remove_file(&download);
        }

        let mut line = SOURCES_LINE.to_string();
        line.push('\n');
        io::write_if_different(&self.path(SOURCES_PATH), line.as_bytes(), Some(0o644))?;

        // New key or repo entry: the jenkins package only becomes visible
        // after the next index refresh.
        self.index_fresh = false;
        Ok(())
    }

    fn discard_source_artifacts(&mut self) {
        let _ = std::fs::remove_file(self.key_download_path());
    }

    fn config_satisfied(&self, settings: &InstallSettings) -> Result<bool> {
        match std::fs::read_to_string(self.override_path()) {
            Ok(current) => Ok(current == override_content(settings)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn apply_config(&mut self, settings: &InstallSettings) -> Result<bool> {
        io::write_if_different(
            &self.override_path(),
            override_content(settings).as_bytes(),
            Some(0o644),
        )
    }

    fn service_running(&self, service: &str) -> Result<bool> {
        let out = exec::run_status("systemctl", &["is-active", service])?;
        Ok(out.stdout_trimmed() == "active")
    }

    fn service_enabled(&self, service: &str) -> Result<bool> {
        let out = exec::run_status("systemctl", &["is-enabled", service])?;
        Ok(out.stdout_trimmed() == "enabled")
    }

    fn enable_service(&mut self, service: &str) -> Result<()> {
        exec::run("systemctl", &["enable", service])?;
        Ok(())
    }

    fn start_service(&mut self, service: &str) -> Result<()> {
        exec::run("systemctl", &["start", service])?;
        Ok(())
    }

    fn restart_service(&mut self, service: &str) -> Result<()> {
        exec::run("systemctl", &["restart", service])?;
        Ok(())
    }

    fn reload_manager(&mut self) -> Result<()> {
        exec::run("systemctl", &["daemon-reload"])?;
        Ok(())
    }
}
