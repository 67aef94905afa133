use crate::platform::PlatformOps;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// InstallSettings
// ---------------------------------------------------------------------------

/// Target end-state for the installation, threaded explicitly through step
/// evaluation instead of ambient global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallSettings {
    /// Port Jenkins itself binds to (not a proxy or a forward).
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Disable the first-run setup wizard for unattended installs.
    #[serde(default = "default_disable_wizard")]
    pub disable_setup_wizard: bool,
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_http_port() -> u16 {
    8000
}

fn default_disable_wizard() -> bool {
    true
}

fn default_service() -> String {
    "jenkins".to_string()
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            disable_setup_wizard: default_disable_wizard(),
            service: default_service(),
        }
    }
}

// ---------------------------------------------------------------------------
// SequenceContext
// ---------------------------------------------------------------------------

/// Everything a step may touch during evaluation: the desired end-state and
/// the platform capability implementation.
pub struct SequenceContext {
    pub settings: InstallSettings,
    pub platform: Box<dyn PlatformOps>,
}

impl SequenceContext {
    pub fn new(settings: InstallSettings, platform: Box<dyn PlatformOps>) -> Self {
        Self { settings, platform }
    }
}
