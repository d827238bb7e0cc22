//! Capability seam for picture-in-picture style secondary outputs.

use serde::{Deserialize, Serialize};

use crate::configs::PlatformConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipSupport {
    /// The platform's own media-session mini player.
    Native,
    Standard,
    Unsupported,
}

pub trait PlatformCapabilities: Send + Sync {
    fn supports_native_pip(&self) -> bool;
    fn supports_standard_pip(&self) -> bool;

    fn pip_support(&self) -> PipSupport {
        if self.supports_native_pip() {
            PipSupport::Native
        } else if self.supports_standard_pip() {
            PipSupport::Standard
        } else {
            PipSupport::Unsupported
        }
    }
}

/// Capabilities fixed at startup from `[platform]`.
#[derive(Debug, Clone)]
pub struct StaticPlatform {
    native: bool,
    standard: bool,
}

impl StaticPlatform {
    pub fn from_config(config: &PlatformConfig) -> Self {
        Self {
            native: config.native_pip,
            standard: config.standard_pip,
        }
    }
}

impl PlatformCapabilities for StaticPlatform {
    fn supports_native_pip(&self) -> bool {
        self.native
    }

    fn supports_standard_pip(&self) -> bool {
        self.standard
    }
}

/// Transitions reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentEvent {
    Backgrounded,
    Foregrounded,
    InterruptionBegan,
    InterruptionEnded,
    /// The consuming surface left picture-in-picture on its own.
    SurfaceLeftPip,
}
