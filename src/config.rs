use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::osc::bundle::{MAX_BUNDLE_SIZE, MESSAGE_SIZE_ESTIMATE};
use crate::session::worker::{DEFAULT_LIVENESS_PERIOD, DEFAULT_MAX_RETRIES};
use crate::session::{SessionSettings, DEFAULT_MAX_SESSIONS};

pub const DEFAULT_CONFIG_PATH: &str = "kinect_osc.toml";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub frames: FramesConfig,
    #[serde(default)]
    pub session: SessionConfigSection,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub orientation: OrientationConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ControlConfig {
    /// UDP address for inbound control messages
    #[serde(default = "default_control_addr")]
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FramesConfig {
    /// TCP address the sensor bridge connects to
    #[serde(default = "default_frames_addr")]
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SessionConfigSection {
    #[serde(default = "default_liveness_period_ms")]
    pub liveness_period_ms: u64,
    /// Silent periods tolerated before a session is ended
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BundleConfig {
    #[serde(default = "default_max_bundle_size")]
    pub max_bundle_size: usize,
    #[serde(default = "default_message_size_estimate")]
    pub message_size_estimate: usize,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct OrientationConfig {
    /// Start with the two performers' slots exchanged
    #[serde(default)]
    pub dancer_swap: bool,
}

fn default_control_addr() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 8000)) }
fn default_frames_addr() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 9000)) }
fn default_liveness_period_ms() -> u64 { DEFAULT_LIVENESS_PERIOD.as_millis() as u64 }
fn default_max_retries() -> u32 { DEFAULT_MAX_RETRIES }
fn default_max_sessions() -> usize { DEFAULT_MAX_SESSIONS }
fn default_max_bundle_size() -> usize { MAX_BUNDLE_SIZE }
fn default_message_size_estimate() -> usize { MESSAGE_SIZE_ESTIMATE }

impl Default for ControlConfig {
    fn default() -> Self {
        Self { listen_addr: default_control_addr() }
    }
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self { listen_addr: default_frames_addr() }
    }
}

impl Default for SessionConfigSection {
    fn default() -> Self {
        Self {
            liveness_period_ms: default_liveness_period_ms(),
            max_retries: default_max_retries(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_bundle_size: default_max_bundle_size(),
            message_size_estimate: default_message_size_estimate(),
        }
    }
}

impl SessionConfigSection {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            liveness_period: Duration::from_millis(self.liveness_period_ms),
            max_retries: self.max_retries,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Missing or broken file falls back to defaults with a warning
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }
}
