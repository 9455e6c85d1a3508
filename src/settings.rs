use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::node::{NodeOptions, NODE_RING_BUFFER_LENGTH};
use crate::protocol::{WorkerOptions, DEFAULT_CHANNEL_COUNT, DEFAULT_KERNEL_LENGTH};

/// Returns the path to the settings file: `~/.config/offload-rs/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("offload-rs");
    path.push("settings.json");
    path
}

/// Which built-in kernel the worker runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelChoice {
    #[default]
    Overdrive,
    Passthrough,
}

/// Where the demo host takes its input from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Default capture device, falling back to the sine if there is none
    #[default]
    Input,
    Sine,
}

/// Persisted session settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Shared buffers
    pub ring_buffer_length: usize,
    pub channel_count: usize,
    pub kernel_length: usize,

    // Timing
    pub wait_timeout_ms: u64,
    pub handshake_timeout_ms: u64,

    // Processing
    pub kernel: KernelChoice,

    // Demo host
    pub source: SourceMode,
    pub sine_frequency: f32,
    pub gain: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ring_buffer_length: NODE_RING_BUFFER_LENGTH,
            channel_count: DEFAULT_CHANNEL_COUNT,
            kernel_length: DEFAULT_KERNEL_LENGTH,

            wait_timeout_ms: 25_000,
            handshake_timeout_ms: 5_000,

            kernel: KernelChoice::default(),

            source: SourceMode::default(),
            sine_frequency: 400.0,
            gain: 1.0,
        }
    }
}

impl Settings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Session options for the controller
    pub fn node_options(&self) -> NodeOptions {
        NodeOptions {
            worker: WorkerOptions {
                ring_buffer_length: self.ring_buffer_length,
                channel_count: self.channel_count,
                kernel_length: self.kernel_length,
                wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            },
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        }
    }
}
