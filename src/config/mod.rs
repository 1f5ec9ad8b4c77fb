//! Configuration module
//!
//! Handles TOML configuration files and validation. Every section has defaults,
//! so an empty file (or `Config::default()`) is a working configuration.
//!
//! ```toml
//! [segmentation]
//! baseline_index = 1.0
//! z_scale = 0.5
//! min_index = 0.05
//! history_capacity = 16
//!
//! [network]
//! max_frame_bytes = 104857600
//! handshake_on_connect = false
//!
//! [logging]
//! level = "info"
//! ```

pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Performance index and history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Index of a system without history, and the center of the z-score mapping
    #[serde(default = "default_baseline_index")]
    pub baseline_index: f64,
    /// Index change per standard deviation of throughput
    #[serde(default = "default_z_scale")]
    pub z_scale: f64,
    /// Lowest index an available system can get
    #[serde(default = "default_min_index")]
    pub min_index: f64,
    /// Round trips remembered per system
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_baseline_index() -> f64 {
    1.0
}

fn default_z_scale() -> f64 {
    0.5
}

fn default_min_index() -> f64 {
    0.05
}

fn default_history_capacity() -> usize {
    16
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            baseline_index: default_baseline_index(),
            z_scale: default_z_scale(),
            min_index: default_min_index(),
            history_capacity: default_history_capacity(),
        }
    }
}

/// TCP transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Largest accepted frame payload
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Keep new slaves out of segmentation until they answer a handshake
    #[serde(default)]
    pub handshake_on_connect: bool,
}

fn default_max_frame_bytes() -> usize {
    100 * 1024 * 1024
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            handshake_on_connect: false,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Segmentation: {}", self.segmentation)?;
        writeln!(f, "  Network: {}", self.network)?;
        writeln!(f, "  Logging: level={}", self.logging.level)?;
        Ok(())
    }
}

impl fmt::Display for SegmentationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "baseline={}, z_scale={}, min_index={}, history={}",
            self.baseline_index, self.z_scale, self.min_index, self.history_capacity
        )
    }
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "max_frame={}", format_bytes(self.max_frame_bytes as u64))?;
        if self.handshake_on_connect {
            write!(f, ", handshake_on_connect")?;
        }
        Ok(())
    }
}

/// Format a byte count with a binary unit
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
