//! Configuration validation

use super::*;
use anyhow::Result;

/// Levels accepted by the log filter
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_segmentation(&config.segmentation)?;
    validate_network(&config.network)?;
    validate_logging(&config.logging)?;
    Ok(())
}

/// Validate segmentation configuration
pub fn validate_segmentation(segmentation: &SegmentationConfig) -> Result<()> {
    // Indices must stay positive so every available system gets some work
    if !(segmentation.baseline_index.is_finite() && segmentation.baseline_index > 0.0) {
        anyhow::bail!(
            "baseline_index must be a positive number, got {}",
            segmentation.baseline_index
        );
    }

    if !(segmentation.min_index.is_finite() && segmentation.min_index > 0.0) {
        anyhow::bail!("min_index must be a positive number, got {}", segmentation.min_index);
    }

    if segmentation.min_index > segmentation.baseline_index {
        anyhow::bail!(
            "min_index ({}) must not exceed baseline_index ({})",
            segmentation.min_index,
            segmentation.baseline_index
        );
    }

    if !(segmentation.z_scale.is_finite() && segmentation.z_scale >= 0.0) {
        anyhow::bail!("z_scale must be a non-negative number, got {}", segmentation.z_scale);
    }

    if segmentation.history_capacity == 0 {
        anyhow::bail!("history_capacity must be at least 1");
    }

    Ok(())
}

/// Validate network configuration
pub fn validate_network(network: &NetworkConfig) -> Result<()> {
    if network.max_frame_bytes == 0 {
        anyhow::bail!("max_frame_bytes must be at least 1");
    }

    // The length prefix is a u32
    if network.max_frame_bytes > u32::MAX as usize {
        anyhow::bail!(
            "max_frame_bytes must fit the 4-byte length prefix, got {}",
            network.max_frame_bytes
        );
    }

    Ok(())
}

/// Validate logging configuration
pub fn validate_logging(logging: &LoggingConfig) -> Result<()> {
    let level = logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        anyhow::bail!(
            "log level must be one of {}, got '{}'",
            LOG_LEVELS.join(", "),
            logging.level
        );
    }
    Ok(())
}
