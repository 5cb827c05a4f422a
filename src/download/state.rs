//! Download progress snapshots and their human-readable formatting.

use serde::{Deserialize, Serialize};

use crate::adapters::{DownloadStatus, EngineDownload};

const UNITS: [&str; 7] = ["bytes", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Latest known progress of one download.
///
/// Snapshots are never mutated after publication; every poll builds a new one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DownloadState {
    /// Percent complete (0-100, 3 significant digits)
    pub progress: f64,

    /// e.g. "954 MB"
    pub completed_size: String,

    /// e.g. "1.5 MB/s"
    pub download_speed: String,

    pub paused: bool,
}

impl DownloadState {
    /// Placeholder for a download restored at startup, before the first poll
    pub fn paused_placeholder() -> Self {
        Self {
            paused: true,
            ..Self::default()
        }
    }

    /// Build a snapshot from a fresh engine report
    pub fn from_engine(info: &EngineDownload) -> Self {
        let progress = if info.total_length == 0 {
            0.0
        } else {
            round_significant(info.completed_length as f64 / info.total_length as f64 * 100.0, 3)
        };

        Self {
            progress,
            completed_size: convert_to_units(info.completed_length),
            download_speed: format!("{}/s", convert_to_units(info.download_speed)),
            paused: info.status == DownloadStatus::Paused,
        }
    }
}

/// Render a byte count in the largest unit that keeps the value under 1024
/// (or in EB when even that is exceeded), rounded to 3 significant digits.
pub fn convert_to_units(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", round_significant(value, 3), UNITS[unit])
}

/// Round `value` to `digits` significant digits
pub fn round_significant(value: f64, digits: usize) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    // Scientific formatting rounds the mantissa for us
    format!("{:.*e}", digits.saturating_sub(1), value)
        .parse()
        .unwrap_or(value)
}
