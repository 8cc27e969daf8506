use std::path::PathBuf;
use std::time::Duration;

use crate::capture::{CaptureConfig, DEFAULT_MAX_DISTANCE};

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path. `None` runs sessions against a synthetic feed.
    pub camera_device: Option<String>,
    /// Base location the capability provider loads model assets from.
    pub asset_dir: PathBuf,
    /// Path to the SQLite database holding the roster.
    pub db_path: PathBuf,
    /// Directory attendance reports are written to.
    pub report_dir: PathBuf,
    /// Milliseconds between detection passes.
    pub poll_interval_ms: u64,
    /// Largest descriptor distance still counted as a match.
    pub max_distance: f32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .ok()
                .filter(|v| !v.is_empty()),
            asset_dir: env_path("ROLLCALL_ASSET_DIR", data_dir.join("models")),
            db_path: env_path("ROLLCALL_DB_PATH", data_dir.join("roster.db")),
            report_dir: env_path("ROLLCALL_REPORT_DIR", PathBuf::from(".")),
            poll_interval_ms: env_u64("ROLLCALL_POLL_INTERVAL_MS", 200),
            max_distance: env_f32("ROLLCALL_MAX_DISTANCE", DEFAULT_MAX_DISTANCE),
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            asset_base: self.asset_dir.to_string_lossy().into_owned(),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_distance: self.max_distance,
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
