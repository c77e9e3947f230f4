//! Capture session configuration.

use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{GifSnapError, GifSnapResult};

/// Default depth of the upstream frame pool.
pub const DEFAULT_FRAME_POOL_DEPTH: usize = 2;

/// Centralized capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Number of frames the capture source may hold before dropping the
    /// oldest (1-8).
    pub frame_pool_depth: usize,

    /// GIF quality (1-100). Below 50 the encoder uses its fast mode.
    pub gif_quality: u32,

    /// Reissue the last frame when nothing new arrived for this long
    /// (10-1000 ms). None = no cadence driver.
    pub repeat_interval_ms: Option<u64>,

    /// Maximum number of frames handed to the encoder. None = unlimited.
    pub max_frames: Option<usize>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_pool_depth: DEFAULT_FRAME_POOL_DEPTH,
            gif_quality: 80,
            repeat_interval_ms: None,
            max_frames: None,
        }
    }
}

impl CaptureConfig {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.frame_pool_depth = self.frame_pool_depth.clamp(1, 8);
        self.gif_quality = self.gif_quality.clamp(1, 100);
        self.repeat_interval_ms = self.repeat_interval_ms.map(|ms| ms.clamp(10, 1000));
        if self.max_frames == Some(0) {
            self.max_frames = None;
        }
    }

    pub fn repeat_interval(&self) -> Option<Duration> {
        self.repeat_interval_ms.map(Duration::from_millis)
    }

    /// Load a config from a JSON file. Missing fields take their defaults and
    /// out-of-range values are clamped.
    pub fn load(path: &Path) -> GifSnapResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            GifSnapError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: CaptureConfig = serde_json::from_str(&json)?;
        config.validate();
        Ok(config)
    }

    /// Save the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> GifSnapResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

lazy_static! {
    /// Global capture configuration.
    ///
    /// # Example
    /// ```ignore
    /// {
    ///     let mut config = CAPTURE_CONFIG.write();
    ///     config.gif_quality = 90;
    ///     config.repeat_interval_ms = Some(100);
    /// }
    /// let snapshot = CAPTURE_CONFIG.read().clone();
    /// ```
    pub static ref CAPTURE_CONFIG: RwLock<CaptureConfig> = RwLock::new(CaptureConfig::default());
}

/// Get the current frame pool depth.
pub fn get_frame_pool_depth() -> usize {
    CAPTURE_CONFIG.read().frame_pool_depth
}

/// Get the current repeat interval (None = disabled).
pub fn get_repeat_interval() -> Option<Duration> {
    CAPTURE_CONFIG.read().repeat_interval()
}

/// Replace the global config, clamping values first.
pub fn set_config(mut config: CaptureConfig) {
    config.validate();
    *CAPTURE_CONFIG.write() = config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.frame_pool_depth, 2);
        assert_eq!(config.gif_quality, 80);
        assert_eq!(config.repeat_interval(), None);
        assert_eq!(config.max_frames, None);
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = CaptureConfig {
            frame_pool_depth: 0,
            gif_quality: 250,
            repeat_interval_ms: Some(1),
            max_frames: Some(0),
        };
        config.validate();

        assert_eq!(config.frame_pool_depth, 1);
        assert_eq!(config.gif_quality, 100);
        assert_eq!(config.repeat_interval_ms, Some(10));
        assert_eq!(config.max_frames, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CaptureConfig = serde_json::from_str(r#"{"gifQuality": 40}"#).unwrap();
        assert_eq!(config.gif_quality, 40);
        assert_eq!(config.frame_pool_depth, DEFAULT_FRAME_POOL_DEPTH);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");

        let config = CaptureConfig {
            frame_pool_depth: 3,
            gif_quality: 60,
            repeat_interval_ms: Some(5000),
            max_frames: Some(300),
        };
        config.save(&path).unwrap();

        let loaded = CaptureConfig::load(&path).unwrap();
        assert_eq!(loaded.frame_pool_depth, 3);
        // Clamped on load
        assert_eq!(loaded.repeat_interval_ms, Some(1000));
        assert_eq!(loaded.max_frames, Some(300));
    }

    #[test]
    fn test_global_config_is_validated() {
        set_config(CaptureConfig {
            frame_pool_depth: 20,
            repeat_interval_ms: Some(50),
            ..Default::default()
        });
        assert_eq!(get_frame_pool_depth(), 8);
        assert_eq!(get_repeat_interval(), Some(Duration::from_millis(50)));

        set_config(CaptureConfig::default());
        assert_eq!(get_repeat_interval(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CaptureConfig::load(Path::new("/nonexistent/gifsnap.json")).unwrap_err();
        assert!(matches!(err, GifSnapError::ConfigError(_)));
    }
}
