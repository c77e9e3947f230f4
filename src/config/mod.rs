//! Capture configuration management.
//!
//! `CaptureConfig` holds every tunable of a capture session: frame pool
//! depth, GIF quality, repeat cadence and frame cap. A global copy lives
//! behind `parking_lot::RwLock` for callers that want process-wide settings;
//! components also accept an explicit config.

pub mod capture;

pub use capture::{
    get_frame_pool_depth, get_repeat_interval, set_config, CaptureConfig, CAPTURE_CONFIG,
};
