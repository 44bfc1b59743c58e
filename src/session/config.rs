use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Everything one recording session needs, resolved from the tool config and
/// the command line. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier, used in logs.
    pub session_id: String,

    /// Search text driving the playback task.
    pub query: String,

    /// Shared capture duration for all three tasks.
    pub duration: Duration,

    /// Audio capture sample rate in Hz.
    pub sample_rate: u32,

    /// Requested screen capture rate; persisted rate is the realized one.
    pub target_fps: u32,
    pub fallback_fps: f64,

    /// Loudness bucket length in seconds.
    pub bucket_secs: f64,

    pub audio_path: PathBuf,
    pub video_path: PathBuf,
    pub report_path: PathBuf,
    pub muxed_path: PathBuf,

    pub probe_target: String,
    pub probe_timeout: Duration,
    pub probe_retries: u32,

    pub mux_enabled: bool,
    pub keep_intermediates: bool,
}

impl SessionConfig {
    pub fn from_config(query: String, duration: Duration, cfg: &Config) -> Self {
        Self {
            session_id: format!("probe-{}", uuid::Uuid::new_v4()),
            query,
            duration,
            sample_rate: cfg.audio.sample_rate,
            target_fps: cfg.screen.target_fps,
            fallback_fps: cfg.screen.fallback_fps,
            bucket_secs: cfg.analysis.bucket_secs,
            audio_path: cfg.audio_path(),
            video_path: cfg.video_path(),
            report_path: cfg.report_path(),
            muxed_path: cfg.muxed_path(),
            probe_target: cfg.network.probe_target.clone(),
            probe_timeout: Duration::from_secs(cfg.network.probe_timeout_secs),
            probe_retries: cfg.network.probe_retries,
            mux_enabled: cfg.mux.enabled,
            keep_intermediates: cfg.mux.keep_intermediates,
        }
    }
}
