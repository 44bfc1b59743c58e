use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Immutable tool configuration.
///
/// Every knob has a default so the config file is optional; a file under the
/// given stem overrides individual keys.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    pub audio: AudioConfig,
    pub screen: ScreenConfig,
    pub analysis: AnalysisConfig,
    pub playback: PlaybackConfig,
    pub network: NetworkConfig,
    pub mux: MuxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory all artifacts are written to.
    pub dir: PathBuf,
    pub audio_file: String,
    pub video_file: String,
    pub report_file: String,
    pub muxed_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenConfig {
    /// Capture rate requested from the backend; the persisted rate is the
    /// realized one computed from the captured timestamps.
    pub target_fps: u32,
    /// Frame rate written when no frames were captured.
    pub fallback_fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Loudness bucket length in seconds.
    pub bucket_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    pub site_url: String,
    pub load_retries: u32,
    pub load_retry_wait_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// TCP endpoint probed before the session starts (public DNS by default).
    pub probe_target: String,
    pub probe_timeout_secs: u64,
    pub probe_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MuxConfig {
    /// Merge audio and video into a single file after capture.
    pub enabled: bool,
    /// Keep the intermediate audio/video files after a successful merge.
    /// A failed merge always keeps them.
    pub keep_intermediates: bool,
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("output.dir", ".")?
            .set_default("output.audio_file", "audio.wav")?
            .set_default("output.video_file", "video.mp4")?
            .set_default("output.report_file", "audio_levels.csv")?
            .set_default("output.muxed_file", "recording.mp4")?
            .set_default("audio.sample_rate", 48_000)?
            .set_default("screen.target_fps", 30)?
            .set_default("screen.fallback_fps", 60.0)?
            .set_default("analysis.bucket_secs", 1.0)?
            .set_default("playback.site_url", "https://www.youtube.com")?
            .set_default("playback.load_retries", 3)?
            .set_default("playback.load_retry_wait_secs", 5)?
            .set_default("network.probe_target", "8.8.8.8:53")?
            .set_default("network.probe_timeout_secs", 5)?
            .set_default("network.probe_retries", 2)?
            .set_default("mux.enabled", true)?
            .set_default("mux.keep_intermediates", false)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.audio_file)
    }

    pub fn video_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.video_file)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.report_file)
    }

    pub fn muxed_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.muxed_file)
    }
}
