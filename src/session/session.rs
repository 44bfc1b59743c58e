use super::config::SessionConfig;
use super::stats::{SessionResult, TaskOutcome};
use crate::analysis::LoudnessAnalyzer;
use crate::audio::AudioCapture;
use crate::cancel::CancelToken;
use crate::media;
use crate::net::check_reachability;
use crate::playback::PlaybackDriver;
use crate::retry::retry_with_backoff;
use crate::screencapture::ScreenCapture;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The session orchestrator.
///
/// Owns the single cancellation token, fans out the playback, screen and
/// audio tasks, enforces the shared deadline, and runs the post-processing
/// steps (loudness analysis, optional mux) over whatever artifacts the tasks
/// produced.
pub struct RecordingSession {
    config: SessionConfig,
    driver: Arc<dyn PlaybackDriver>,
    cancel: CancelToken,
}

impl RecordingSession {
    pub fn new(config: SessionConfig, driver: Arc<dyn PlaybackDriver>) -> Self {
        Self {
            config,
            driver,
            cancel: CancelToken::new(),
        }
    }

    /// Token handle for external cancellation (e.g. Ctrl-C).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the whole session.
    ///
    /// Pre-flight failures (stale-output cleanup, unreachable network,
    /// missing ffmpeg) return an error before any task is spawned. Task-local
    /// failures do not: every task is joined unconditionally and reported in
    /// the aggregated result.
    pub async fn run(&self) -> Result<SessionResult> {
        let started_at = Utc::now();
        info!(
            "Starting session {}: query {:?}, {}s",
            self.config.session_id,
            self.config.query,
            self.config.duration.as_secs()
        );

        self.clean_stale_outputs()
            .context("Pre-flight cleanup failed")?;

        retry_with_backoff(
            "Network reachability",
            self.config.probe_retries,
            Duration::from_secs(2),
            || check_reachability(&self.config.probe_target, self.config.probe_timeout),
        )
        .await
        .context("Network is unavailable")?;

        media::find_ffmpeg().context("ffmpeg is required for video output")?;

        let duration = self.config.duration;

        // Playback task (async, browser-bound).
        let driver = Arc::clone(&self.driver);
        let query = self.config.query.clone();
        let cancel = self.cancel.clone();
        let playback_task: JoinHandle<Result<()>> =
            tokio::spawn(async move { driver.play(&query, duration, cancel).await });
        info!("Playback task started");

        // Audio capture task (blocking pool; owns its buffer until handoff).
        let audio = AudioCapture::new(self.config.sample_rate, self.config.audio_path.clone());
        let cancel = self.cancel.clone();
        let audio_task: JoinHandle<Result<PathBuf>> =
            tokio::task::spawn_blocking(move || audio.record(duration, &cancel));
        info!("Audio capture task started");

        // Screen capture task (blocking pool; owns its frame sequence).
        let screen = ScreenCapture::new(
            self.config.target_fps,
            self.config.fallback_fps,
            self.config.video_path.clone(),
        );
        let cancel = self.cancel.clone();
        let screen_task: JoinHandle<Result<PathBuf>> =
            tokio::task::spawn_blocking(move || screen.record(duration, &cancel));
        info!("Screen capture task started");

        // Each task also watches the deadline itself; the token covers the
        // case where this wait finishes first, and an externally set token
        // (Ctrl-C) ends the wait early.
        wait_deadline(duration, &self.cancel).await;
        if self.cancel.is_cancelled() {
            info!("Stop requested before the deadline; signalling all tasks");
        } else {
            info!("Session duration elapsed; signalling all tasks to stop");
        }
        self.cancel.cancel();

        // Join unconditionally so no device or file handle outlives the
        // session, even when a sibling failed.
        let (playback, _) = join_outcome("Playback", playback_task).await;
        let (audio_outcome, audio_path) = join_outcome("Audio capture", audio_task).await;
        let (screen_outcome, video_path) = join_outcome("Screen capture", screen_task).await;

        let report_path = self.analyze(audio_path.as_deref());
        let muxed_path = self.mux(audio_path.as_deref(), video_path.as_deref());

        let result = SessionResult {
            session_id: self.config.session_id.clone(),
            started_at,
            duration_secs: (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
            playback,
            audio: audio_outcome,
            screen: screen_outcome,
            audio_path,
            video_path,
            report_path,
            muxed_path,
        };

        info!(
            "Session {} finished in {:.1}s (all tasks ok: {})",
            result.session_id,
            result.duration_secs,
            result.all_tasks_ok()
        );

        Ok(result)
    }

    /// Delete leftover artifacts from a previous run. Idempotent: missing
    /// files are skipped without error.
    pub fn clean_stale_outputs(&self) -> Result<()> {
        info!("Cleaning up stale output files");

        for path in [
            &self.config.audio_path,
            &self.config.video_path,
            &self.config.report_path,
            &self.config.muxed_path,
        ] {
            if path.exists() {
                std::fs::remove_file(path)
                    .with_context(|| format!("Failed to delete stale file: {:?}", path))?;
                info!("Deleted stale file: {:?}", path);
            }
        }

        Ok(())
    }

    /// Run loudness analysis if the audio file was produced; a missing file
    /// skips analysis rather than failing the session.
    fn analyze(&self, audio_path: Option<&Path>) -> Option<PathBuf> {
        let audio_path = match audio_path {
            Some(p) if p.exists() => p,
            _ => {
                warn!("Audio file missing; skipping loudness analysis");
                return None;
            }
        };

        let analyzer =
            LoudnessAnalyzer::new(self.config.bucket_secs, self.config.report_path.clone());
        match analyzer.analyze(audio_path) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Loudness analysis failed: {:#}", e);
                None
            }
        }
    }

    /// Mux audio and video into one file when both exist and muxing is
    /// enabled. A successful mux removes the intermediates unless configured
    /// otherwise; a failed mux always retains them for a manual retry.
    fn mux(&self, audio_path: Option<&Path>, video_path: Option<&Path>) -> Option<PathBuf> {
        if !self.config.mux_enabled {
            return None;
        }
        let (Some(audio), Some(video)) = (audio_path, video_path) else {
            warn!("Audio or video missing; skipping mux");
            return None;
        };

        match media::mux_audio_video(video, audio, &self.config.muxed_path) {
            Ok(()) => {
                if !self.config.keep_intermediates {
                    for path in [audio, video] {
                        if let Err(e) = std::fs::remove_file(path) {
                            warn!("Failed to remove intermediate {:?}: {}", path, e);
                        }
                    }
                }
                Some(self.config.muxed_path.clone())
            }
            Err(e) => {
                error!("Mux failed, intermediate files retained: {:#}", e);
                None
            }
        }
    }
}

/// Await one task handle, folding task errors and panics into a
/// `TaskOutcome` so a failing task never takes the session down.
async fn join_outcome<T>(name: &str, handle: JoinHandle<Result<T>>) -> (TaskOutcome, Option<T>) {
    match handle.await {
        Ok(Ok(value)) => {
            info!("{} task completed", name);
            (TaskOutcome::Completed, Some(value))
        }
        Ok(Err(e)) => {
            error!("{} task failed: {:#}", name, e);
            (TaskOutcome::Failed(format!("{:#}", e)), None)
        }
        Err(e) => {
            error!("{} task panicked: {}", name, e);
            (TaskOutcome::Failed(format!("task panicked: {}", e)), None)
        }
    }
}

/// How often the orchestrator re-checks the token while waiting out the
/// session duration.
const DEADLINE_POLL: Duration = Duration::from_millis(250);

/// Sleep until the deadline, waking early when the token is set from outside
/// the session (Ctrl-C).
async fn wait_deadline(duration: Duration, cancel: &CancelToken) {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(DEADLINE_POLL)).await;
    }
}
