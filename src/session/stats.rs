use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal state of one session task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
}

impl TaskOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }
}

/// Aggregated result of a recording session: per-task outcomes and the
/// artifacts that were actually produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,

    /// When the session started.
    pub started_at: DateTime<Utc>,

    /// Wall-clock time the session ran for, in seconds.
    pub duration_secs: f64,

    pub playback: TaskOutcome,
    pub audio: TaskOutcome,
    pub screen: TaskOutcome,

    pub audio_path: Option<PathBuf>,
    pub video_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub muxed_path: Option<PathBuf>,
}

impl SessionResult {
    pub fn all_tasks_ok(&self) -> bool {
        self.playback.is_ok() && self.audio.is_ok() && self.screen.is_ok()
    }
}
