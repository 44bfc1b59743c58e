pub mod analysis;
pub mod audio;
pub mod cancel;
pub mod config;
pub mod media;
pub mod net;
pub mod playback;
pub mod retry;
pub mod screencapture;
pub mod session;

pub use analysis::{LoudnessAnalyzer, LoudnessBucket};
pub use audio::{AudioCapture, AudioFile};
pub use cancel::CancelToken;
pub use config::Config;
pub use playback::{BrowserDriver, PlaybackDriver};
pub use screencapture::ScreenCapture;
pub use session::{RecordingSession, SessionConfig, SessionResult, TaskOutcome};
