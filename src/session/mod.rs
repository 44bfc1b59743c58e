//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - Pre-flight cleanup and connectivity checks
//! - Concurrent playback, screen and audio capture tasks
//! - The shared deadline and cancellation token
//! - Post-capture loudness analysis and optional muxing

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::RecordingSession;
pub use stats::{SessionResult, TaskOutcome};
