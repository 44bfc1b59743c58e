//! Browser-side playback of a searched video.
//!
//! The session only depends on the `PlaybackDriver` trait; the production
//! implementation drives a visible Chromium over CDP.

mod browser;

pub use browser::BrowserDriver;

use anyhow::Result;
use std::time::Duration;

use crate::cancel::CancelToken;

/// Contract the recording session relies on: search the site for `query`,
/// start one uniformly-random result playing, and keep it playing (dismissing
/// interstitial dialogs) until `duration` elapses or `cancel` fires.
///
/// Implementations report failure through the `Result`; they never panic
/// across the session boundary.
#[async_trait::async_trait]
pub trait PlaybackDriver: Send + Sync {
    async fn play(&self, query: &str, duration: Duration, cancel: CancelToken) -> Result<()>;
}
