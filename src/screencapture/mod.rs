//! Screen recording via scap.
//!
//! Frames are buffered in memory with their capture offsets, then persisted
//! in one pass at the realized frame rate (frames / last offset) so playback
//! speed matches wall-clock even when capture ran slower than requested.

use anyhow::{bail, Context, Result};
use scap::capturer::{Capturer, Options, Resolution};
use scap::frame::{Frame, FrameType};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::media;

/// A captured frame: BGRA pixels plus the wall-clock offset from task start.
pub struct TimedFrame {
    pub data: Vec<u8>,
    pub offset: Duration,
}

pub struct ScreenCapture {
    target_fps: u32,
    fallback_fps: f64,
    output_path: PathBuf,
}

impl ScreenCapture {
    pub fn new(target_fps: u32, fallback_fps: f64, output_path: PathBuf) -> Self {
        Self {
            target_fps,
            fallback_fps,
            output_path,
        }
    }

    /// Capture the primary display until `duration` elapses or `cancel` is
    /// observed, then encode the buffered frames. Blocking; the session runs
    /// it on the blocking pool. Zero captured frames is an error and produces
    /// no file.
    pub fn record(&self, duration: Duration, cancel: &CancelToken) -> Result<PathBuf> {
        if !scap::is_supported() {
            bail!("Screen capture is not supported on this platform");
        }
        if !scap::has_permission() && !scap::request_permission() {
            bail!("Screen recording permission not granted");
        }

        let options = Options {
            fps: self.target_fps,
            target: None, // primary display
            show_cursor: true,
            show_highlight: false,
            excluded_targets: None,
            output_type: FrameType::BGRAFrame,
            output_resolution: Resolution::Captured,
            ..Default::default()
        };

        let mut capturer = Capturer::build(options)
            .map_err(|e| anyhow::anyhow!("Failed to create screen capturer: {:?}", e))?;
        capturer.start_capture();

        info!(
            "Starting screen capture for {:.0}s at {} fps (requested)",
            duration.as_secs_f64(),
            self.target_fps
        );

        let start = Instant::now();
        let mut frames: Vec<TimedFrame> = Vec::new();
        let mut dimensions: Option<(u32, u32)> = None;

        while start.elapsed() < duration && !cancel.is_cancelled() {
            match capturer.get_next_frame() {
                Ok(frame) => {
                    let Some((width, height, data)) = frame_to_bgra(frame) else {
                        warn!("Skipping frame with unexpected type");
                        continue;
                    };

                    let (w, h) = *dimensions.get_or_insert((width, height));
                    if data.len() != (w * h * 4) as usize {
                        // scap occasionally hands back empty or truncated
                        // buffers; skip them to keep the encoder in sync.
                        continue;
                    }

                    frames.push(TimedFrame {
                        data,
                        offset: start.elapsed(),
                    });
                }
                Err(e) => {
                    warn!("Screen capture error: {:?}", e);
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        capturer.stop_capture();

        if frames.is_empty() {
            bail!("No frames captured");
        }
        let (width, height) = dimensions.context("No frame dimensions recorded")?;

        let last_offset = frames.last().map(|f| f.offset).unwrap_or_default();
        let fps = realized_fps(frames.len(), last_offset, self.fallback_fps);

        info!(
            "Screen capture complete: {} frames in {:.1}s ({:.2} fps realized)",
            frames.len(),
            last_offset.as_secs_f64(),
            fps
        );

        self.persist(&frames, width, height, fps)?;
        Ok(self.output_path.clone())
    }

    fn persist(&self, frames: &[TimedFrame], width: u32, height: u32, fps: f64) -> Result<()> {
        // Stream the captured buffers as-is; duplicating minutes of BGRA
        // frames would double peak memory right at the end of the capture.
        media::encode_bgra_frames(
            frames.iter().map(|f| f.data.as_slice()),
            width,
            height,
            fps,
            &self.output_path,
        )
    }
}

/// Realized frame rate: frame count over the last frame's offset, with a
/// fallback when nothing was captured or no time elapsed.
pub fn realized_fps(frame_count: usize, last_offset: Duration, fallback: f64) -> f64 {
    let elapsed = last_offset.as_secs_f64();
    if frame_count > 0 && elapsed > 0.0 {
        frame_count as f64 / elapsed
    } else {
        fallback
    }
}

/// Normalize whatever pixel ordering the backend produced to the BGRA byte
/// order the encoder is configured for.
fn frame_to_bgra(frame: Frame) -> Option<(u32, u32, Vec<u8>)> {
    match frame {
        Frame::BGRA(f) => Some((f.width as u32, f.height as u32, f.data)),
        // BGR0/BGRx carry an ignored fourth byte where alpha sits.
        Frame::BGR0(f) => Some((f.width as u32, f.height as u32, f.data)),
        Frame::BGRx(f) => Some((f.width as u32, f.height as u32, f.data)),
        Frame::RGB(f) => {
            let data = rgb_to_bgra(&f.data);
            Some((f.width as u32, f.height as u32, data))
        }
        Frame::RGBx(f) => {
            let data = swap_rb_in_place(f.data);
            Some((f.width as u32, f.height as u32, data))
        }
        Frame::XBGR(f) => {
            // X,B,G,R per pixel -> B,G,R,A
            let mut data = Vec::with_capacity(f.data.len());
            for px in f.data.chunks_exact(4) {
                data.extend_from_slice(&[px[1], px[2], px[3], 255]);
            }
            Some((f.width as u32, f.height as u32, data))
        }
        _ => None,
    }
}

fn rgb_to_bgra(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        out.extend_from_slice(&[px[2], px[1], px[0], 255]);
    }
    out
}

fn swap_rb_in_place(mut data: Vec<u8>) -> Vec<u8> {
    for px in data.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realized_fps_from_timestamps() {
        // 90 frames with the last one at t=3s -> 30 fps.
        let fps = realized_fps(90, Duration::from_secs(3), 60.0);
        assert!((fps - 30.0).abs() < 1e-9);
    }

    #[test]
    fn realized_fps_falls_back_on_zero_frames() {
        assert_eq!(realized_fps(0, Duration::from_secs(3), 60.0), 60.0);
    }

    #[test]
    fn realized_fps_falls_back_on_zero_elapsed() {
        assert_eq!(realized_fps(10, Duration::ZERO, 60.0), 60.0);
    }

    #[test]
    fn rgb_conversion_swaps_channels_and_adds_alpha() {
        let rgb = [10u8, 20, 30];
        assert_eq!(rgb_to_bgra(&rgb), vec![30, 20, 10, 255]);
    }

    #[test]
    fn rgbx_conversion_swaps_in_place() {
        let rgbx = vec![10u8, 20, 30, 255];
        assert_eq!(swap_rb_in_place(rgbx), vec![30, 20, 10, 255]);
    }
}
