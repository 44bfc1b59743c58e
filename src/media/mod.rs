//! FFmpeg child-process plumbing.
//!
//! Video encoding and audio/video muxing are delegated to an `ffmpeg` binary
//! on PATH: raw BGRA frames are piped to its stdin for encoding, and the mux
//! step runs it once over the two finished artifacts.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::info;

/// Verify an `ffmpeg` binary is runnable on PATH.
pub fn find_ffmpeg() -> Result<()> {
    let status = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("ffmpeg not found on PATH")?;

    if !status.success() {
        bail!("ffmpeg -version exited with {:?}", status.code());
    }
    Ok(())
}

/// Encode a sequence of BGRA frames into an H.264 MP4 at `fps`.
///
/// Frames must all be `width * height * 4` bytes; they are streamed to
/// ffmpeg in capture order straight from the caller's buffers, with no
/// filtering beyond the even-dimension pad yuv420p requires.
pub fn encode_bgra_frames<'a, I>(
    frames: I,
    width: u32,
    height: u32,
    fps: f64,
    output_path: &Path,
) -> Result<()>
where
    I: IntoIterator<Item = &'a [u8]>,
    I::IntoIter: ExactSizeIterator,
{
    let frames = frames.into_iter();
    if frames.len() == 0 {
        bail!("No frames to encode");
    }

    info!(
        "Encoding {} frames ({}x{}) at {:.2} fps -> {:?}",
        frames.len(),
        width,
        height,
        fps,
        output_path
    );

    let mut child = Command::new("ffmpeg")
        .args(encoder_args(width, height, fps))
        .arg(output_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        // Discard stderr to prevent pipe-buffer blocking.
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to spawn ffmpeg for video encoding")?;

    let mut stdin = child
        .stdin
        .take()
        .context("Failed to open ffmpeg stdin")?;

    let expected = (width * height * 4) as usize;
    let mut write_err = None;
    for frame in frames {
        if frame.len() != expected {
            write_err = Some(anyhow::anyhow!(
                "Frame size mismatch: expected {} bytes, got {}",
                expected,
                frame.len()
            ));
            break;
        }
        if let Err(e) = stdin.write_all(frame) {
            write_err = Some(anyhow::Error::new(e).context("Failed to write frame to ffmpeg"));
            break;
        }
    }

    // EOF tells ffmpeg to finalize the file. The child is reaped even when
    // the write loop stopped short.
    drop(stdin);
    let status = child.wait().context("Failed to wait for ffmpeg")?;

    if let Some(e) = write_err {
        return Err(e);
    }
    if !status.success() {
        bail!("ffmpeg encoding exited with {:?}", status.code());
    }

    info!("Video saved to {:?}", output_path);
    Ok(())
}

/// Merge a video file and an audio file into one MP4, copying the video
/// stream and encoding audio to AAC. The inputs are left in place; the
/// session decides whether to delete them afterwards.
pub fn mux_audio_video(video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
    info!(
        "Muxing {:?} + {:?} -> {:?}",
        video_path, audio_path, output_path
    );

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(video_path)
        .arg("-i")
        .arg(audio_path)
        .args(["-c:v", "copy", "-c:a", "aac", "-shortest"])
        .arg(output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("Failed to run ffmpeg for muxing")?;

    if !status.success() {
        bail!("ffmpeg mux exited with {:?}", status.code());
    }

    info!("Muxed output saved to {:?}", output_path);
    Ok(())
}

fn encoder_args(width: u32, height: u32, fps: f64) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "bgra".into(),
        "-s".into(),
        format!("{}x{}", width, height),
        "-r".into(),
        format!("{:.3}", fps),
        "-i".into(),
        "pipe:0".into(),
        // yuv420p needs even dimensions; pad by at most one pixel.
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_args_carry_geometry_and_rate() {
        let args = encoder_args(1920, 1080, 29.97);

        assert!(args.contains(&"1920x1080".to_string()));
        assert!(args.contains(&"29.970".to_string()));
        assert!(args.contains(&"rawvideo".to_string()));
        assert!(args.contains(&"bgra".to_string()));
    }

    #[test]
    fn encode_rejects_empty_frame_list() {
        let result = encode_bgra_frames(
            std::iter::empty::<&[u8]>(),
            640,
            480,
            30.0,
            Path::new("/tmp/never.mp4"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn encode_streams_borrowed_buffers() {
        // The encoder takes the capture buffers by reference; a wrong-sized
        // frame is rejected without consuming them.
        let frames = vec![vec![0u8; 10]];
        let result = encode_bgra_frames(
            frames.iter().map(|f| f.as_slice()),
            640,
            480,
            30.0,
            Path::new("/tmp/never.mp4"),
        );

        assert!(result.is_err());
        assert_eq!(frames.len(), 1, "caller keeps ownership of the buffers");
    }
}
