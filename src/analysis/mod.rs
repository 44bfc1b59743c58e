//! Loudness analysis of a captured WAV file.
//!
//! The waveform is normalized, split into fixed-length buckets and reduced to
//! one sound-pressure-level value per bucket, written out as a CSV report.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::audio::AudioFile;

/// Reference pressure for SPL: 20 micropascals.
const REFERENCE_PRESSURE: f64 = 20e-6;

/// One row of the loudness report.
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessBucket {
    /// Bucket start offset in seconds.
    pub start_secs: f64,
    /// Sound pressure level in dB; `-inf` for a silent bucket.
    pub spl_db: f64,
}

pub struct LoudnessAnalyzer {
    /// Bucket length in seconds.
    bucket_secs: f64,
    report_path: PathBuf,
}

impl LoudnessAnalyzer {
    pub fn new(bucket_secs: f64, report_path: PathBuf) -> Self {
        Self {
            bucket_secs,
            report_path,
        }
    }

    /// Analyze `audio_path` and write the CSV report.
    ///
    /// Multi-channel input keeps only the first channel. An all-silent file
    /// is an explicit edge case: normalization is skipped (there is nothing
    /// to divide by) and every bucket reports `-inf`. A trailing partial
    /// bucket is discarded.
    pub fn analyze(&self, audio_path: &std::path::Path) -> Result<PathBuf> {
        info!("Analyzing audio loudness: {:?}", audio_path);

        let audio = AudioFile::open(audio_path)?;
        let samples = audio.first_channel();

        let samples_per_bucket = (self.bucket_secs * audio.sample_rate as f64) as usize;
        if samples_per_bucket == 0 {
            bail!("Bucket duration too small for sample rate {}", audio.sample_rate);
        }

        let normalized = normalize(&samples);
        let buckets = bucket_spl(&normalized, samples_per_bucket, self.bucket_secs);

        if buckets.is_empty() {
            warn!(
                "Audio shorter than one bucket ({} samples < {}); report will be empty",
                samples.len(),
                samples_per_bucket
            );
        }

        self.write_report(&buckets)?;
        info!(
            "Loudness report with {} buckets saved to {:?}",
            buckets.len(),
            self.report_path
        );
        Ok(self.report_path.clone())
    }

    fn write_report(&self, buckets: &[LoudnessBucket]) -> Result<()> {
        let file = File::create(&self.report_path)
            .with_context(|| format!("Failed to create report file: {:?}", self.report_path))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "bucket_start_secs,spl_db").context("Failed to write report header")?;
        for bucket in buckets {
            writeln!(writer, "{},{}", bucket.start_secs, bucket.spl_db)
                .context("Failed to write report row")?;
        }

        writer.flush().context("Failed to flush report file")?;
        Ok(())
    }
}

/// Scale samples into [-1, 1] by the maximum absolute value. A silent buffer
/// is returned unchanged so the caller never divides by zero.
fn normalize(samples: &[i16]) -> Vec<f64> {
    let max_abs = samples
        .iter()
        .map(|&s| (s as f64).abs())
        .fold(0.0f64, f64::max);

    if max_abs == 0.0 {
        return vec![0.0; samples.len()];
    }

    samples.iter().map(|&s| s as f64 / max_abs).collect()
}

/// Reduce the normalized stream to one SPL value per full bucket; a trailing
/// partial bucket is dropped.
fn bucket_spl(normalized: &[f64], samples_per_bucket: usize, bucket_secs: f64) -> Vec<LoudnessBucket> {
    normalized
        .chunks_exact(samples_per_bucket)
        .enumerate()
        .map(|(i, chunk)| LoudnessBucket {
            start_secs: i as f64 * bucket_secs,
            spl_db: spl_db(rms(chunk)),
        })
        .collect()
}

/// Root-mean-square amplitude of one bucket.
fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Sound pressure level in dB relative to 20 µPa; `-inf` for zero RMS.
fn spl_db(rms: f64) -> f64 {
    if rms > 0.0 {
        20.0 * (rms / REFERENCE_PRESSURE).log10()
    } else {
        f64::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_constant_signal() {
        let samples = vec![0.5; 100];
        assert!((rms(&samples) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rms_of_empty_slice_is_zero() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn spl_of_full_scale_signal() {
        // 20 * log10(1 / 20e-6) ~= 93.979 dB
        let spl = spl_db(1.0);
        assert!((spl - 93.9794).abs() < 1e-3);
    }

    #[test]
    fn spl_of_silence_is_negative_infinity() {
        assert_eq!(spl_db(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn normalize_scales_to_unit_peak() {
        let normalized = normalize(&[100, -200, 50]);
        assert_eq!(normalized, vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn normalize_leaves_silence_untouched() {
        assert_eq!(normalize(&[0, 0, 0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn partial_trailing_bucket_is_discarded() {
        // 10 samples, 4 per bucket -> 2 buckets, 2 samples dropped.
        let normalized = vec![1.0; 10];
        let buckets = bucket_spl(&normalized, 4, 1.0);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].start_secs, 0.0);
        assert_eq!(buckets[1].start_secs, 1.0);
    }
}
