// Integration tests for loudness analysis
//
// Each test generates a WAV fixture with hound, runs the analyzer end to end
// and checks the resulting CSV report.

use anyhow::Result;
use std::path::Path;
use tempfile::TempDir;
use vidprobe::analysis::LoudnessAnalyzer;

fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// 1200Hz square wave, so every 1-second bucket has the same RMS.
fn square_wave(amplitude: i16, freq_hz: u32, sample_rate: u32, secs: f64) -> Vec<i16> {
    let total = (sample_rate as f64 * secs) as usize;
    let half_period = sample_rate / (2 * freq_hz);
    (0..total)
        .map(|i| {
            if (i as u32 / half_period) % 2 == 0 {
                amplitude
            } else {
                -amplitude
            }
        })
        .collect()
}

fn report_rows(report_path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(report_path)?;
    Ok(content.lines().map(|l| l.to_string()).collect())
}

#[test]
fn test_report_has_header_and_one_row_per_full_bucket() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let audio_path = temp_dir.path().join("tone.wav");
    let report_path = temp_dir.path().join("levels.csv");

    // 3.5 seconds at 8kHz with 1-second buckets: the trailing half second
    // must be discarded, leaving exactly 3 rows.
    write_wav(&audio_path, &square_wave(8000, 1000, 8000, 3.5), 8000, 1)?;

    let analyzer = LoudnessAnalyzer::new(1.0, report_path.clone());
    let written = analyzer.analyze(&audio_path)?;
    assert_eq!(written, report_path);

    let rows = report_rows(&report_path)?;
    assert_eq!(rows[0], "bucket_start_secs,spl_db");
    assert_eq!(rows.len(), 4, "header plus 3 full buckets");

    Ok(())
}

#[test]
fn test_square_wave_normalizes_to_full_scale_spl() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let audio_path = temp_dir.path().join("tone.wav");
    let report_path = temp_dir.path().join("levels.csv");

    // A square wave normalizes to +/-1.0 exactly, RMS 1.0, so each bucket
    // should report 20*log10(1/20e-6) ~= 93.979 dB regardless of amplitude.
    write_wav(&audio_path, &square_wave(8000, 1200, 48_000, 1.5), 48_000, 1)?;

    let analyzer = LoudnessAnalyzer::new(1.0, report_path.clone());
    analyzer.analyze(&audio_path)?;

    let rows = report_rows(&report_path)?;
    assert_eq!(rows.len(), 2, "1.5s with 1s buckets yields a single row");

    let fields: Vec<&str> = rows[1].split(',').collect();
    assert_eq!(fields[0].parse::<f64>()?, 0.0);
    let spl: f64 = fields[1].parse()?;
    assert!(
        (spl - 93.9794).abs() < 1e-3,
        "expected full-scale SPL, got {spl}"
    );

    Ok(())
}

#[test]
fn test_silent_file_reports_negative_infinity() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let audio_path = temp_dir.path().join("silence.wav");
    let report_path = temp_dir.path().join("levels.csv");

    write_wav(&audio_path, &vec![0i16; 16000], 8000, 1)?;

    let analyzer = LoudnessAnalyzer::new(1.0, report_path.clone());
    analyzer.analyze(&audio_path)?;

    let rows = report_rows(&report_path)?;
    assert_eq!(rows.len(), 3, "header plus 2 silent buckets");
    for row in &rows[1..] {
        let spl = row.split(',').nth(1).unwrap();
        assert_eq!(spl, "-inf");
    }

    Ok(())
}

#[test]
fn test_stereo_file_uses_first_channel_only() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let audio_path = temp_dir.path().join("stereo.wav");
    let report_path = temp_dir.path().join("levels.csv");

    // Silent left channel, loud right channel. Analysis keeps the first
    // channel, so every bucket must be -inf.
    let mut samples = Vec::new();
    for _ in 0..8000 {
        samples.push(0i16);
        samples.push(8000i16);
    }
    write_wav(&audio_path, &samples, 8000, 2)?;

    let analyzer = LoudnessAnalyzer::new(1.0, report_path.clone());
    analyzer.analyze(&audio_path)?;

    let rows = report_rows(&report_path)?;
    assert_eq!(rows.len(), 2);
    assert!(rows[1].ends_with("-inf"));

    Ok(())
}

#[test]
fn test_audio_shorter_than_one_bucket_yields_empty_report() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let audio_path = temp_dir.path().join("short.wav");
    let report_path = temp_dir.path().join("levels.csv");

    write_wav(&audio_path, &vec![500i16; 1000], 8000, 1)?;

    let analyzer = LoudnessAnalyzer::new(1.0, report_path.clone());
    analyzer.analyze(&audio_path)?;

    let rows = report_rows(&report_path)?;
    assert_eq!(rows, vec!["bucket_start_secs,spl_db".to_string()]);

    Ok(())
}
