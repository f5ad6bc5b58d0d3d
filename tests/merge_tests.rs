//! End-to-end merge tests against a real FFmpeg.
//!
//! Fixtures are generated on the fly with FFmpeg's `testsrc` source and hound.
//! Tests that need FFmpeg/FFprobe are ignored by default; run them with
//! `cargo test -- --ignored` on a machine that has both on PATH.

use std::path::{Path, PathBuf};
use std::process::Command;
use voiceover::media::{MediaProbe, TranscodeRunner};
use voiceover::merge::{MergeRequest, Merger};

fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn require_ffmpeg() {
    assert!(
        tool_available("ffmpeg") && tool_available("ffprobe"),
        "ffmpeg and ffprobe must be on PATH"
    );
}

/// Silent-picture test pattern of `seconds` length.
fn make_video(dir: &Path, name: &str, seconds: u32) -> PathBuf {
    let path = dir.join(name);
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=duration={seconds}:size=160x120:rate=10"))
        .args(["-c:v", "mpeg4"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success(), "could not generate video fixture");
    path
}

/// Sine-ish tone WAV of `seconds` length.
fn make_wav(seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let samples = (seconds * 16000.0) as usize;
        for i in 0..samples {
            let t = i as f64 / 16000.0;
            let sample = (t * 440.0 * std::f64::consts::TAU).sin() * 8000.0;
            writer.write_sample(sample as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

async fn merged_duration(dir: &Path, name: &str, bytes: &[u8]) -> f64 {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await.unwrap();
    MediaProbe::default().duration(&path).await.unwrap()
}

// ============================================================================
// Successful Merges
// ============================================================================

mod success_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe on PATH"]
    async fn test_short_narration_is_stretched_to_video_length() {
        require_ffmpeg();

        let dir = tempfile::tempdir().unwrap();
        let video_path = make_video(dir.path(), "clip.mp4", 4);
        let video = std::fs::read(&video_path).unwrap();
        let audio = make_wav(2.0);

        let probe = MediaProbe::default();
        let video_duration = probe.duration(&video_path).await.unwrap();
        assert!((video_duration - 4.0).abs() < 0.2);

        let request = MergeRequest::new(&video, &audio)
            .with_durations(Some(video_duration), Some(2.0))
            .with_extensions(Some("mp4"), Some("wav"));
        let merged = Merger::default().merge(&request).await.unwrap();

        assert!(!merged.is_empty());
        let duration = merged_duration(dir.path(), "out.mp4", &merged).await;
        assert!(
            (duration - video_duration).abs() <= 0.5,
            "merged {duration:.2}s vs video {video_duration:.2}s"
        );
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe on PATH"]
    async fn test_merge_files_from_disk() {
        require_ffmpeg();

        let dir = tempfile::tempdir().unwrap();
        let video_path = make_video(dir.path(), "clip.mp4", 2);
        let audio_path = dir.path().join("long.wav");
        std::fs::write(&audio_path, make_wav(6.0)).unwrap();

        let merged = Merger::default()
            .merge_files(&video_path, &audio_path, Some(2.0), Some(6.0))
            .await
            .unwrap();

        let duration = merged_duration(dir.path(), "out.mp4", &merged).await;
        assert!((duration - 2.0).abs() <= 0.5, "merged {duration:.2}s");
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe on PATH"]
    async fn test_concurrent_merges_are_isolated() {
        require_ffmpeg();

        let dir = tempfile::tempdir().unwrap();
        let short = std::fs::read(make_video(dir.path(), "short.mp4", 3)).unwrap();
        let long = std::fs::read(make_video(dir.path(), "long.mp4", 5)).unwrap();
        let audio = make_wav(2.0);

        let merger = Merger::default();
        let short_request = MergeRequest::new(&short, &audio)
            .with_durations(Some(3.0), Some(2.0))
            .with_extensions(Some("mp4"), Some("wav"));
        let long_request = MergeRequest::new(&long, &audio)
            .with_durations(Some(5.0), Some(2.0))
            .with_extensions(Some("mp4"), Some("wav"));

        let (a, b) = tokio::join!(merger.merge(&short_request), merger.merge(&long_request));

        let a = merged_duration(dir.path(), "a.mp4", &a.unwrap()).await;
        let b = merged_duration(dir.path(), "b.mp4", &b.unwrap()).await;
        assert!((a - 3.0).abs() <= 0.5, "short merge lasted {a:.2}s");
        assert!((b - 5.0).abs() <= 0.5, "long merge lasted {b:.2}s");
    }
}

// ============================================================================
// Failure Classification
// ============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_engine() {
        let merger = Merger::new(TranscodeRunner::new("/nonexistent/voiceover/ffmpeg"));
        let audio = make_wav(1.0);
        let request = MergeRequest::new(b"video", &audio).with_durations(Some(1.0), Some(1.0));

        let err = merger.merge(&request).await.unwrap_err();
        assert!(err.is_spawn_failure(), "unexpected error: {err}");
        assert!(err.diagnostics().is_none());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe on PATH"]
    async fn test_corrupt_input_reports_engine_output() {
        require_ffmpeg();

        let audio = make_wav(1.0);
        let request = MergeRequest::new(b"definitely not an mp4 container", &audio)
            .with_durations(Some(1.0), Some(1.0))
            .with_extensions(Some("mp4"), Some("wav"));

        let err = Merger::default().merge(&request).await.unwrap_err();
        assert!(err.is_exit_failure(), "unexpected error: {err}");
        assert!(!err.is_spawn_failure());
        assert!(!err.diagnostics().unwrap_or_default().trim().is_empty());
    }
}
