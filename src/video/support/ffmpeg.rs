use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Output codec settings appended after the stream mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingProfile {
    pub video_codec: &'static str,
    pub preset: &'static str,
    pub crf: u8,
    pub audio_codec: &'static str,
    pub audio_bitrate: &'static str,
    pub faststart: bool,
}

impl EncodingProfile {
    pub fn push_to(&self, args: &mut Vec<String>) {
        args.extend([
            "-c:v".to_string(),
            self.video_codec.to_string(),
            "-preset".to_string(),
            self.preset.to_string(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.audio_codec.to_string(),
            "-b:a".to_string(),
            self.audio_bitrate.to_string(),
        ]);
        if self.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
    }
}

pub const PROFILE_H264_AAC_QUALITY_FASTSTART: EncodingProfile = EncodingProfile {
    video_codec: "libx264",
    preset: "medium",
    crf: 20,
    audio_codec: "aac",
    audio_bitrate: "192k",
    faststart: true,
};

/// Determines how long a piece of media plays.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<f64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeProbe;

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration_seconds(&self, path: &Path) -> Result<f64> {
        probe_duration_seconds(path).await
    }
}

pub async fn probe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_duration(stdout: &str) -> Result<f64> {
    let duration: f64 = stdout
        .trim()
        .parse()
        .context("Failed to parse ffprobe duration as f64")?;

    if !duration.is_finite() || duration <= 0.0 {
        anyhow::bail!("ffprobe reported a non-playable duration of {duration}");
    }

    Ok(duration)
}

/// Parse `HH:MM:SS.xx` as printed in ffmpeg's `time=` status field.
pub fn parse_time_to_seconds(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Extract the processed time from an ffmpeg status line.
pub fn parse_ffmpeg_progress(line: &str) -> Option<f64> {
    let time_start = line.find("time=")?;
    let time_str = &line[time_start + 5..];
    let time_end = time_str.find(' ').unwrap_or(time_str.len());
    parse_time_to_seconds(&time_str[..time_end])
}
