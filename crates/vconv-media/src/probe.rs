//! FFprobe media profiling.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use vconv_models::MediaProfile;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Container tags consulted by the content-type heuristic.
const DESCRIPTIVE_TAGS: [&str; 3] = ["title", "genre", "comment"];

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    bit_rate: Option<String>,
}

/// Probe a media file into an unclassified [`MediaProfile`].
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaProfile> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            "FFprobe failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    parse_ffprobe_json(&output.stdout)
}

fn parse_ffprobe_json(bytes: &[u8]) -> MediaResult<MediaProfile> {
    let probe: FfprobeOutput = serde_json::from_slice(bytes)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_video("No video stream found"))?;

    let audio_codec = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .and_then(|s| s.codec_name.clone());

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // Container bit rate covers all streams; fall back to the video stream's
    let bit_rate = probe
        .format
        .bit_rate
        .as_deref()
        .or(video.bit_rate.as_deref())
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let frame_rate = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .filter(|fps| *fps > 0.0)
        .or_else(|| video.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let tags = probe
        .format
        .tags
        .iter()
        .filter(|(key, _)| DESCRIPTIVE_TAGS.contains(&key.to_lowercase().as_str()))
        .map(|(_, value)| value.to_lowercase())
        .collect();

    Ok(MediaProfile {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        duration,
        bit_rate,
        frame_rate,
        codec_name: video.codec_name.clone().unwrap_or_default().to_lowercase(),
        audio_codec,
        tags,
        ..Default::default()
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_ffprobe_json() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "H264", "width": 1920, "height": 1080,
                 "r_frame_rate": "24/1", "avg_frame_rate": "24/1"}
            ],
            "format": {
                "duration": "42.5",
                "bit_rate": "6000000",
                "tags": {"title": "Short Film Trailer", "encoder": "Lavf60"}
            }
        }"#;

        let profile = parse_ffprobe_json(json).unwrap();
        assert_eq!(profile.width, 1920);
        assert_eq!(profile.height, 1080);
        assert_eq!(profile.codec_name, "h264");
        assert_eq!(profile.audio_codec.as_deref(), Some("aac"));
        assert_eq!(profile.bit_rate, 6_000_000);
        assert!((profile.frame_rate - 24.0).abs() < 0.01);
        assert!((profile.duration - 42.5).abs() < 0.01);
        assert_eq!(profile.tags, vec!["short film trailer".to_string()]);
        assert_eq!(profile.complexity_factor, 1.0);
    }

    #[test]
    fn test_parse_ffprobe_without_video() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(parse_ffprobe_json(json), Err(MediaError::InvalidVideo(_))));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = probe_media("/nonexistent/source.mp4").await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
