//! Output formats, optimization tiers and encoder parameter sets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// Accepted source file extensions (lowercase, with dot).
pub const INPUT_EXTENSIONS: [&str; 7] = [".mp4", ".webm", ".mov", ".avi", ".mkv", ".mpeg", ".ogg"];

/// Encoder effort / quality tier requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Fastest encode, largest output
    Fast,
    /// Default trade-off
    #[default]
    Balanced,
    /// Slowest encode, best quality per byte
    Max,
}

impl OptimizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::Fast => "fast",
            OptimizationLevel::Balanced => "balanced",
            OptimizationLevel::Max => "max",
        }
    }

    pub fn all() -> [OptimizationLevel; 3] {
        [
            OptimizationLevel::Fast,
            OptimizationLevel::Balanced,
            OptimizationLevel::Max,
        ]
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OptimizationLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(OptimizationLevel::Fast),
            "balanced" => Ok(OptimizationLevel::Balanced),
            "max" => Ok(OptimizationLevel::Max),
            other => Err(ModelError::unknown_level(other)),
        }
    }
}

/// Target container/codec combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// H.264 + AAC in MP4
    Mp4,
    /// VP9 + Opus in WebM
    Webm,
    /// H.264 + AAC in QuickTime
    Mov,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mov => "mov",
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webm => "video/webm",
            OutputFormat::Mov => "video/quicktime",
        }
    }

    /// Relative encode cost. Higher starts first.
    pub fn priority(&self) -> u8 {
        match self {
            OutputFormat::Webm => 3,
            OutputFormat::Mov => 2,
            OutputFormat::Mp4 => 1,
        }
    }

    /// Multiplier applied to the per-format conversion timeout.
    pub fn timeout_multiplier(&self) -> f64 {
        match self {
            OutputFormat::Webm => 3.0,
            OutputFormat::Mov => 2.0,
            OutputFormat::Mp4 => 1.0,
        }
    }

    /// VP9 is the expensive codec in the supported set.
    pub fn is_cpu_intensive(&self) -> bool {
        matches!(self, OutputFormat::Webm)
    }

    pub fn all() -> [OutputFormat; 3] {
        [OutputFormat::Mp4, OutputFormat::Webm, OutputFormat::Mov]
    }

    /// Parse a comma-separated list, lowercasing and dropping duplicates
    /// while keeping first-occurrence order.
    pub fn parse_list(raw: &str) -> Result<Vec<OutputFormat>, ModelError> {
        let mut formats = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let format: OutputFormat = part.parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            return Err(ModelError::NoFormats);
        }
        Ok(formats)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "webm" => Ok(OutputFormat::Webm),
            "mov" => Ok(OutputFormat::Mov),
            other => Err(ModelError::unknown_format(other)),
        }
    }
}

/// Concrete encoder settings for one output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingParams {
    /// Video encoder (e.g. "libx264", "libvpx-vp9")
    pub video_codec: String,

    /// Constant Rate Factor (lower is better quality)
    pub crf: u8,

    /// x264 preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// x264 tune
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tune: Option<String>,

    /// libvpx deadline ("realtime", "good", "best")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,

    /// libvpx cpu-used (0-8, higher is faster)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_used: Option<u8>,

    /// Target video bitrate ("0" lets CRF drive VP9)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<String>,

    /// Peak bitrate cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rate: Option<String>,

    /// Rate control buffer size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buf_size: Option<String>,

    /// Output frame rate cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,

    /// Encoder threads
    pub threads: u32,

    /// libvpx row multithreading
    #[serde(default)]
    pub row_mt: bool,

    /// Container flags (e.g. "+faststart")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movflags: Option<String>,

    /// Audio encoder; `None` drops the audio track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    /// Audio bitrate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl EncodingParams {
    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
        ];

        let mut push = |flag: &str, value: &Option<String>| {
            if let Some(v) = value {
                args.push(flag.to_string());
                args.push(v.clone());
            }
        };
        push("-preset", &self.preset);
        push("-tune", &self.tune);
        push("-deadline", &self.deadline);
        push("-b:v", &self.video_bitrate);
        push("-maxrate", &self.max_rate);
        push("-bufsize", &self.buf_size);
        push("-movflags", &self.movflags);

        if let Some(cpu_used) = self.cpu_used {
            args.extend(["-cpu-used".to_string(), cpu_used.to_string()]);
        }
        if self.row_mt {
            args.extend(["-row-mt".to_string(), "1".to_string()]);
        }
        if let Some(fps) = self.frame_rate {
            args.extend(["-r".to_string(), fps.to_string()]);
        }
        args.extend(["-threads".to_string(), self.threads.to_string()]);

        match &self.audio_codec {
            Some(codec) => {
                args.extend(["-c:a".to_string(), codec.clone()]);
                if let Some(bitrate) = &self.audio_bitrate {
                    args.extend(["-b:a".to_string(), bitrate.clone()]);
                }
            }
            None => args.push("-an".to_string()),
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x264() -> EncodingParams {
        EncodingParams {
            video_codec: "libx264".to_string(),
            crf: 23,
            preset: Some("medium".to_string()),
            tune: None,
            deadline: None,
            cpu_used: None,
            video_bitrate: None,
            max_rate: None,
            buf_size: None,
            frame_rate: None,
            threads: 4,
            row_mt: false,
            movflags: Some("+faststart".to_string()),
            audio_codec: Some("aac".to_string()),
            audio_bitrate: Some("128k".to_string()),
            extra_args: Vec::new(),
        }
    }

    #[test]
    fn test_format_parse_list_dedups() {
        let formats = OutputFormat::parse_list("MP4, webm,mp4 ,mov").unwrap();
        assert_eq!(formats, vec![OutputFormat::Mp4, OutputFormat::Webm, OutputFormat::Mov]);
    }

    #[test]
    fn test_format_parse_list_rejects_unknown() {
        assert_eq!(
            OutputFormat::parse_list("mp4,flv"),
            Err(ModelError::UnknownFormat("flv".to_string()))
        );
        assert_eq!(OutputFormat::parse_list(" , "), Err(ModelError::NoFormats));
    }

    #[test]
    fn test_format_priority_order() {
        assert!(OutputFormat::Webm.priority() > OutputFormat::Mov.priority());
        assert!(OutputFormat::Mov.priority() > OutputFormat::Mp4.priority());
        assert!(OutputFormat::Webm.is_cpu_intensive());
        assert!(!OutputFormat::Mp4.is_cpu_intensive());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("Balanced".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Balanced);
        assert_eq!("max".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Max);
        assert!("ultra".parse::<OptimizationLevel>().is_err());
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = x264().to_ffmpeg_args();
        assert_eq!(&args[..4], &["-c:v", "libx264", "-crf", "23"]);
        assert!(args.windows(2).any(|w| w == ["-preset", "medium"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "128k"]));
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_ffmpeg_args_without_audio() {
        let params = EncodingParams {
            audio_codec: None,
            ..x264()
        };
        let args = params.to_ffmpeg_args();
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
    }
}
