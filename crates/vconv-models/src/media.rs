//! Probed source media characteristics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Heuristic classification of a source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Animation,
    Film,
    Screencast,
    Gaming,
    #[default]
    General,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Animation => "animation",
            ContentType::Film => "film",
            ContentType::Screencast => "screencast",
            ContentType::Gaming => "gaming",
            ContentType::General => "general",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Media profile of a job's source file.
///
/// Built once per job from the probe result. `content_type` and
/// `complexity_factor` start at their neutral values and are filled in by
/// [`MediaProfile::classified`] before the profile is used for planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProfile {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Duration in seconds
    pub duration: f64,
    /// Container bit rate in bits per second (0 if unknown)
    pub bit_rate: u64,
    /// Frames per second (0.0 if unknown)
    pub frame_rate: f64,
    /// Video codec name as reported by ffprobe
    pub codec_name: String,
    /// Audio codec name, if the file has audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Lowercased descriptive metadata (title, genre, comment)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Detected content type
    #[serde(default)]
    pub content_type: ContentType,
    /// Relative processing cost, 1.0 is typical
    #[serde(default = "default_complexity")]
    pub complexity_factor: f64,
}

fn default_complexity() -> f64 {
    1.0
}

impl Default for MediaProfile {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            duration: 0.0,
            bit_rate: 0,
            frame_rate: 0.0,
            codec_name: String::new(),
            audio_codec: None,
            tags: Vec::new(),
            content_type: ContentType::General,
            complexity_factor: 1.0,
        }
    }
}

impl MediaProfile {
    /// Return the profile with its classification filled in.
    pub fn classified(mut self, content_type: ContentType, complexity_factor: f64) -> Self {
        self.content_type = content_type;
        self.complexity_factor = complexity_factor;
        self
    }

    /// Total pixels per frame.
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width / height, or 0.0 when height is unknown.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn bit_rate_mbps(&self) -> f64 {
        self.bit_rate as f64 / 1_000_000.0
    }

    /// Formatted as "WIDTHxHEIGHT".
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Whether any descriptive tag contains one of `keywords`.
    pub fn has_tag(&self, keywords: &[&str]) -> bool {
        self.tags
            .iter()
            .any(|tag| keywords.iter().any(|k| tag.contains(k)))
    }
}
