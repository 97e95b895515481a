//! Content-type detection and complexity estimation.
//!
//! Both are pure functions of a [`MediaProfile`]: the same profile always
//! yields the same label and factor.

use vconv_models::{ContentType, MediaProfile};

const ANIMATION_TAGS: &[&str] = &["anime", "animation", "cartoon"];
const GAMING_TAGS: &[&str] = &["gameplay", "gaming", "game"];
const SCREENCAST_TAGS: &[&str] = &["tutorial", "screencast", "demo"];
const FILM_TAGS: &[&str] = &["movie", "film", "drama", "trailer", "cinema"];
const FILM_AUDIO_CODECS: &[&str] = &["aac", "ac3", "eac3", "dts"];
const GAMING_RESOLUTIONS: &[(u32, u32)] = &[(1920, 1080), (2560, 1440), (3840, 2160)];

/// Labels in tie-break order: earlier wins on equal score.
const PRECEDENCE: [ContentType; 4] = [
    ContentType::Film,
    ContentType::Gaming,
    ContentType::Screencast,
    ContentType::Animation,
];

const RESOLUTION_WEIGHT: f64 = 0.3;
const BITRATE_WEIGHT: f64 = 0.2;
const CODEC_WEIGHT: f64 = 0.15;
const FRAME_RATE_WEIGHT: f64 = 0.15;
const CONTENT_WEIGHT: f64 = 0.1;
const DURATION_WEIGHT: f64 = 0.1;

/// Derives the content type and complexity factor of a source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityEstimator;

impl ComplexityEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Content type and complexity factor for `profile`.
    ///
    /// The profile's own `content_type` and `complexity_factor` fields are
    /// ignored; they are outputs of this call.
    pub fn estimate(&self, profile: &MediaProfile) -> (ContentType, f64) {
        let content_type = self.detect_content_type(profile);
        (content_type, self.complexity_factor(profile, content_type))
    }

    /// Highest evidence score wins; all-zero scores yield `General`.
    pub fn detect_content_type(&self, profile: &MediaProfile) -> ContentType {
        let mut best = ContentType::General;
        let mut best_score = 0;

        for candidate in PRECEDENCE {
            let score = content_score(profile, candidate);
            if score > best_score {
                best = candidate;
                best_score = score;
            }
        }

        best
    }

    /// Weighted combination of normalized sub-factors; 1.0 is a typical
    /// 720p-1080p h264 source.
    pub fn complexity_factor(&self, profile: &MediaProfile, content_type: ContentType) -> f64 {
        RESOLUTION_WEIGHT * resolution_factor(profile)
            + BITRATE_WEIGHT * bitrate_factor(profile)
            + CODEC_WEIGHT * codec_factor(profile)
            + FRAME_RATE_WEIGHT * frame_rate_factor(profile)
            + CONTENT_WEIGHT * content_factor(content_type)
            + DURATION_WEIGHT * duration_factor(profile)
    }
}

fn content_score(profile: &MediaProfile, content_type: ContentType) -> u32 {
    let fps = profile.frame_rate;
    let aspect = profile.aspect_ratio();
    let mut score = 0;

    match content_type {
        ContentType::Animation => {
            if near(aspect, 16.0 / 9.0) || near(aspect, 4.0 / 3.0) {
                score += 1;
            }
            if (22.0..=26.0).contains(&fps) || (12.0..=15.0).contains(&fps) {
                score += 1;
            }
            if profile.has_tag(ANIMATION_TAGS) {
                score += 2;
            }
        }
        ContentType::Gaming => {
            if GAMING_RESOLUTIONS.contains(&(profile.width, profile.height)) {
                score += 1;
            }
            if fps >= 60.0 {
                score += 2;
            }
            if profile.has_tag(GAMING_TAGS) {
                score += 2;
            }
        }
        ContentType::Screencast => {
            if fps > 0.0 && fps <= 30.0 {
                score += 1;
            }
            if near(aspect, 16.0 / 9.0) || near(aspect, 16.0 / 10.0) {
                score += 1;
            }
            if profile.has_tag(SCREENCAST_TAGS) {
                score += 2;
            }
        }
        ContentType::Film => {
            if (23.0..=25.0).contains(&fps) {
                score += 2;
            }
            if profile.bit_rate_mbps() > 8.0 {
                score += 1;
            }
            if profile
                .audio_codec
                .as_deref()
                .is_some_and(|codec| FILM_AUDIO_CODECS.contains(&codec))
            {
                score += 1;
            }
            if profile.has_tag(FILM_TAGS) {
                score += 2;
            }
        }
        ContentType::General => {}
    }

    score
}

fn near(aspect: f64, target: f64) -> bool {
    aspect > 0.0 && (aspect - target).abs() < 0.1
}

fn resolution_factor(profile: &MediaProfile) -> f64 {
    let pixels = profile.pixels();
    if pixels > 3840 * 2160 {
        2.0
    } else if pixels > 1920 * 1080 {
        1.5
    } else if pixels > 1280 * 720 {
        1.2
    } else if pixels > 640 * 480 {
        1.0
    } else {
        0.8
    }
}

fn bitrate_factor(profile: &MediaProfile) -> f64 {
    let mbps = profile.bit_rate_mbps();
    if profile.bit_rate == 0 {
        1.0
    } else if mbps > 50.0 {
        1.5
    } else if mbps > 20.0 {
        1.3
    } else if mbps > 10.0 {
        1.1
    } else if mbps > 5.0 {
        1.0
    } else {
        0.9
    }
}

fn codec_factor(profile: &MediaProfile) -> f64 {
    match profile.codec_name.as_str() {
        "hevc" | "h265" | "vp9" | "av1" => 1.3,
        "h264" | "avc" | "avc1" => 1.0,
        "mpeg4" | "mpeg2video" => 0.9,
        // Unknown or missing codec: assume slightly harder than h264
        _ => 1.1,
    }
}

fn frame_rate_factor(profile: &MediaProfile) -> f64 {
    if profile.frame_rate > 60.0 {
        1.3
    } else if profile.frame_rate > 30.0 {
        1.1
    } else {
        1.0
    }
}

fn content_factor(content_type: ContentType) -> f64 {
    match content_type {
        ContentType::Animation => 0.9,
        ContentType::Gaming => 1.2,
        ContentType::Screencast => 0.8,
        ContentType::Film => 1.1,
        ContentType::General => 1.0,
    }
}

fn duration_factor(profile: &MediaProfile) -> f64 {
    let secs = profile.duration;
    if secs <= 0.0 {
        1.0
    } else if secs > 3600.0 {
        1.3
    } else if secs > 1800.0 {
        1.2
    } else if secs > 600.0 {
        1.1
    } else if secs > 300.0 {
        1.0
    } else {
        0.9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(width: u32, height: u32, fps: f64, mbps: f64) -> MediaProfile {
        MediaProfile {
            width,
            height,
            frame_rate: fps,
            bit_rate: (mbps * 1_000_000.0) as u64,
            duration: 400.0,
            codec_name: "h264".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_profile_is_general() {
        let estimator = ComplexityEstimator::new();
        let (content, factor) = estimator.estimate(&MediaProfile::default());
        assert_eq!(content, ContentType::General);
        assert!(factor > 0.0);
    }

    #[test]
    fn test_gaming_detected_from_high_frame_rate() {
        let estimator = ComplexityEstimator::new();
        let p = profile(2560, 1440, 60.0, 12.0);
        assert_eq!(estimator.detect_content_type(&p), ContentType::Gaming);
    }

    #[test]
    fn test_film_wins_ties() {
        let estimator = ComplexityEstimator::new();
        // 24fps 16:9: film 2, animation 2, screencast 2
        let p = profile(1920, 1080, 24.0, 6.0);
        assert_eq!(estimator.detect_content_type(&p), ContentType::Film);
    }

    #[test]
    fn test_tags_drive_classification() {
        let estimator = ComplexityEstimator::new();
        let mut p = profile(1280, 960, 30.0, 2.0);
        p.tags = vec!["python tutorial".to_string()];
        assert_eq!(estimator.detect_content_type(&p), ContentType::Screencast);

        p.tags = vec!["anime opening".to_string()];
        p.frame_rate = 24.0;
        assert_eq!(estimator.detect_content_type(&p), ContentType::Animation);
    }

    #[test]
    fn test_complexity_tracks_source_weight() {
        let estimator = ComplexityEstimator::new();
        let light = profile(640, 360, 24.0, 1.0);
        let mut heavy = profile(7680, 4320, 120.0, 80.0);
        heavy.codec_name = "hevc".to_string();
        heavy.duration = 7200.0;

        let (_, light_factor) = estimator.estimate(&light);
        let (_, heavy_factor) = estimator.estimate(&heavy);
        assert!(light_factor < 1.0);
        assert!(heavy_factor > 1.4);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let estimator = ComplexityEstimator::new();
        let mut p = profile(1920, 1080, 24.0, 6.0);
        p.audio_codec = Some("aac".to_string());

        let first = estimator.estimate(&p);
        for _ in 0..10 {
            assert_eq!(estimator.estimate(&p), first);
        }
    }
}
