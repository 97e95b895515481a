//! Encoder parameter selection.
//!
//! Picks an [`EncodingParams`] set for one output format from the requested
//! tier, then adjusts it for the detected content type and the source
//! profile. The numbers are tuning policy; callers should only rely on the
//! shape (tier table, then content overrides, then adaptive overrides).

use vconv_models::{ContentType, EncodingParams, MediaProfile, OptimizationLevel, OutputFormat};

const X264: &str = "libx264";
const VP9: &str = "libvpx-vp9";

/// Thread count ceiling for a single encode.
const MAX_ENCODER_THREADS: u32 = 8;

/// Build the parameter set for `format`.
///
/// `cpu_count` is the number of logical CPUs on the host; it bounds encoder
/// threads. Without a profile only the tier table applies.
pub fn select_params(
    format: OutputFormat,
    level: OptimizationLevel,
    preserve_audio: bool,
    profile: Option<&MediaProfile>,
    cpu_count: usize,
) -> EncodingParams {
    let mut params = tier_params(format, level, cpu_count);

    if !preserve_audio {
        params.audio_codec = None;
        params.audio_bitrate = None;
    }

    if let Some(profile) = profile {
        apply_content_overrides(&mut params, format, profile.content_type);
        apply_adaptive_overrides(&mut params, format, profile);
    }

    params
}

fn tier_params(format: OutputFormat, level: OptimizationLevel, cpu_count: usize) -> EncodingParams {
    let base_threads = (cpu_count.max(1) as u32).min(4);

    match format {
        OutputFormat::Webm => {
            let (deadline, cpu_used, crf) = match level {
                OptimizationLevel::Fast => ("realtime", 8, 35),
                OptimizationLevel::Balanced => ("good", 4, 30),
                OptimizationLevel::Max => ("good", 2, 24),
            };
            EncodingParams {
                video_codec: VP9.to_string(),
                crf,
                preset: None,
                tune: None,
                deadline: Some(deadline.to_string()),
                cpu_used: Some(cpu_used),
                video_bitrate: Some("0".to_string()),
                max_rate: None,
                buf_size: None,
                frame_rate: None,
                threads: base_threads + 1,
                row_mt: true,
                movflags: None,
                audio_codec: Some("libopus".to_string()),
                audio_bitrate: Some("96k".to_string()),
                extra_args: Vec::new(),
            }
        }
        OutputFormat::Mp4 | OutputFormat::Mov => {
            let (preset, crf, tune) = match level {
                OptimizationLevel::Fast => ("veryfast", 28, None),
                OptimizationLevel::Balanced => ("medium", 23, Some("film")),
                OptimizationLevel::Max => ("slow", 18, None),
            };
            EncodingParams {
                video_codec: X264.to_string(),
                crf,
                preset: Some(preset.to_string()),
                tune: tune.map(str::to_string),
                deadline: None,
                cpu_used: None,
                video_bitrate: None,
                max_rate: None,
                buf_size: None,
                frame_rate: None,
                threads: base_threads,
                row_mt: false,
                movflags: (format == OutputFormat::Mp4).then(|| "+faststart".to_string()),
                audio_codec: Some("aac".to_string()),
                audio_bitrate: Some("128k".to_string()),
                extra_args: Vec::new(),
            }
        }
    }
}

fn apply_content_overrides(params: &mut EncodingParams, format: OutputFormat, content: ContentType) {
    let vp9 = format == OutputFormat::Webm;

    match content {
        ContentType::Animation => {
            if vp9 {
                params.crf = params.crf.saturating_sub(4).max(20);
            } else {
                params.tune = Some("animation".to_string());
                params.crf = params.crf.saturating_sub(2).max(18);
            }
        }
        ContentType::Screencast if !vp9 => {
            params.tune = Some("stillimage".to_string());
            params.crf = (params.crf + 4).min(28);
        }
        ContentType::Gaming if !vp9 => {
            params.tune = Some("zerolatency".to_string());
        }
        ContentType::Film if !vp9 => {
            params.tune = Some("film".to_string());
            params
                .extra_args
                .extend(["-x264-params".to_string(), "psy-rd=1.0,0.15".to_string()]);
        }
        _ => {}
    }
}

fn apply_adaptive_overrides(params: &mut EncodingParams, format: OutputFormat, profile: &MediaProfile) {
    let vp9 = format == OutputFormat::Webm;

    // 4K and above: trade encoder effort for throughput
    if profile.width >= 3840 && profile.height >= 2160 {
        if params.preset.as_deref() == Some("slow") {
            params.preset = Some("medium".to_string());
        }
        params.threads = (params.threads + 2).min(MAX_ENCODER_THREADS);
        if let Some(cpu_used) = params.cpu_used {
            params.cpu_used = Some((cpu_used + 2).min(8));
        }
    } else if profile.width > 0 && profile.width <= 640 && profile.height <= 480 {
        if params.preset.as_deref() == Some("medium") {
            params.preset = Some("slow".to_string());
        }
        params.crf = params.crf.saturating_sub(2);
    }

    if profile.duration > 0.0 && profile.duration < 30.0 {
        params.crf = params.crf.saturating_sub(2);
    } else if profile.duration > 600.0 {
        let ceiling = if vp9 { 34 } else { 28 };
        params.crf = (params.crf + 2).min(ceiling.max(params.crf));
    }

    if profile.bit_rate_mbps() > 10.0 {
        let (max_rate, buf_size) = if vp9 { ("6M", "12M") } else { ("8M", "16M") };
        params.max_rate = Some(max_rate.to_string());
        params.buf_size = Some(buf_size.to_string());
    }

    if profile.frame_rate > 30.0 {
        params.frame_rate = Some(30);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hd_profile() -> MediaProfile {
        MediaProfile {
            width: 1920,
            height: 1080,
            duration: 120.0,
            bit_rate: 6_000_000,
            frame_rate: 24.0,
            codec_name: "h264".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_tier_tables() {
        let fast = select_params(OutputFormat::Mp4, OptimizationLevel::Fast, true, None, 8);
        assert_eq!(fast.preset.as_deref(), Some("veryfast"));
        assert_eq!(fast.crf, 28);
        assert_eq!(fast.movflags.as_deref(), Some("+faststart"));

        let max = select_params(OutputFormat::Webm, OptimizationLevel::Max, true, None, 8);
        assert_eq!(max.video_codec, "libvpx-vp9");
        assert_eq!(max.cpu_used, Some(2));
        assert_eq!(max.crf, 24);
        assert_eq!(max.threads, 5);

        let mov = select_params(OutputFormat::Mov, OptimizationLevel::Balanced, true, None, 2);
        assert!(mov.movflags.is_none());
        assert_eq!(mov.threads, 2);
    }

    #[test]
    fn test_audio_dropped() {
        let params = select_params(OutputFormat::Webm, OptimizationLevel::Balanced, false, None, 4);
        assert!(params.audio_codec.is_none());
        assert!(params.to_ffmpeg_args().contains(&"-an".to_string()));
    }

    #[test]
    fn test_animation_lowers_crf() {
        let profile = hd_profile().classified(ContentType::Animation, 0.95);
        let mp4 = select_params(OutputFormat::Mp4, OptimizationLevel::Balanced, true, Some(&profile), 4);
        assert_eq!(mp4.tune.as_deref(), Some("animation"));
        assert_eq!(mp4.crf, 21);

        let webm = select_params(OutputFormat::Webm, OptimizationLevel::Balanced, true, Some(&profile), 4);
        assert_eq!(webm.crf, 26);
    }

    #[test]
    fn test_screencast_crf_capped() {
        let profile = hd_profile().classified(ContentType::Screencast, 0.9);
        let params = select_params(OutputFormat::Mp4, OptimizationLevel::Fast, true, Some(&profile), 4);
        assert_eq!(params.tune.as_deref(), Some("stillimage"));
        assert_eq!(params.crf, 28);
    }

    #[test]
    fn test_high_resolution_overrides() {
        let profile = MediaProfile {
            width: 3840,
            height: 2160,
            frame_rate: 60.0,
            bit_rate: 40_000_000,
            ..hd_profile()
        };
        let mp4 = select_params(OutputFormat::Mp4, OptimizationLevel::Max, true, Some(&profile), 16);
        assert_eq!(mp4.preset.as_deref(), Some("medium"));
        assert_eq!(mp4.threads, 6);
        assert_eq!(mp4.max_rate.as_deref(), Some("8M"));
        assert_eq!(mp4.frame_rate, Some(30));

        let webm = select_params(OutputFormat::Webm, OptimizationLevel::Balanced, true, Some(&profile), 16);
        assert_eq!(webm.cpu_used, Some(6));
        assert_eq!(webm.buf_size.as_deref(), Some("12M"));
    }

    #[test]
    fn test_duration_overrides() {
        let short = MediaProfile { duration: 12.0, ..hd_profile() };
        let params = select_params(OutputFormat::Mp4, OptimizationLevel::Balanced, true, Some(&short), 4);
        assert_eq!(params.crf, 21);

        let long = MediaProfile { duration: 1200.0, ..hd_profile() };
        let params = select_params(OutputFormat::Mp4, OptimizationLevel::Fast, true, Some(&long), 4);
        assert_eq!(params.crf, 28);
    }
}
