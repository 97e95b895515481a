//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use vconv_models::EncodingParams;

use crate::error::{MediaError, MediaResult};

/// Lines of non-progress stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// One ffmpeg invocation: a single input converted to a single output
/// with a given encoder parameter set.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    encoding: Vec<String>,
    strip_audio: bool,
    log_level: &'static str,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            encoding: Vec::new(),
            strip_audio: false,
            log_level: "error",
        }
    }

    /// Encoder arguments for the output.
    pub fn encoding(mut self, params: &EncodingParams) -> Self {
        self.encoding = params.to_ffmpeg_args();
        self.strip_audio = params.audio_codec.is_none();
        self
    }

    /// Drop every audio stream regardless of the parameter set.
    pub fn without_audio(mut self) -> Self {
        self.strip_audio = true;
        self
    }

    /// ffmpeg `-v` level; `error` by default.
    pub fn log_level(mut self, level: &'static str) -> Self {
        self.log_level = level;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Full argument list, `ffmpeg` itself excluded.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-nostdin", "-v", self.log_level, "-progress", "pipe:2"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.encoding.iter().cloned());
        if self.strip_audio && !self.encoding.iter().any(|a| a == "-an") {
            args.push("-an".to_string());
        }

        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Progress snapshot parsed from `-progress` output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage given total duration in seconds.
    pub fn percentage(&self, total_duration_secs: f64) -> f64 {
        if total_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / (total_duration_secs * 1000.0) * 100.0).min(100.0)
    }
}

/// Runner for FFmpeg commands.
///
/// The child is spawned with `kill_on_drop`, so dropping the future returned
/// by [`FfmpegRunner::run_with_progress`] terminates the encoder.
#[derive(Debug, Default, Clone)]
pub struct FfmpegRunner;

impl FfmpegRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        let stderr_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current) {
                    LineKind::Report(progress) => progress_callback(progress),
                    LineKind::Field => {}
                    LineKind::Other => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::FfmpegFailed { message, exit_code, .. }) => Err(MediaError::ffmpeg_failed(
                message,
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                exit_code,
            )),
            other => other,
        }
    }

    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let status = child.wait().await?;

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

enum LineKind {
    /// End of a progress block
    Report(FfmpegProgress),
    /// A progress key=value field
    Field,
    /// Anything else (warnings, errors)
    Other,
}

fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> LineKind {
    let Some((key, value)) = line.trim().split_once('=') else {
        return LineKind::Other;
    };

    match key {
        "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return LineKind::Report(current.clone());
        }
        "fps" | "bitrate" | "total_size" | "out_time_ms" | "out_time" | "dup_frames"
        | "drop_frames" | "stream_0_0_q" => {}
        _ => return LineKind::Other,
    }

    LineKind::Field
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webm_params(audio: bool) -> EncodingParams {
        crate::select_params(
            vconv_models::OutputFormat::Webm,
            vconv_models::OptimizationLevel::Balanced,
            audio,
            None,
            4,
        )
    }

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mov", "input_converted.webm").encoding(&webm_params(true));

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input_pos + 1], "input.mov");
        let codec_pos = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(codec_pos > input_pos);
        assert_eq!(args[codec_pos + 1], "libvpx-vp9");
        assert!(!args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "input_converted.webm");
    }

    #[test]
    fn test_audio_stripped_once() {
        let args = FfmpegCommand::new("a.mp4", "b.webm")
            .encoding(&webm_params(false))
            .without_audio()
            .build_args();
        assert_eq!(args.iter().filter(|a| *a == "-an").count(), 1);
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(matches!(
            parse_progress_line("out_time_us=5000000", &mut progress),
            LineKind::Field
        ));
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        match parse_progress_line("progress=end", &mut progress) {
            LineKind::Report(p) => assert!(p.is_complete),
            _ => panic!("expected progress report"),
        }
        assert!((progress.percentage(10.0) - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_error_lines_are_not_progress() {
        let mut progress = FfmpegProgress::default();
        assert!(matches!(
            parse_progress_line("Unknown encoder 'libvpx-vp9'", &mut progress),
            LineKind::Other
        ));
        assert!(matches!(
            parse_progress_line("[libx264 @ 0x55] preset=slow: invalid", &mut progress),
            LineKind::Other
        ));
    }
}
