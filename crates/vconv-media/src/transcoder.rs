//! Transcoder collaborator.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use vconv_models::{EncodingParams, MediaProfile, OutputFormat};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;

/// Probing and format conversion of a source file.
///
/// Implementations must stop any external work when a `transcode` future is
/// dropped; the orchestrator abandons timed-out conversions that way.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Read the media profile of `input`.
    async fn probe(&self, input: &Path) -> MediaResult<MediaProfile>;

    /// Convert `input` to `format` and return the written output path.
    async fn transcode(
        &self,
        input: &Path,
        format: OutputFormat,
        params: &EncodingParams,
        preserve_audio: bool,
    ) -> MediaResult<PathBuf>;
}

/// Output location for a converted file: `{stem}_converted.{ext}` in
/// `output_dir`, or next to the input when no directory is given.
pub fn output_path_for(input: &Path, format: OutputFormat, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}_converted.{}", stem, format.extension()))
}

/// [`Transcoder`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    output_dir: Option<PathBuf>,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write outputs into `dir` instead of next to the input.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe(&self, input: &Path) -> MediaResult<MediaProfile> {
        probe_media(input).await
    }

    async fn transcode(
        &self,
        input: &Path,
        format: OutputFormat,
        params: &EncodingParams,
        preserve_audio: bool,
    ) -> MediaResult<PathBuf> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        let output = output_path_for(input, format, self.output_dir.as_deref());

        let mut cmd = FfmpegCommand::new(input, &output).encoding(params);
        if !preserve_audio {
            cmd = cmd.without_audio();
        }

        let runner = FfmpegRunner::new();

        info!(format = %format, output = %output.display(), "Starting conversion");

        let label = format.as_str();
        let result = runner
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    format = label,
                    frame = progress.frame,
                    out_time_ms = progress.out_time_ms,
                    speed = progress.speed,
                    "Conversion progress"
                );
            })
            .await;

        if let Err(e) = result {
            if output.exists() {
                if let Err(remove_err) = tokio::fs::remove_file(&output).await {
                    warn!("Failed to remove partial output {}: {}", output.display(), remove_err);
                }
            }
            return Err(e);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_next_to_input() {
        let path = output_path_for(Path::new("/tmp/jobs/abc_clip.mov"), OutputFormat::Webm, None);
        assert_eq!(path, PathBuf::from("/tmp/jobs/abc_clip_converted.webm"));
    }

    #[test]
    fn test_output_path_in_output_dir() {
        let path = output_path_for(
            Path::new("/uploads/clip.mp4"),
            OutputFormat::Mp4,
            Some(Path::new("/scratch")),
        );
        assert_eq!(path, PathBuf::from("/scratch/clip_converted.mp4"));
    }

    #[tokio::test]
    async fn test_transcode_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new().with_output_dir(dir.path());
        let params = crate::select_params(
            OutputFormat::Mp4,
            vconv_models::OptimizationLevel::Fast,
            true,
            None,
            2,
        );

        let result = transcoder
            .transcode(&dir.path().join("missing.mp4"), OutputFormat::Mp4, &params, true)
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
