//! FFmpeg CLI wrapper for the conversion pipeline.
//!
//! This crate provides:
//! - Source probing via ffprobe into a [`MediaProfile`](vconv_models::MediaProfile)
//! - Type-safe FFmpeg command building with progress parsing
//! - Encoder parameter selection per format, tier and source profile
//! - The [`Transcoder`] collaborator trait and its FFmpeg implementation

pub mod command;
pub mod error;
pub mod params;
pub mod probe;
pub mod transcoder;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use params::select_params;
pub use probe::probe_media;
pub use transcoder::{output_path_for, FfmpegTranscoder, Transcoder};
