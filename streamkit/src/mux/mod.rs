//! Combining separate video and audio files into one container.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod ffmpeg;

pub use ffmpeg::FfmpegMuxer;

/// Muxes a video track and an audio track into one playable file without re-encoding.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Writes `output` from the first video stream of `video` and the first audio stream of `audio`.
    async fn combine(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}
