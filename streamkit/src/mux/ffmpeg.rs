//! A [`Muxer`] backed by the `ffmpeg` executable.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::mux::Muxer;
use crate::utils;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Merges tracks with `ffmpeg`, copying both streams into an MP4 container.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegMuxer {
    /// The path to the `ffmpeg` executable.
    pub executable_path: PathBuf,
    /// How long a single merge may run.
    pub timeout: Duration,
}

impl FfmpegMuxer {
    /// Creates a muxer using the given executable and a one hour timeout.
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable_path.into(),
            timeout: Duration::from_secs(60 * 60),
        }
    }

    /// Sets the timeout of a single merge.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(video: &Path, audio: &Path, output: &Path) -> Result<Vec<String>> {
        let video = video
            .to_str()
            .ok_or(Error::Path("Invalid video path".to_string()))?;
        let audio = audio
            .to_str()
            .ok_or(Error::Path("Invalid audio path".to_string()))?;
        let output = output
            .to_str()
            .ok_or(Error::Path("Invalid output path".to_string()))?;

        Ok(utils::to_owned(vec![
            "-y", "-i", video, "-i", audio, "-map", "0:v:0", "-map", "1:a:0", "-c", "copy", "-f",
            "mp4", output,
        ]))
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn combine(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        tracing::debug!(
            "Combining video {:?} and audio {:?} into {:?}",
            video,
            audio,
            output
        );

        let executor = Executor::new(
            &self.executable_path,
            self.timeout,
            Self::args(video, audio, output)?,
        );
        executor.execute().await?;

        Ok(())
    }
}
