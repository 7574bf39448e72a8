//! The errors of the application layer.

use std::path::PathBuf;
use thiserror::Error;

/// A type alias for `Result<T, AppError>`.
pub type Result<T> = std::result::Result<T, AppError>;

/// The possible errors of the application layer.
#[derive(Debug, Error)]
pub enum AppError {
    /// A failure inside the download pipeline.
    #[error(transparent)]
    Pipeline(#[from] streamkit::Error),
    /// A document could not be written; any in-memory change was kept.
    #[error("Failed to persist {location}: {cause}")]
    PersistFailed {
        /// Where the document lives.
        location: String,
        /// What the storage reported.
        #[source]
        cause: std::io::Error,
    },
    /// The configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The input is neither a media item nor a playlist.
    #[error("Not a video or playlist URL: {0:?}")]
    InvalidTarget(String),
    /// A batch file could not be read.
    #[error("Failed to read batch file {}: {cause}", .path.display())]
    BatchFile {
        /// The batch file.
        path: PathBuf,
        /// What the file system reported.
        #[source]
        cause: std::io::Error,
    },
    /// The selection requires merging, but no `ffmpeg` is available.
    #[error("This quality needs ffmpeg to merge video and audio, but ffmpeg is not installed (run `tubegrab setup`)")]
    MuxerUnavailable,
}

impl AppError {
    /// The pipeline error behind this one, if any.
    pub fn pipeline(&self) -> Option<&streamkit::Error> {
        match self {
            AppError::Pipeline(e) => Some(e),
            _ => None,
        }
    }
}
