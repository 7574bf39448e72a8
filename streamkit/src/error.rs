//! The errors that can occur.

use crate::utils::platform::{Architecture, Platform};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The stage of a video/audio merge at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStage {
    /// Downloading the video-only track.
    VideoDownload,
    /// Downloading the audio-only track.
    AudioDownload,
    /// Running the muxer over both tracks.
    Merge,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStage::VideoDownload => write!(f, "video-download"),
            MergeStage::AudioDownload => write!(f, "audio-download"),
            MergeStage::Merge => write!(f, "merge"),
        }
    }
}

/// The failure categories a catalog/stream provider can report.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The media item is missing, private, or region-blocked.
    #[error("The media item is unavailable: {0}")]
    Unavailable(String),
    /// The media item exists but cannot be played or downloaded.
    #[error("The media item cannot be played: {0}")]
    Unplayable(String),
    /// The remote service refused the request because of rate limiting.
    #[error("The request limit was exceeded: {0}")]
    RateLimited(String),
    /// A network-level failure (DNS, connection, timeout, HTTP status).
    #[error("A network error occurred: {0}")]
    Network(String),
    /// A local I/O failure while writing the stream.
    #[error("An IO error occurred: {0}")]
    Io(#[from] std::io::Error),
    /// Any other provider failure.
    #[error("The provider failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.status().is_some_and(|s| s.as_u16() == 429) {
            return ProviderError::RateLimited(error.to_string());
        }

        ProviderError::Network(error.to_string())
    }
}

/// The possible errors that can occur.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider could not supply a catalog for the media item.
    #[error("Encodings for {media_id} are unavailable: {cause}")]
    CatalogUnavailable {
        /// The requested media identifier.
        media_id: String,
        /// What the provider reported.
        #[source]
        cause: ProviderError,
    },
    /// The user token does not address any menu entry.
    #[error("Invalid selection: {0:?}")]
    InvalidSelection(String),
    /// The catalog offers nothing that can be downloaded.
    #[error("No encodings are available for this media item")]
    NoEncodingsAvailable,
    /// A single stream transfer failed.
    #[error("Transfer to {} failed: {cause}", .destination.display())]
    TransferFailed {
        /// The file the stream was being written to.
        destination: PathBuf,
        /// What the provider reported.
        #[source]
        cause: ProviderError,
    },
    /// A video/audio merge failed at the given stage.
    #[error("Merge failed during {stage}: {cause}")]
    MergeFailed {
        /// The stage that failed.
        stage: MergeStage,
        /// The underlying failure.
        #[source]
        cause: Box<Error>,
    },
    /// Another merge is already writing to this output path.
    #[error("Another download is already writing to {}", .0.display())]
    OutputInUse(PathBuf),

    /// An error occurred while running the runtime.
    #[error("An error occurred while running the runtime: {0}")]
    Runtime(#[from] tokio::task::JoinError),
    /// An error occurred while interacting with the file system.
    #[error("An IO error occurred: {0}")]
    IO(#[from] std::io::Error),
    /// An error occurred while unzipping a file.
    #[error("An error occurred while extracting the archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// An error occurred while fetching a file.
    #[error("An error occurred while fetching: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// An error occurred while parsing JSON.
    #[error("An error occurred while parsing JSON: {0}")]
    Serde(#[from] serde_json::Error),
    /// No downloadable build exists for this platform.
    #[error("No {0} binary found for platform {1}/{2}")]
    Binary(String, Platform, Architecture),
    /// An error occurred while running a command.
    #[error("Failed to execute command: {0}")]
    Command(String),
    /// An error occurred manipulating a path.
    #[error("An invalid path was provided: {0}")]
    Path(String),
    /// An error occurred due to a timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Returns the provider failure at the root of this error, if there is one.
    ///
    /// Lets a presentation layer pick a specific message (unavailable, rate limited...)
    /// without knowing how the error was wrapped.
    pub fn provider_cause(&self) -> Option<&ProviderError> {
        match self {
            Error::CatalogUnavailable { cause, .. } | Error::TransferFailed { cause, .. } => {
                Some(cause)
            }
            Error::MergeFailed { cause, .. } => cause.provider_cause(),
            _ => None,
        }
    }

    /// Returns the merge stage, if this is a merge failure.
    pub fn merge_stage(&self) -> Option<MergeStage> {
        match self {
            Error::MergeFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
