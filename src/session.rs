//! One media item, from catalog to file on disk to history entry.

use crate::config::HIGHEST;
use crate::error::{AppError, Result};
use crate::history::{DownloadHistoryEntry, HistoryStore};
use chrono::Utc;
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamkit::fetcher::{MergeEvent, MergeOrchestrator, Transfer};
use streamkit::model::{EncodingCatalog, MediaDetails};
use streamkit::selection::{SelectionMenu, SelectionResult};
use streamkit::telemetry::Sample;
use streamkit::utils::{file_system, sanitize_file_name};
use streamkit::{CatalogProvider, Muxer};

/// How one item of a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The file was written.
    Success(PathBuf),
    /// There was nothing to download.
    Skipped(String),
    /// The download failed.
    Failed(String),
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOutcome::Success(path) => write!(f, "saved to {}", path.display()),
            ItemOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            ItemOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Where an item comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadContext {
    /// The playlist the item belongs to, if any.
    pub playlist_title: Option<String>,
    /// Use the best download when the quality token does not resolve for this item.
    pub fallback_to_highest: bool,
}

impl DownloadContext {
    /// An item downloaded on its own.
    pub fn single() -> Self {
        Self::default()
    }

    /// An item of a batch file.
    pub fn batch() -> Self {
        Self {
            playlist_title: None,
            fallback_to_highest: true,
        }
    }

    /// An item of the given playlist.
    pub fn playlist(title: impl Into<String>) -> Self {
        Self {
            playlist_title: Some(title.into()),
            fallback_to_highest: true,
        }
    }
}

/// What a session reports while it works.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent<'a> {
    /// The encodings that will be downloaded.
    Selected(&'a SelectionResult),
    /// Progress of a direct download.
    Transfer(&'a Sample),
    /// Progress of a video+audio merge.
    Merge(MergeEvent<'a>),
}

/// The observer a session reports to.
pub type SessionSink<'a> = Option<&'a mut (dyn FnMut(SessionEvent<'_>) + Send)>;

fn emit(sink: &mut SessionSink<'_>, event: SessionEvent<'_>) {
    if let Some(sink) = sink.as_mut() {
        sink(event);
    }
}

/// Lends a sink to one call without giving it up.
pub fn reborrow<'s>(sink: &'s mut SessionSink<'_>) -> SessionSink<'s> {
    match sink {
        Some(sink) => Some(&mut **sink),
        None => None,
    }
}

/// A fetched item, ready for a quality choice.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedItem {
    pub details: MediaDetails,
    pub catalog: EncodingCatalog,
}

impl PreparedItem {
    /// The numbered menu of the item's encodings.
    pub fn menu(&self) -> SelectionMenu<'_> {
        SelectionMenu::new(&self.catalog)
    }
}

/// Downloads items through one provider and records them in the history.
pub struct Session {
    provider: Arc<dyn CatalogProvider>,
    orchestrator: Option<MergeOrchestrator>,
    history: Arc<HistoryStore>,
}

impl Session {
    /// Creates a session. Without a muxer, choices that need a merge fail with
    /// [`AppError::MuxerUnavailable`].
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        muxer: Option<Arc<dyn Muxer>>,
        history: Arc<HistoryStore>,
    ) -> Self {
        let orchestrator = muxer.map(|muxer| MergeOrchestrator::new(provider.clone(), muxer));

        Self {
            provider,
            orchestrator,
            history,
        }
    }

    /// Writes temporary merge tracks to `temp_dir`.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        let temp_dir = temp_dir.into();
        self.orchestrator = self
            .orchestrator
            .map(|orchestrator| orchestrator.with_temp_dir(temp_dir));
        self
    }

    /// The catalog provider downloads go through.
    pub fn provider(&self) -> &dyn CatalogProvider {
        self.provider.as_ref()
    }

    /// The store successful downloads are recorded in.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Whether choices that need a merge can be downloaded.
    pub fn can_merge(&self) -> bool {
        self.orchestrator.is_some()
    }

    /// Fetches the details and encodings of an item.
    pub async fn prepare(&self, media_id: &str) -> Result<PreparedItem> {
        let (details, catalog) = EncodingCatalog::fetch(self.provider.as_ref(), media_id).await?;

        Ok(PreparedItem { details, catalog })
    }

    /// Fetches an item and downloads it into `output_dir`.
    ///
    /// `token` is a menu token, or empty for the best download.
    pub async fn download(
        &self,
        media_id: &str,
        token: &str,
        output_dir: &Path,
        context: &DownloadContext,
        on_event: SessionSink<'_>,
    ) -> Result<ItemOutcome> {
        let item = self.prepare(media_id).await?;

        self.download_prepared(&item, token, output_dir, context, on_event)
            .await
    }

    /// Downloads an already fetched item into `output_dir` and records it.
    ///
    /// # Errors
    ///
    /// Pipeline failures, an unresolvable token (unless the context falls back to the
    /// best download) and merges without a muxer. A history write failure is only logged.
    pub async fn download_prepared(
        &self,
        item: &PreparedItem,
        token: &str,
        output_dir: &Path,
        context: &DownloadContext,
        mut on_event: SessionSink<'_>,
    ) -> Result<ItemOutcome> {
        let details = &item.details;
        if item.catalog.is_empty() {
            info!("No encodings available for {}", details.id);
            return Ok(ItemOutcome::Skipped("no encodings".to_string()));
        }

        let menu = item.menu();
        let token = token.trim();
        let (choice, quality) = match menu.resolve_or_highest(token) {
            Ok(choice) if token.is_empty() => (choice, HIGHEST.to_string()),
            Ok(choice) => (choice, token.to_string()),
            Err(streamkit::Error::InvalidSelection(bad)) if context.fallback_to_highest => {
                warn!(
                    "Quality {:?} is not available for {}, using the highest instead",
                    bad, details.title
                );
                (menu.resolve_highest()?, HIGHEST.to_string())
            }
            Err(e) => return Err(e.into()),
        };

        emit(&mut on_event, SessionEvent::Selected(&choice));
        file_system::create_dir(output_dir)?;

        let output = match &choice {
            SelectionResult::Direct(encoding) => {
                let output = unused_path(output_path(output_dir, details, &encoding.container));
                let mut forward = |sample: &Sample| {
                    emit(&mut on_event, SessionEvent::Transfer(sample));
                };

                Transfer::new(self.provider.as_ref())
                    .run(encoding, &output, Some(&mut forward))
                    .await?;
                output
            }
            SelectionResult::MergePair { video, audio } => {
                let orchestrator = self
                    .orchestrator
                    .as_ref()
                    .ok_or(AppError::MuxerUnavailable)?;
                let output = unused_path(output_path(output_dir, details, "mp4"));
                let mut forward = |event: MergeEvent<'_>| {
                    emit(&mut on_event, SessionEvent::Merge(event));
                };

                orchestrator
                    .download_and_merge(video, audio, &output, Some(&mut forward))
                    .await?;
                output
            }
            SelectionResult::UseHighest => {
                return Err(streamkit::Error::NoEncodingsAvailable.into());
            }
        };

        let expected_size = match &choice {
            SelectionResult::Direct(encoding) => encoding.size,
            SelectionResult::MergePair { video, audio } => video.size + audio.size,
            SelectionResult::UseHighest => 0,
        };
        let file_size_bytes = tokio::fs::metadata(&output)
            .await
            .map(|metadata| metadata.len())
            .unwrap_or(expected_size);

        info!("Downloaded {} to {:?}", details.title, output);
        self.record(details, &output, quality, file_size_bytes, context);

        Ok(ItemOutcome::Success(output))
    }

    fn record(
        &self,
        details: &MediaDetails,
        output: &Path,
        quality: String,
        file_size_bytes: u64,
        context: &DownloadContext,
    ) {
        let entry = DownloadHistoryEntry {
            video_id: details.id.clone(),
            video_title: details.title.clone(),
            channel_name: details.channel.clone(),
            video_url: details.url.clone(),
            file_path: output.to_path_buf(),
            quality,
            file_size_bytes,
            download_date: Utc::now(),
            duration_secs: details.duration_secs,
            is_playlist: context.playlist_title.is_some(),
            playlist_title: context.playlist_title.clone(),
        };

        if let Err(e) = self.history.append(entry) {
            warn!("Download finished but was not saved to history: {}", e);
        }
    }
}

/// `<dir>/<sanitized title>.<extension>`, using the media id when the title sanitizes away.
pub fn output_path(output_dir: &Path, details: &MediaDetails, extension: &str) -> PathBuf {
    let stem = match sanitize_file_name(&details.title) {
        stem if stem.is_empty() => sanitize_file_name(&details.id),
        stem => stem,
    };

    output_dir.join(format!("{}.{}", stem, extension))
}

/// Returns `path`, or the first `<stem> (n).<ext>` sibling that does not exist yet.
pub fn unused_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|extension| format!(".{}", extension.to_string_lossy()))
        .unwrap_or_default();

    (2u32..)
        .map(|n| path.with_file_name(format!("{} ({}){}", stem, n, extension)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}
