//! Sequential processing of batch files and playlists.
//!
//! Items run strictly one after another. A failed item is counted and the run moves on.

use crate::error::{AppError, Result};
use crate::session::{DownloadContext, ItemOutcome, Session, SessionSink, reborrow};
use crate::target::{self, Target};
use log::{info, warn};
use std::path::{Path, PathBuf};
use streamkit::utils::sanitize_file_name;

/// The targets of a batch file: one per line, skipping blank lines and `#` comments.
pub fn parse_batch(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match target::classify(line) {
            Target::Invalid => target::normalize(line),
            _ if line.contains('/') => target::normalize(line),
            _ => line.to_string(),
        })
        .collect()
}

/// Reads and parses a batch file.
pub fn read_batch_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|cause| AppError::BatchFile {
        path: path.to_path_buf(),
        cause,
    })?;

    Ok(parse_batch(&content))
}

/// The totals of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Each failed item with its reason, in run order.
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

impl FromIterator<(String, ItemOutcome)> for BatchSummary {
    fn from_iter<I: IntoIterator<Item = (String, ItemOutcome)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::default(), |mut summary, (item, outcome)| {
                match outcome {
                    ItemOutcome::Success(_) => summary.succeeded += 1,
                    ItemOutcome::Skipped(_) => summary.skipped += 1,
                    ItemOutcome::Failed(reason) => {
                        summary.failed += 1;
                        summary.failures.push((item, reason));
                    }
                }
                summary
            })
    }
}

/// Runs targets through a [`Session`] with one quality token for every item.
pub struct BatchRunner<'a> {
    session: &'a Session,
    token: String,
    output_dir: PathBuf,
    playlist_folders: bool,
}

impl<'a> BatchRunner<'a> {
    /// Creates a runner writing to `output_dir` with quality `token` for every item.
    pub fn new(session: &'a Session, token: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            token: token.into(),
            output_dir: output_dir.into(),
            playlist_folders: true,
        }
    }

    /// Whether playlist items go to a folder named after the playlist.
    pub fn with_playlist_folders(mut self, enabled: bool) -> Self {
        self.playlist_folders = enabled;
        self
    }

    /// The directory a playlist's items are written to.
    pub fn playlist_dir(&self, playlist_id: &str, title: &str) -> PathBuf {
        if !self.playlist_folders {
            return self.output_dir.clone();
        }

        match sanitize_file_name(title) {
            folder if folder.is_empty() => self.output_dir.join(sanitize_file_name(playlist_id)),
            folder => self.output_dir.join(folder),
        }
    }

    /// Downloads every entry of a playlist.
    ///
    /// # Errors
    ///
    /// Only when the playlist itself cannot be listed; item failures are outcomes.
    pub async fn run_playlist(
        &self,
        playlist_id: &str,
        mut on_event: SessionSink<'_>,
    ) -> Result<Vec<(String, ItemOutcome)>> {
        let playlist = self
            .session
            .provider()
            .fetch_playlist(playlist_id)
            .await
            .map_err(|cause| streamkit::Error::CatalogUnavailable {
                media_id: playlist_id.to_string(),
                cause,
            })?;

        let dir = self.playlist_dir(&playlist.id, &playlist.title);
        let context = DownloadContext::playlist(playlist.title.clone());
        let count = playlist.entries.len();
        info!("Playlist {} has {} videos", playlist.title, count);

        let mut outcomes = Vec::with_capacity(count);
        for (position, entry) in playlist.entries.iter().enumerate() {
            let name = entry.title.clone().unwrap_or_else(|| entry.id.clone());
            info!("[{}/{}] {}", position + 1, count, name);

            let outcome = self
                .download_item(&entry.id, &dir, &context, reborrow(&mut on_event))
                .await;
            outcomes.push((name, outcome));
        }

        Ok(outcomes)
    }

    /// Downloads one target, which may be a playlist.
    pub async fn run_target(
        &self,
        input: &str,
        on_event: SessionSink<'_>,
    ) -> Vec<(String, ItemOutcome)> {
        match target::classify(input) {
            Target::SingleItem(media_id) => {
                let outcome = self
                    .download_item(&media_id, &self.output_dir, &DownloadContext::batch(), on_event)
                    .await;
                vec![(input.to_string(), outcome)]
            }
            Target::Playlist(playlist_id) => match self.run_playlist(&playlist_id, on_event).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    warn!("Failed to list playlist {}: {}", playlist_id, e);
                    vec![(input.to_string(), ItemOutcome::Failed(e.to_string()))]
                }
            },
            Target::Invalid => {
                let reason = AppError::InvalidTarget(input.to_string()).to_string();
                warn!("{}", reason);
                vec![(input.to_string(), ItemOutcome::Failed(reason))]
            }
        }
    }

    /// Downloads every target in order and totals the outcomes.
    pub async fn run(&self, targets: &[String], mut on_event: SessionSink<'_>) -> BatchSummary {
        let mut outcomes = Vec::new();

        for (position, input) in targets.iter().enumerate() {
            info!("[{}/{}] {}", position + 1, targets.len(), input);
            outcomes.extend(self.run_target(input, reborrow(&mut on_event)).await);
        }

        outcomes.into_iter().collect()
    }

    async fn download_item(
        &self,
        media_id: &str,
        dir: &Path,
        context: &DownloadContext,
        on_event: SessionSink<'_>,
    ) -> ItemOutcome {
        match self
            .session
            .download(media_id, &self.token, dir, context, on_event)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to download {}: {}", media_id, e);
                ItemOutcome::Failed(e.to_string())
            }
        }
    }
}
