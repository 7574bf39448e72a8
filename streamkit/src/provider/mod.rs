//! The remote catalog and stream provider the download pipeline depends on.

use crate::error::ProviderError;
use crate::model::{EncodingDescriptor, MediaItem, PlaylistInfo};
use async_trait::async_trait;
use std::path::Path;

pub mod ytdlp;

pub use ytdlp::YtDlpProvider;

/// Supplies encoding catalogs, playlist listings and raw byte streams.
///
/// Implementations are passed explicitly to the components that need them.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Name of the provider (for logging).
    fn name(&self) -> &'static str;

    /// Fetches the details and every available encoding of a media item.
    async fn fetch_catalog(&self, media_id: &str) -> Result<MediaItem, ProviderError>;

    /// Lists the entries of a playlist.
    async fn fetch_playlist(&self, playlist_id: &str) -> Result<PlaylistInfo, ProviderError>;

    /// Writes the bytes of `encoding` to `destination`, overwriting it.
    ///
    /// `progress` receives the completed fraction in `[0, 1]`, non-decreasing, and the
    /// total size in bytes as far as the provider knows it (0 when unknown).
    async fn stream_to(
        &self,
        encoding: &EncodingDescriptor,
        destination: &Path,
        progress: &mut (dyn FnMut(f64, u64) + Send),
    ) -> Result<(), ProviderError>;
}
