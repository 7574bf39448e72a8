//! Normalizes a provider's flat encoding list into three ordered families.

use crate::error::{Error, Result};
use crate::model::{EncodingDescriptor, EncodingKind, MediaDetails};
use crate::provider::CatalogProvider;
use std::cmp::Reverse;

/// The encodings of one media item, split by kind and ordered best first.
///
/// Combined and video-only encodings are ordered by descending quality rank,
/// audio-only encodings by descending bitrate. Ties keep provider order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingCatalog {
    combined: Vec<EncodingDescriptor>,
    video_only: Vec<EncodingDescriptor>,
    audio_only: Vec<EncodingDescriptor>,
}

impl EncodingCatalog {
    /// Partitions and orders an unordered list of encodings.
    pub fn from_encodings(encodings: impl IntoIterator<Item = EncodingDescriptor>) -> Self {
        let mut catalog = Self::default();

        for encoding in encodings {
            match encoding.kind {
                EncodingKind::Combined => catalog.combined.push(encoding),
                EncodingKind::VideoOnly => catalog.video_only.push(encoding),
                EncodingKind::AudioOnly => catalog.audio_only.push(encoding),
            }
        }

        catalog
            .combined
            .sort_by_key(|e| Reverse(e.quality_rank.unwrap_or(0)));
        catalog
            .video_only
            .sort_by_key(|e| Reverse(e.quality_rank.unwrap_or(0)));
        catalog
            .audio_only
            .sort_by_key(|e| Reverse(e.bitrate.unwrap_or_default()));

        catalog
    }

    /// Fetches the encodings of a media item from the provider.
    ///
    /// An item with no encodings at all is not an error: check [`EncodingCatalog::is_empty`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogUnavailable`] when the provider cannot supply the item.
    pub async fn fetch(
        provider: &dyn CatalogProvider,
        media_id: &str,
    ) -> Result<(MediaDetails, Self)> {
        tracing::debug!("Fetching encodings for {}", media_id);

        let item = provider
            .fetch_catalog(media_id)
            .await
            .map_err(|cause| Error::CatalogUnavailable {
                media_id: media_id.to_string(),
                cause,
            })?;

        let catalog = Self::from_encodings(item.encodings);
        tracing::debug!(
            "Catalog for {}: {} combined, {} video-only, {} audio-only",
            media_id,
            catalog.combined.len(),
            catalog.video_only.len(),
            catalog.audio_only.len()
        );

        Ok((item.details, catalog))
    }

    /// The muxed encodings, best first.
    pub fn combined(&self) -> &[EncodingDescriptor] {
        &self.combined
    }

    /// The video-only encodings, best first.
    pub fn video_only(&self) -> &[EncodingDescriptor] {
        &self.video_only
    }

    /// The audio-only encodings, highest bitrate first.
    pub fn audio_only(&self) -> &[EncodingDescriptor] {
        &self.audio_only
    }

    /// Whether the item offers no encodings at all.
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty() && self.video_only.is_empty() && self.audio_only.is_empty()
    }
}
