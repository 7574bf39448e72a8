//! The models describing a media item and the encodings it can be downloaded in.

use crate::utils::format_file_size;
use derive_more::Constructor;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod catalog;

pub use catalog::EncodingCatalog;

/// The tracks an encoding carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingKind {
    /// Video and audio already interleaved in one stream.
    Combined,
    /// A video track without sound.
    VideoOnly,
    /// An audio track without picture.
    AudioOnly,
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingKind::Combined => write!(f, "video+audio"),
            EncodingKind::VideoOnly => write!(f, "video only"),
            EncodingKind::AudioOnly => write!(f, "audio only"),
        }
    }
}

/// One downloadable representation of a media item.
///
/// Descriptors are produced by a [`CatalogProvider`](crate::provider::CatalogProvider)
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingDescriptor {
    /// The provider's identifier for this encoding, e.g. '137'.
    pub format_id: String,
    /// The tracks this encoding carries.
    pub kind: EncodingKind,
    /// The container, used as the file extension, e.g. 'mp4'.
    pub container: String,
    /// The size in bytes, 0 when the provider does not know it.
    pub size: u64,
    /// For video-carrying encodings, the ordinal quality (higher is better), usually the height.
    pub quality_rank: Option<u32>,
    /// For video-carrying encodings, a human label such as '1080p60'.
    pub label: Option<String>,
    /// For audio-carrying encodings, the bitrate in kbps.
    pub bitrate: Option<OrderedFloat<f64>>,
    /// Where the provider streams this encoding from.
    pub url: String,
}

impl EncodingDescriptor {
    /// A muxed encoding carrying both video and audio.
    pub fn combined(
        format_id: impl Into<String>,
        container: impl Into<String>,
        size: u64,
        quality_rank: u32,
        label: impl Into<String>,
        bitrate: f64,
    ) -> Self {
        Self {
            format_id: format_id.into(),
            kind: EncodingKind::Combined,
            container: container.into(),
            size,
            quality_rank: Some(quality_rank),
            label: Some(label.into()),
            bitrate: Some(OrderedFloat(bitrate)),
            url: String::new(),
        }
    }

    /// A video track without audio.
    pub fn video_only(
        format_id: impl Into<String>,
        container: impl Into<String>,
        size: u64,
        quality_rank: u32,
        label: impl Into<String>,
    ) -> Self {
        Self {
            format_id: format_id.into(),
            kind: EncodingKind::VideoOnly,
            container: container.into(),
            size,
            quality_rank: Some(quality_rank),
            label: Some(label.into()),
            bitrate: None,
            url: String::new(),
        }
    }

    /// An audio track without video.
    pub fn audio_only(
        format_id: impl Into<String>,
        container: impl Into<String>,
        size: u64,
        bitrate: f64,
    ) -> Self {
        Self {
            format_id: format_id.into(),
            kind: EncodingKind::AudioOnly,
            container: container.into(),
            size,
            quality_rank: None,
            label: None,
            bitrate: Some(OrderedFloat(bitrate)),
            url: String::new(),
        }
    }

    /// Sets the location the provider streams this encoding from.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// The label shown to users: the quality label for video, the bitrate for audio.
    pub fn quality_label(&self) -> String {
        match (&self.label, self.bitrate) {
            (Some(label), _) if self.kind != EncodingKind::AudioOnly => label.clone(),
            (_, Some(bitrate)) => format!("{:.0} kbps", bitrate.0),
            _ => self.format_id.clone(),
        }
    }
}

impl fmt::Display for EncodingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {}",
            self.quality_label(),
            self.container,
            format_file_size(self.size)
        )
    }
}

/// What a provider knows about a media item besides its encodings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct MediaDetails {
    /// The provider's identifier, e.g. a YouTube video id.
    pub id: String,
    /// The title.
    pub title: String,
    /// The channel or author name.
    pub channel: String,
    /// The canonical page URL.
    pub url: String,
    /// The length in seconds, when known.
    pub duration_secs: Option<u64>,
}

/// A media item together with every encoding the provider offers for it.
#[derive(Debug, Clone, PartialEq, Constructor)]
pub struct MediaItem {
    /// The descriptive fields.
    pub details: MediaDetails,
    /// The encodings, in provider order.
    pub encodings: Vec<EncodingDescriptor>,
}

/// One entry of a playlist listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct PlaylistEntry {
    /// The media identifier of the entry.
    pub id: String,
    /// The entry title, when the listing includes it.
    pub title: Option<String>,
}

/// A playlist and the media items it lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct PlaylistInfo {
    /// The playlist identifier.
    pub id: String,
    /// The playlist title.
    pub title: String,
    /// The playlist owner, when known.
    pub author: Option<String>,
    /// The entries, in playlist order.
    pub entries: Vec<PlaylistEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_labels() {
        let video = EncodingDescriptor::video_only("137", "mp4", 0, 1080, "1080p");
        let audio = EncodingDescriptor::audio_only("140", "m4a", 0, 129.47);

        assert_eq!(video.quality_label(), "1080p");
        assert_eq!(audio.quality_label(), "129 kbps");
    }

    #[test]
    fn display_includes_container_and_size() {
        let muxed = EncodingDescriptor::combined("18", "mp4", 1536, 360, "360p", 96.0);

        assert_eq!(muxed.to_string(), "360p | mp4 | 1.5 KB");
    }
}
