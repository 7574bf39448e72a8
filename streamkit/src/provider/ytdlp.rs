//! A [`CatalogProvider`] backed by the `yt-dlp` executable.
//!
//! Catalogs come from `yt-dlp --dump-json`; streams are fetched directly over HTTP from the
//! format URLs it reports.

use crate::error::{Error, ProviderError};
use crate::executor::Executor;
use crate::fetcher::Fetcher;
use crate::model::{
    EncodingDescriptor, EncodingKind, MediaDetails, MediaItem, PlaylistEntry, PlaylistInfo,
};
use crate::provider::CatalogProvider;
use crate::utils;
use async_trait::async_trait;
use ordered_float::OrderedFloat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runs `yt-dlp` to list encodings and playlists.
#[derive(Debug, Clone, PartialEq)]
pub struct YtDlpProvider {
    /// The path to the `yt-dlp` executable.
    pub executable_path: PathBuf,
    /// How long one metadata extraction may take.
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    ext: String,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    format_note: Option<String>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    filesize: Option<f64>,
    #[serde(default)]
    filesize_approx: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    entries: Vec<RawPlaylistEntry>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylistEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

fn has_track(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| c != "none")
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

impl RawFormat {
    fn kind(&self) -> Option<EncodingKind> {
        match (has_track(&self.vcodec), has_track(&self.acodec)) {
            (true, true) => Some(EncodingKind::Combined),
            (true, false) => Some(EncodingKind::VideoOnly),
            (false, true) => Some(EncodingKind::AudioOnly),
            (false, false) => None,
        }
    }

    fn is_direct(&self) -> bool {
        let protocol_ok = matches!(self.protocol.as_deref(), None | Some("http") | Some("https"));
        let url_ok = self
            .url
            .as_deref()
            .is_some_and(|url| url.starts_with("http://") || url.starts_with("https://"));

        protocol_ok && url_ok && self.ext != "mhtml"
    }

    fn label(&self, height: Option<u32>) -> Option<String> {
        match (self.format_note.as_deref(), height) {
            (Some(note), _) if !note.trim().is_empty() => Some(note.trim().to_string()),
            (_, Some(height)) => match positive(self.fps) {
                Some(fps) if fps > 30.0 => Some(format!("{}p{:.0}", height, fps)),
                _ => Some(format!("{}p", height)),
            },
            _ => None,
        }
    }

    fn into_descriptor(self) -> Option<EncodingDescriptor> {
        let kind = self.kind()?;
        if !self.is_direct() {
            return None;
        }

        let height = positive(self.height).map(|h| h as u32);
        let carries_video = kind != EncodingKind::AudioOnly;
        let carries_audio = kind != EncodingKind::VideoOnly;

        let bitrate = if carries_audio {
            positive(self.abr)
                .or(if kind == EncodingKind::AudioOnly {
                    positive(self.tbr)
                } else {
                    None
                })
                .map(OrderedFloat)
        } else {
            None
        };
        let size = positive(self.filesize)
            .or(positive(self.filesize_approx))
            .map_or(0, |s| s as u64);
        let label = if carries_video { self.label(height) } else { None };

        Some(EncodingDescriptor {
            format_id: self.format_id,
            kind,
            container: self.ext,
            size,
            quality_rank: if carries_video { Some(height.unwrap_or(0)) } else { None },
            label,
            bitrate,
            url: self.url.unwrap_or_default(),
        })
    }
}

/// Parses the output of `yt-dlp --dump-json` into a media item.
pub fn parse_media_item(json: &str) -> serde_json::Result<MediaItem> {
    let raw: RawMedia = serde_json::from_str(json)?;

    let details = MediaDetails {
        url: raw
            .webpage_url
            .unwrap_or_else(|| YtDlpProvider::watch_url(&raw.id)),
        title: raw.title.unwrap_or_else(|| raw.id.clone()),
        channel: raw.channel.or(raw.uploader).unwrap_or_default(),
        duration_secs: positive(raw.duration).map(|d| d.round() as u64),
        id: raw.id,
    };
    let encodings = raw
        .formats
        .into_iter()
        .filter_map(RawFormat::into_descriptor)
        .collect();

    Ok(MediaItem::new(details, encodings))
}

/// Parses the output of `yt-dlp --flat-playlist --dump-single-json` into a playlist listing.
pub fn parse_playlist(json: &str) -> serde_json::Result<PlaylistInfo> {
    let raw: RawPlaylist = serde_json::from_str(json)?;

    let entries = raw
        .entries
        .into_iter()
        .filter_map(|entry| Some(PlaylistEntry::new(entry.id?, entry.title)))
        .collect();

    Ok(PlaylistInfo::new(
        raw.id.clone(),
        raw.title.unwrap_or(raw.id),
        raw.channel.or(raw.uploader),
        entries,
    ))
}

/// Maps `yt-dlp`'s error output onto a provider failure category.
pub fn classify_failure(stderr: &str) -> ProviderError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .unwrap_or(stderr)
        .trim()
        .to_string();
    let lower = stderr.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if mentions(&["http error 429", "too many requests", "rate-limit", "rate limit"]) {
        ProviderError::RateLimited(message)
    } else if mentions(&[
        "private video",
        "video unavailable",
        "has been removed",
        "is not available",
        "does not exist",
        "account associated with this video has been terminated",
        "this playlist does not exist",
        "http error 404",
    ]) {
        ProviderError::Unavailable(message)
    } else if mentions(&[
        "sign in to confirm",
        "confirm your age",
        "age-restricted",
        "inappropriate for some users",
        "drm",
        "members-only",
        "requires payment",
        "live event will begin",
    ]) {
        ProviderError::Unplayable(message)
    } else if mentions(&[
        "timed out",
        "unable to download webpage",
        "getaddrinfo",
        "name or service not known",
        "temporary failure in name resolution",
        "connection reset",
        "connection refused",
        "network is unreachable",
    ]) {
        ProviderError::Network(message)
    } else {
        ProviderError::Other(message)
    }
}

fn from_library_error(error: Error) -> ProviderError {
    match error {
        Error::Reqwest(e) => ProviderError::from(e),
        Error::IO(e) => ProviderError::Io(e),
        Error::Timeout(duration) => {
            ProviderError::Network(format!("timed out after {:?}", duration))
        }
        other => ProviderError::Other(other.to_string()),
    }
}

impl YtDlpProvider {
    /// Creates a provider using the given executable and a two minute extraction timeout.
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable_path.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Sets the extraction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The watch page of a video id; full URLs are returned unchanged.
    pub fn watch_url(media_id: &str) -> String {
        if media_id.starts_with("http://") || media_id.starts_with("https://") {
            return media_id.to_string();
        }

        format!("https://www.youtube.com/watch?v={}", media_id)
    }

    /// The listing page of a playlist id; full URLs are returned unchanged.
    pub fn playlist_url(playlist_id: &str) -> String {
        if playlist_id.starts_with("http://") || playlist_id.starts_with("https://") {
            return playlist_id.to_string();
        }

        format!("https://www.youtube.com/playlist?list={}", playlist_id)
    }

    async fn dump(&self, args: Vec<&str>) -> Result<String, ProviderError> {
        let executor = Executor::new(&self.executable_path, self.timeout, utils::to_owned(args));
        let output = executor.run().await.map_err(from_library_error)?;

        if !output.success() {
            return Err(classify_failure(&output.stderr));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl CatalogProvider for YtDlpProvider {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_catalog(&self, media_id: &str) -> Result<MediaItem, ProviderError> {
        let url = Self::watch_url(media_id);
        let stdout = self
            .dump(vec!["--no-progress", "--no-warnings", "--no-playlist", "--dump-json", &url])
            .await?;

        parse_media_item(&stdout).map_err(|e| ProviderError::Other(e.to_string()))
    }

    async fn fetch_playlist(&self, playlist_id: &str) -> Result<PlaylistInfo, ProviderError> {
        let url = Self::playlist_url(playlist_id);
        let stdout = self
            .dump(vec![
                "--no-progress",
                "--no-warnings",
                "--flat-playlist",
                "--dump-single-json",
                &url,
            ])
            .await?;

        parse_playlist(&stdout).map_err(|e| ProviderError::Other(e.to_string()))
    }

    async fn stream_to(
        &self,
        encoding: &EncodingDescriptor,
        destination: &Path,
        progress: &mut (dyn FnMut(f64, u64) + Send),
    ) -> Result<(), ProviderError> {
        if encoding.url.is_empty() {
            return Err(ProviderError::Unplayable(format!(
                "format {} has no direct URL",
                encoding.format_id
            )));
        }

        let mut last_fraction = -1.0;
        let mut report = |written: u64, total: u64| {
            if total == 0 {
                return;
            }
            // 1.0 is reserved for the end of the stream, when the size is certain.
            let fraction = (written as f64 / total as f64).min(0.999);
            if fraction > last_fraction {
                last_fraction = fraction;
                progress(fraction, total);
            }
        };

        let written = Fetcher::new(&encoding.url)
            .fetch_asset(destination, Some(encoding.size), &mut report)
            .await
            .map_err(from_library_error)?;

        progress(1.0, written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "channel": "Rick Astley",
        "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "duration": 212.4,
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none", "protocol": "mhtml", "url": "https://i.ytimg.com/sb/0"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 3433514, "protocol": "https", "url": "https://rr.example/140"},
            {"format_id": "251", "ext": "webm", "vcodec": "none", "acodec": "opus", "tbr": 135.2, "filesize_approx": 3500000, "protocol": "https", "url": "https://rr.example/251"},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "format_note": "360p", "abr": 96, "filesize": 8000000, "protocol": "https", "url": "https://rr.example/18"},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "fps": 25, "filesize": 80000000, "protocol": "https", "url": "https://rr.example/137"},
            {"format_id": "299", "ext": "mp4", "vcodec": "avc1.64002a", "acodec": "none", "height": 1080, "fps": 60, "protocol": "https", "url": "https://rr.example/299"},
            {"format_id": "96", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "mp4a.40.2", "height": 1080, "protocol": "m3u8_native", "url": "https://manifest.example/96"}
        ]
    }"#;

    #[test]
    fn maps_formats_to_descriptors() {
        let item = parse_media_item(VIDEO_JSON).unwrap();

        assert_eq!(item.details.id, "dQw4w9WgXcQ");
        assert_eq!(item.details.channel, "Rick Astley");
        assert_eq!(item.details.duration_secs, Some(212));

        let ids: Vec<_> = item.encodings.iter().map(|e| e.format_id.as_str()).collect();
        assert_eq!(ids, vec!["140", "251", "18", "137", "299"]);

        let by_id = |id: &str| item.encodings.iter().find(|e| e.format_id == id).unwrap();

        let audio = by_id("140");
        assert_eq!(audio.kind, EncodingKind::AudioOnly);
        assert_eq!(audio.bitrate, Some(OrderedFloat(129.5)));
        assert_eq!(audio.size, 3433514);
        assert_eq!(audio.quality_rank, None);

        assert_eq!(by_id("251").bitrate, Some(OrderedFloat(135.2)));
        assert_eq!(by_id("251").size, 3500000);

        let muxed = by_id("18");
        assert_eq!(muxed.kind, EncodingKind::Combined);
        assert_eq!(muxed.quality_rank, Some(360));
        assert_eq!(muxed.label.as_deref(), Some("360p"));

        let video = by_id("137");
        assert_eq!(video.kind, EncodingKind::VideoOnly);
        assert_eq!(video.label.as_deref(), Some("1080p"));
        assert_eq!(video.bitrate, None);
        assert_eq!(by_id("299").label.as_deref(), Some("1080p60"));
        assert_eq!(by_id("299").size, 0);
    }

    #[test]
    fn parses_flat_playlists() {
        let json = r#"{
            "id": "PLxyz",
            "title": "Mix",
            "uploader": "Someone",
            "entries": [
                {"id": "aaaaaaaaaaa", "title": "First"},
                {"title": "Entry without id"},
                {"id": "bbbbbbbbbbb", "title": null}
            ]
        }"#;

        let playlist = parse_playlist(json).unwrap();

        assert_eq!(playlist.title, "Mix");
        assert_eq!(playlist.author.as_deref(), Some("Someone"));
        assert_eq!(
            playlist.entries,
            vec![
                PlaylistEntry::new("aaaaaaaaaaa".to_string(), Some("First".to_string())),
                PlaylistEntry::new("bbbbbbbbbbb".to_string(), None),
            ]
        );
    }

    #[test]
    fn classifies_provider_failures() {
        let cases = [
            ("ERROR: [youtube] abc: Private video. Sign in if you've been granted access", "unavailable"),
            ("ERROR: [youtube] abc: Video unavailable", "unavailable"),
            ("ERROR: [youtube] abc: Sign in to confirm your age.", "unplayable"),
            ("ERROR: [youtube] abc: This video is DRM protected", "unplayable"),
            ("ERROR: unable to download webpage: HTTP Error 429: Too Many Requests", "rate-limited"),
            ("ERROR: [youtube] abc: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>", "network"),
            ("ERROR: something odd happened", "other"),
        ];

        for (stderr, expected) in cases {
            let category = match classify_failure(stderr) {
                ProviderError::Unavailable(_) => "unavailable",
                ProviderError::Unplayable(_) => "unplayable",
                ProviderError::RateLimited(_) => "rate-limited",
                ProviderError::Network(_) => "network",
                ProviderError::Io(_) => "io",
                ProviderError::Other(_) => "other",
            };
            assert_eq!(category, expected, "{stderr}");
        }
    }

    #[test]
    fn keeps_the_last_error_line() {
        let stderr = "WARNING: retrying\nERROR: [youtube] abc: Video unavailable\n";

        match classify_failure(stderr) {
            ProviderError::Unavailable(message) => {
                assert_eq!(message, "ERROR: [youtube] abc: Video unavailable")
            }
            other => panic!("unexpected category: {other:?}"),
        }
    }

    #[test]
    fn builds_page_urls() {
        assert_eq!(
            YtDlpProvider::watch_url("dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            YtDlpProvider::playlist_url("PLxyz"),
            "https://www.youtube.com/playlist?list=PLxyz"
        );
        assert_eq!(
            YtDlpProvider::watch_url("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[tokio::test]
    async fn encodings_without_urls_are_unplayable() {
        let provider = YtDlpProvider::new("yt-dlp");
        let encoding = EncodingDescriptor::audio_only("140", "m4a", 10, 128.0);
        let dir = tempfile::tempdir().unwrap();

        let result = provider
            .stream_to(&encoding, &dir.path().join("a.m4a"), &mut |_: f64, _: u64| {})
            .await;

        assert!(matches!(result, Err(ProviderError::Unplayable(_))));
    }
}
