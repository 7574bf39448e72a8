use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use streamkit::error::ProviderError;
use streamkit::fetcher::{MergeEvent, MergeState};
use streamkit::model::{EncodingDescriptor, MediaDetails, MediaItem, PlaylistInfo};
use streamkit::{CatalogProvider, Muxer};
use tubegrab::{DownloadContext, HistoryStore, ItemOutcome, JsonFile, Session, SessionEvent};

struct OneVideoProvider {
    streams: AtomicUsize,
}

#[async_trait]
impl CatalogProvider for OneVideoProvider {
    fn name(&self) -> &'static str {
        "one-video"
    }

    async fn fetch_catalog(&self, media_id: &str) -> Result<MediaItem, ProviderError> {
        Ok(MediaItem::new(
            MediaDetails::new(
                media_id.to_string(),
                "Night Drive".to_string(),
                "Synth Channel".to_string(),
                format!("https://www.youtube.com/watch?v={media_id}"),
                Some(300),
            ),
            vec![
                EncodingDescriptor::video_only("137", "mp4", 1_000_000, 1080, "1080p"),
                EncodingDescriptor::audio_only("140", "m4a", 100_000, 128.0),
            ],
        ))
    }

    async fn fetch_playlist(&self, playlist_id: &str) -> Result<PlaylistInfo, ProviderError> {
        Err(ProviderError::Unavailable(playlist_id.to_string()))
    }

    async fn stream_to(
        &self,
        encoding: &EncodingDescriptor,
        destination: &Path,
        progress: &mut (dyn FnMut(f64, u64) + Send),
    ) -> Result<(), ProviderError> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        progress(0.0, 0);
        tokio::fs::write(destination, format!("[{}]", encoding.format_id)).await?;
        progress(1.0, 0);
        Ok(())
    }
}

#[derive(Default)]
struct CountingMuxer {
    calls: AtomicUsize,
}

#[async_trait]
impl Muxer for CountingMuxer {
    async fn combine(&self, video: &Path, audio: &Path, output: &Path) -> streamkit::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(video.exists());
        assert!(audio.exists());

        let mut bytes = tokio::fs::read(video).await?;
        bytes.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

#[tokio::test]
async fn highest_quality_merges_records_and_cleans_up() {
    let temp_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();
    let history_file = config_dir.path().join("download-history.json");

    let provider = Arc::new(OneVideoProvider {
        streams: AtomicUsize::new(0),
    });
    let muxer = Arc::new(CountingMuxer::default());
    let history = Arc::new(HistoryStore::open(JsonFile::new(&history_file)));
    let session = Session::new(provider.clone(), Some(muxer.clone() as Arc<dyn Muxer>), history.clone())
        .with_temp_dir(temp_dir.path());

    let mut states = Vec::new();
    let mut observer = |event: SessionEvent<'_>| {
        if let SessionEvent::Merge(MergeEvent::State(state)) = event {
            states.push(state);
        }
    };
    let outcome = session
        .download(
            "dQw4w9WgXcQ",
            "",
            output_dir.path(),
            &DownloadContext::single(),
            Some(&mut observer),
        )
        .await
        .unwrap();

    let output = output_dir.path().join("Night_Drive.mp4");
    assert_eq!(outcome, ItemOutcome::Success(output.clone()));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "[137][140]");
    assert_eq!(provider.streams.load(Ordering::SeqCst), 2);
    assert_eq!(muxer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        states,
        vec![
            MergeState::Idle,
            MergeState::DownloadingVideo,
            MergeState::DownloadingAudio,
            MergeState::Merging,
            MergeState::Done,
        ]
    );
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

    let entry = history.find_by_media_id("dQw4w9WgXcQ").unwrap();
    assert_eq!(entry.video_id, "dQw4w9WgXcQ");
    assert!(!entry.is_playlist);
    assert_eq!(entry.quality, "highest");
    assert_eq!(entry.file_path, output);

    let reopened = HistoryStore::open(JsonFile::new(&history_file));
    assert_eq!(reopened.list(None), history.list(None));
}
