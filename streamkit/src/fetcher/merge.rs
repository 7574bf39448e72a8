//! Downloads a video-only and an audio-only encoding and merges them into one file.
//!
//! Each call moves through `Idle → DownloadingVideo → DownloadingAudio → Merging → Done`,
//! or to `Failed` from any non-terminal state. Both temporary tracks are removed before the
//! call returns, whatever the outcome.

use crate::error::{Error, MergeStage, Result};
use crate::fetcher::Transfer;
use crate::model::EncodingDescriptor;
use crate::mux::Muxer;
use crate::provider::CatalogProvider;
use crate::telemetry::Sample;
use crate::utils::file_system;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Where a merge currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeState {
    /// Nothing started yet.
    Idle,
    /// The video track is being downloaded.
    DownloadingVideo,
    /// The audio track is being downloaded.
    DownloadingAudio,
    /// The muxer is running.
    Merging,
    /// The output file was written.
    Done,
    /// A stage failed.
    Failed,
}

/// What a merge reports to its observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeEvent<'s> {
    /// The merge entered a new state.
    State(MergeState),
    /// A telemetry sample for one of the downloads.
    Progress {
        /// The download the sample belongs to.
        stage: MergeStage,
        /// The sample.
        sample: &'s Sample,
    },
}

/// The observer a merge reports to.
pub type MergeSink<'a> = Option<&'a mut (dyn FnMut(MergeEvent<'_>) + Send)>;

fn emit(sink: &mut MergeSink<'_>, event: MergeEvent<'_>) {
    if let Some(sink) = sink.as_mut() {
        sink(event);
    }
}

/// Releases an output path claim when dropped.
struct OutputClaim<'a> {
    in_flight: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for OutputClaim<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.path);
    }
}

/// Runs video+audio downloads followed by a stream-copy merge.
///
/// At most one merge may target a given output path at a time; merges to different
/// paths are independent and use disjoint temporary files.
pub struct MergeOrchestrator {
    provider: Arc<dyn CatalogProvider>,
    muxer: Arc<dyn Muxer>,
    temp_dir: PathBuf,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl MergeOrchestrator {
    /// Creates an orchestrator writing its temporary tracks to the system temp directory.
    pub fn new(provider: Arc<dyn CatalogProvider>, muxer: Arc<dyn Muxer>) -> Self {
        Self {
            provider,
            muxer,
            temp_dir: std::env::temp_dir(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Writes temporary tracks to `temp_dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// The directory temporary tracks are written to.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    fn claim(&self, output: &Path) -> Result<OutputClaim<'_>> {
        let path = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if !in_flight.insert(path.clone()) {
            return Err(Error::OutputInUse(path));
        }

        Ok(OutputClaim {
            in_flight: &self.in_flight,
            path,
        })
    }

    /// Downloads both tracks to temporary files, merges them into `output`, and removes the temporaries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputInUse`] when another merge targets `output`, and
    /// [`Error::MergeFailed`] carrying the failing stage otherwise. Failing to delete a
    /// temporary file is logged, never reported.
    pub async fn download_and_merge(
        &self,
        video: &EncodingDescriptor,
        audio: &EncodingDescriptor,
        output: &Path,
        mut on_event: MergeSink<'_>,
    ) -> Result<()> {
        let _claim = self.claim(output)?;
        emit(&mut on_event, MergeEvent::State(MergeState::Idle));

        let video_path = file_system::unique_temp_path(&self.temp_dir, &video.container);
        let audio_path = file_system::unique_temp_path(&self.temp_dir, &audio.container);
        tracing::debug!(
            "Merging {} and {} into {:?} (temporaries {:?}, {:?})",
            video.format_id,
            audio.format_id,
            output,
            video_path,
            audio_path
        );

        let outcome = self
            .run_stages(video, audio, &video_path, &audio_path, output, &mut on_event)
            .await;

        for path in [&video_path, &audio_path] {
            file_system::remove_temp_file(path).await;
        }

        match &outcome {
            Ok(()) => emit(&mut on_event, MergeEvent::State(MergeState::Done)),
            Err(e) => {
                tracing::debug!("Merge into {:?} failed: {}", output, e);
                emit(&mut on_event, MergeEvent::State(MergeState::Failed));
            }
        }

        outcome
    }

    async fn run_stages(
        &self,
        video: &EncodingDescriptor,
        audio: &EncodingDescriptor,
        video_path: &Path,
        audio_path: &Path,
        output: &Path,
        on_event: &mut MergeSink<'_>,
    ) -> Result<()> {
        let failed = |stage: MergeStage| move |cause: Error| Error::MergeFailed {
            stage,
            cause: Box::new(cause),
        };
        let transfer = Transfer::new(self.provider.as_ref());

        file_system::create_dir(&self.temp_dir).map_err(failed(MergeStage::VideoDownload))?;

        for (stage, state, encoding, path) in [
            (MergeStage::VideoDownload, MergeState::DownloadingVideo, video, video_path),
            (MergeStage::AudioDownload, MergeState::DownloadingAudio, audio, audio_path),
        ] {
            emit(on_event, MergeEvent::State(state));

            let mut forward = |sample: &Sample| emit(on_event, MergeEvent::Progress { stage, sample });
            transfer
                .run(encoding, path, Some(&mut forward))
                .await
                .map_err(failed(stage))?;
        }

        emit(on_event, MergeEvent::State(MergeState::Merging));
        file_system::create_parent_dir(output).map_err(failed(MergeStage::Merge))?;
        self.muxer
            .combine(video_path, audio_path, output)
            .await
            .map_err(failed(MergeStage::Merge))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::{MediaItem, PlaylistInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes a few bytes for every encoding, failing for the listed format ids.
    struct FakeProvider {
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl CatalogProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_catalog(&self, media_id: &str) -> std::result::Result<MediaItem, ProviderError> {
            Err(ProviderError::Unavailable(media_id.to_string()))
        }

        async fn fetch_playlist(&self, playlist_id: &str) -> std::result::Result<PlaylistInfo, ProviderError> {
            Err(ProviderError::Unavailable(playlist_id.to_string()))
        }

        async fn stream_to(
            &self,
            encoding: &EncodingDescriptor,
            destination: &Path,
            progress: &mut (dyn FnMut(f64, u64) + Send),
        ) -> std::result::Result<(), ProviderError> {
            tokio::fs::write(destination, encoding.format_id.as_bytes()).await?;
            progress(0.5, 0);
            if self.failing.contains(&encoding.format_id.as_str()) {
                return Err(ProviderError::Network("stream invalidated".to_string()));
            }
            progress(1.0, 0);
            Ok(())
        }
    }

    struct FakeMuxer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Muxer for FakeMuxer {
        async fn combine(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(video.exists() && audio.exists());
            if self.fail {
                return Err(Error::Command("muxer crashed".to_string()));
            }
            tokio::fs::write(output, b"merged").await?;
            Ok(())
        }
    }

    fn orchestrator(failing: Vec<&'static str>, muxer_fails: bool, temp: &Path) -> (MergeOrchestrator, Arc<FakeMuxer>) {
        let muxer = Arc::new(FakeMuxer {
            calls: AtomicUsize::new(0),
            fail: muxer_fails,
        });
        let orchestrator = MergeOrchestrator::new(Arc::new(FakeProvider { failing }), muxer.clone())
            .with_temp_dir(temp);
        (orchestrator, muxer)
    }

    fn tracks() -> (EncodingDescriptor, EncodingDescriptor) {
        (
            EncodingDescriptor::video_only("137", "mp4", 100, 1080, "1080p"),
            EncodingDescriptor::audio_only("140", "m4a", 100, 128.0),
        )
    }

    fn leftover_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn successful_merge_reports_every_state_and_cleans_up() {
        let temp = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("video.mp4");
        let (orchestrator, muxer) = orchestrator(vec![], false, temp.path());
        let (video, audio) = tracks();

        let mut states = Vec::new();
        let mut progress_stages = HashSet::new();
        let mut sink = |event: MergeEvent<'_>| match event {
            MergeEvent::State(state) => states.push(state),
            MergeEvent::Progress { stage, .. } => {
                progress_stages.insert(stage);
            }
        };

        orchestrator
            .download_and_merge(&video, &audio, &output, Some(&mut sink))
            .await
            .unwrap();

        assert_eq!(
            states,
            vec![
                MergeState::Idle,
                MergeState::DownloadingVideo,
                MergeState::DownloadingAudio,
                MergeState::Merging,
                MergeState::Done
            ]
        );
        assert!(progress_stages.contains(&MergeStage::VideoDownload));
        assert!(progress_stages.contains(&MergeStage::AudioDownload));
        assert_eq!(muxer.calls.load(Ordering::SeqCst), 1);
        assert!(output.exists());
        assert_eq!(leftover_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn every_failure_stage_is_reported_and_cleaned_up() {
        let cases = [
            (vec!["137"], false, MergeStage::VideoDownload),
            (vec!["140"], false, MergeStage::AudioDownload),
            (vec![], true, MergeStage::Merge),
        ];

        for (failing, muxer_fails, expected) in cases {
            let temp = tempfile::tempdir().unwrap();
            let out_dir = tempfile::tempdir().unwrap();
            let output = out_dir.path().join("video.mp4");
            let (orchestrator, _) = orchestrator(failing, muxer_fails, temp.path());
            let (video, audio) = tracks();

            let mut last_state = MergeState::Idle;
            let mut sink = |event: MergeEvent<'_>| {
                if let MergeEvent::State(state) = event {
                    last_state = state;
                }
            };

            let error = orchestrator
                .download_and_merge(&video, &audio, &output, Some(&mut sink))
                .await
                .unwrap_err();

            assert_eq!(error.merge_stage(), Some(expected));
            assert_eq!(last_state, MergeState::Failed);
            assert_eq!(leftover_files(temp.path()), 0, "stage {expected}");
        }
    }

    #[tokio::test]
    async fn one_merge_per_output_path() {
        let temp = tempfile::tempdir().unwrap();
        let (orchestrator, _) = orchestrator(vec![], false, temp.path());
        let output = temp.path().join("busy.mp4");

        let claim = orchestrator.claim(&output).unwrap();
        assert!(matches!(
            orchestrator.claim(&output),
            Err(Error::OutputInUse(_))
        ));
        assert!(orchestrator.claim(&temp.path().join("other.mp4")).is_ok());

        drop(claim);
        assert!(orchestrator.claim(&output).is_ok());
    }

    #[tokio::test]
    async fn busy_output_fails_without_touching_the_provider() {
        let temp = tempfile::tempdir().unwrap();
        let (orchestrator, muxer) = orchestrator(vec![], false, temp.path());
        let output = temp.path().join("busy.mp4");
        let (video, audio) = tracks();

        let _claim = orchestrator.claim(&output).unwrap();
        let error = orchestrator
            .download_and_merge(&video, &audio, &output, None)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::OutputInUse(_)));
        assert_eq!(muxer.calls.load(Ordering::SeqCst), 0);
    }
}
