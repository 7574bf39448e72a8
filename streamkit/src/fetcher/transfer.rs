//! Drives one encoding's byte transfer and reports telemetry samples.

use crate::error::{Error, Result};
use crate::model::EncodingDescriptor;
use crate::provider::CatalogProvider;
use crate::telemetry::{Sample, Sampler};
use std::path::Path;

/// Downloads single encodings through a provider.
#[derive(Clone, Copy)]
pub struct Transfer<'a> {
    provider: &'a dyn CatalogProvider,
}

impl<'a> Transfer<'a> {
    /// Creates a transfer driver over the given provider.
    pub fn new(provider: &'a dyn CatalogProvider) -> Self {
        Self { provider }
    }

    /// Downloads `encoding` into `destination`, overwriting it.
    ///
    /// Progress is throttled by a [`Sampler`] sized from the descriptor, or from the size the
    /// provider reports when it knows better. On success the sink always receives a terminal
    /// sample.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferFailed`] wrapping whatever the provider reported.
    /// The destination may hold a partial file afterwards.
    pub async fn run(
        &self,
        encoding: &EncodingDescriptor,
        destination: &Path,
        mut on_sample: Option<&mut (dyn FnMut(&Sample) + Send)>,
    ) -> Result<()> {
        tracing::debug!(
            "Transferring {} ({}) to {:?} via {}",
            encoding.format_id,
            encoding.kind,
            destination,
            self.provider.name()
        );

        let mut sampler = Sampler::new(encoding.size);
        let mut finished = false;

        let outcome = {
            let mut forward = |fraction: f64, total_bytes: u64| {
                sampler.resize(total_bytes);
                if let Some(sample) = sampler.observe(fraction) {
                    finished |= sample.finished;
                    if let Some(sink) = on_sample.as_mut() {
                        sink(&sample);
                    }
                }
            };

            self.provider
                .stream_to(encoding, destination, &mut forward)
                .await
        };

        if let Err(cause) = outcome {
            tracing::debug!("Transfer to {:?} failed: {}", destination, cause);
            return Err(Error::TransferFailed {
                destination: destination.to_path_buf(),
                cause,
            });
        }

        if !finished {
            if let (Some(sample), Some(sink)) = (sampler.observe(1.0), on_sample.as_mut()) {
                sink(&sample);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::{MediaItem, PlaylistInfo};
    use async_trait::async_trait;
    use std::time::Duration;

    struct ScriptedProvider {
        fractions: Vec<f64>,
        fail: bool,
        announced_size: u64,
        pause: Duration,
    }

    impl ScriptedProvider {
        fn new(fractions: Vec<f64>) -> Self {
            Self {
                fractions,
                fail: false,
                announced_size: 0,
                pause: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl CatalogProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_catalog(&self, media_id: &str) -> std::result::Result<MediaItem, ProviderError> {
            Err(ProviderError::Unavailable(media_id.to_string()))
        }

        async fn fetch_playlist(&self, playlist_id: &str) -> std::result::Result<PlaylistInfo, ProviderError> {
            Err(ProviderError::Unavailable(playlist_id.to_string()))
        }

        async fn stream_to(
            &self,
            _encoding: &EncodingDescriptor,
            destination: &Path,
            progress: &mut (dyn FnMut(f64, u64) + Send),
        ) -> std::result::Result<(), ProviderError> {
            tokio::fs::write(destination, b"partial").await?;
            for fraction in &self.fractions {
                if !self.pause.is_zero() {
                    tokio::time::sleep(self.pause).await;
                }
                progress(*fraction, self.announced_size);
            }
            if self.fail {
                return Err(ProviderError::Network("connection reset".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_samples_and_ends_with_a_terminal_one() {
        let provider = ScriptedProvider::new(vec![0.0, 0.4]);
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.mp4");
        let encoding = EncodingDescriptor::combined("18", "mp4", 1000, 360, "360p", 96.0);

        let mut samples = Vec::new();
        let mut sink = |sample: &Sample| samples.push(*sample);
        Transfer::new(&provider)
            .run(&encoding, &destination, Some(&mut sink))
            .await
            .unwrap();

        assert!(!samples.is_empty());
        assert!(samples.last().unwrap().finished);
        assert_eq!(samples.iter().filter(|s| s.finished).count(), 1);
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn provider_failures_become_transfer_failures() {
        let provider = ScriptedProvider {
            fail: true,
            ..ScriptedProvider::new(vec![0.1])
        };
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.m4a");
        let encoding = EncodingDescriptor::audio_only("140", "m4a", 1000, 128.0);

        let error = Transfer::new(&provider)
            .run(&encoding, &destination, None)
            .await
            .unwrap_err();

        match error {
            Error::TransferFailed { destination: path, cause } => {
                assert_eq!(path, destination);
                assert!(matches!(cause, ProviderError::Network(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsized_encodings_use_the_size_the_provider_announces() {
        let provider = ScriptedProvider {
            announced_size: 1000,
            pause: Duration::from_millis(150),
            ..ScriptedProvider::new(vec![0.0, 0.25, 0.5, 0.75, 1.0])
        };
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.mp4");
        let encoding = EncodingDescriptor::video_only("299", "mp4", 0, 1080, "1080p60");

        let mut samples = Vec::new();
        let mut sink = |sample: &Sample| samples.push(*sample);
        Transfer::new(&provider)
            .run(&encoding, &destination, Some(&mut sink))
            .await
            .unwrap();

        let last = samples.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.total_bytes, 1000);
        assert_eq!(last.bytes_so_far, 1000);
        assert!(last.average_speed > 0.0);
        assert!(samples.iter().skip(1).all(|s| s.bytes_so_far > 0 && s.speed > 0.0));
    }
}
