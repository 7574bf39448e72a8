//! Tools for fetching data from a URL and driving downloads.
//!
//! [`Fetcher`] streams one HTTP resource to disk, [`Transfer`] wires a provider's
//! stream download through telemetry, and [`MergeOrchestrator`] downloads a video and an
//! audio track and merges them.

use crate::error::Result;
use crate::utils::file_system;
use futures_util::StreamExt;
use reqwest::header::USER_AGENT;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};

pub mod merge;
pub mod transfer;

pub use merge::{MergeEvent, MergeOrchestrator, MergeState};
pub use transfer::Transfer;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Downloads a single URL, either as JSON or as a file.
#[derive(Debug, Clone)]
pub struct Fetcher {
    /// The URL from which to download the data.
    url: String,
    /// How long to wait for the server to start answering.
    connect_timeout: Duration,
}

impl fmt::Display for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fetcher(url={})", self.url)
    }
}

impl Fetcher {
    /// Creates a new fetcher for the given URL.
    pub fn new(url: impl AsRef<str>) -> Self {
        Self {
            url: url.as_ref().to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    fn client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()?;

        Ok(client)
    }

    /// Fetches the URL and parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the request fails, the server answers with an error status, or the body is not JSON.
    pub async fn fetch_json(&self) -> Result<serde_json::Value> {
        tracing::debug!("Fetching JSON from {}", self.url);

        let response = self
            .client()?
            .get(&self.url)
            .header(USER_AGENT, "rust-reqwest")
            .send()
            .await?
            .error_for_status()?;

        let json = response.json().await?;
        Ok(json)
    }

    /// Streams the resource into `destination`, overwriting it.
    ///
    /// `progress` receives the bytes written so far and the expected total, which is
    /// `expected_size` when known, otherwise the response's `Content-Length`, otherwise 0.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    ///
    /// # Errors
    ///
    /// Fails on network errors, error statuses, and write failures. A partial file may remain.
    pub async fn fetch_asset(
        &self,
        destination: impl AsRef<Path> + fmt::Debug,
        expected_size: Option<u64>,
        progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<u64> {
        tracing::debug!("Fetching asset from {} to {:?}", self.url, destination);

        file_system::create_parent_dir(&destination)?;

        let response = self
            .client()?
            .get(&self.url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let total = expected_size
            .filter(|size| *size > 0)
            .or(response.content_length())
            .unwrap_or(0);

        let file = file_system::create_file(&destination).await?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        progress(0, total);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;

            written += chunk.len() as u64;
            progress(written, total.max(written));
        }

        writer.flush().await?;
        tracing::debug!("Fetched {} bytes into {:?}", written, destination);

        Ok(written)
    }
}
