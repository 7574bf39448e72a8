//! Locating and installing the external tools: `yt-dlp` and `ffmpeg`.

use crate::error::Result;
use crate::executor::Executor;
use crate::fetcher::Fetcher;
use crate::utils::{self, file_system};
use derive_more::Constructor;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod ffmpeg;
pub mod ytdlp;

use ffmpeg::BuildFetcher;
use ytdlp::GitHubFetcher;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Where each tool was found, if it was found.
#[derive(Constructor, Clone, Debug, Default, PartialEq, Eq)]
pub struct Libraries {
    /// The path to a working `yt-dlp` executable.
    pub ytdlp: Option<PathBuf>,
    /// The path to a working `ffmpeg` executable.
    pub ffmpeg: Option<PathBuf>,
}

/// Where to look for the tools, in priority order after the custom paths.
#[derive(Constructor, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchPaths {
    /// The directory installed executables are kept in.
    pub libs_dir: PathBuf,
    /// A user-configured `yt-dlp` path, tried first.
    pub custom_ytdlp: Option<PathBuf>,
    /// A user-configured `ffmpeg` path, tried first.
    pub custom_ffmpeg: Option<PathBuf>,
}

/// Runs `<executable> <version_flag>` and returns the first output line if it succeeds.
pub async fn probe(executable: impl Into<PathBuf>, version_flag: &str) -> Option<String> {
    let executor = Executor::new(executable, PROBE_TIMEOUT, utils::to_owned(vec![version_flag]));

    match executor.execute().await {
        Ok(output) => Some(output.stdout.lines().next().unwrap_or_default().trim().to_string()),
        Err(e) => {
            tracing::debug!("Probe of {:?} failed: {}", executor.executable_path, e);
            None
        }
    }
}

/// Extracts the version number from the first line of `ffmpeg -version`.
pub fn ffmpeg_version(banner: &str) -> Option<String> {
    let re = Regex::new(r"ffmpeg version (\S+)").ok()?;
    re.captures(banner)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

async fn locate_tool(
    name: &str,
    version_flag: &str,
    custom: Option<&Path>,
    libs_dir: &Path,
) -> Option<PathBuf> {
    let installed = libs_dir.join(utils::find_executable(name));
    let mut candidates: Vec<PathBuf> = custom.map(Path::to_path_buf).into_iter().collect();
    if installed.exists() {
        candidates.push(installed);
    }
    candidates.push(PathBuf::from(utils::find_executable(name)));

    for candidate in candidates {
        if let Some(banner) = probe(&candidate, version_flag).await {
            tracing::debug!("Found {} at {:?}: {}", name, candidate, banner);
            return Some(candidate);
        }
    }

    tracing::debug!("{} not found", name);
    None
}

impl Libraries {
    /// Looks for each tool in its custom path, then the libs directory, then `PATH`.
    ///
    /// A candidate only counts when it answers a version probe.
    pub async fn locate(paths: &SearchPaths) -> Self {
        let ytdlp = locate_tool(
            "yt-dlp",
            "--version",
            paths.custom_ytdlp.as_deref(),
            &paths.libs_dir,
        )
        .await;
        let ffmpeg = locate_tool(
            "ffmpeg",
            "-version",
            paths.custom_ffmpeg.as_deref(),
            &paths.libs_dir,
        )
        .await;

        Self { ytdlp, ffmpeg }
    }

    /// Whether both tools are available.
    pub fn is_complete(&self) -> bool {
        self.ytdlp.is_some() && self.ffmpeg.is_some()
    }

    /// Installs whichever tools are missing into the installer's directory.
    ///
    /// Each tool is installed independently: a failed `ffmpeg` install still returns the
    /// `yt-dlp` result, with the error logged.
    pub async fn install_missing(self, installer: &LibraryInstaller) -> Self {
        let ytdlp = match self.ytdlp {
            Some(path) => Some(path),
            None => installer
                .install_ytdlp()
                .await
                .inspect_err(|e| tracing::warn!("Failed to install yt-dlp: {}", e))
                .ok(),
        };
        let ffmpeg = match self.ffmpeg {
            Some(path) => Some(path),
            None => installer
                .install_ffmpeg()
                .await
                .inspect_err(|e| tracing::warn!("Failed to install ffmpeg: {}", e))
                .ok(),
        };

        Self { ytdlp, ffmpeg }
    }
}

/// Installs the tools into one directory.
///
/// # Examples
///
/// ```rust,no_run
/// # use streamkit::deps::LibraryInstaller;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let installer = LibraryInstaller::new(PathBuf::from("libs"));
///
/// let ytdlp = installer.install_ytdlp().await?;
/// let ffmpeg = installer.install_ffmpeg().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Constructor, Clone, Debug)]
pub struct LibraryInstaller {
    /// The destination directory for the executables.
    pub destination: PathBuf,
}

impl LibraryInstaller {
    /// Installs the latest `yt-dlp` release binary for this platform.
    pub async fn install_ytdlp(&self) -> Result<PathBuf> {
        tracing::debug!("Installing yt-dlp into {:?}", self.destination);

        file_system::create_dir(&self.destination)?;
        let path = self.destination.join(utils::find_executable("yt-dlp"));

        let release = GitHubFetcher::new("yt-dlp", "yt-dlp")
            .fetch_release()
            .await?;
        release.download(&path).await?;
        file_system::set_executable(&path)?;

        Ok(path)
    }

    /// Installs a static `ffmpeg` build for this platform.
    pub async fn install_ffmpeg(&self) -> Result<PathBuf> {
        tracing::debug!("Installing ffmpeg into {:?}", self.destination);

        file_system::create_dir(&self.destination)?;

        let fetcher = BuildFetcher::new();
        let release = fetcher.fetch_binary()?;
        let archive = self.destination.join(&release.name);

        release.download(&archive).await?;
        fetcher.extract_binary(archive).await
    }
}

/// A GitHub release.
#[derive(Debug, Deserialize)]
pub struct Release {
    /// The tag name of the release.
    pub tag_name: String,
    /// The assets of the release.
    pub assets: Vec<Asset>,
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Release: tag={}, assets={};",
            self.tag_name,
            self.assets.len()
        )
    }
}

/// A release asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    /// The name of the asset.
    pub name: String,
    /// The download URL of the asset.
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// A release asset selected for the current platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WantedRelease {
    /// The URL of the release asset.
    pub url: String,
    /// The name of the release asset.
    pub name: String,
}

impl fmt::Display for WantedRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WantedRelease: asset={}, url={};", self.name, self.url)
    }
}

impl From<Asset> for WantedRelease {
    fn from(asset: Asset) -> Self {
        Self {
            url: asset.download_url,
            name: asset.name,
        }
    }
}

impl WantedRelease {
    /// Downloads the asset to the given destination.
    pub async fn download(&self, destination: impl AsRef<Path> + fmt::Debug) -> Result<()> {
        tracing::debug!("Downloading asset from {} to {:?}", self.url, destination);

        Fetcher::new(&self.url)
            .fetch_asset(destination, None, &mut |_: u64, _: u64| {})
            .await?;

        Ok(())
    }
}
