//! Fetch a static build of 'ffmpeg' for the current platform.

use crate::deps::WantedRelease;
use crate::error::{Error, Result};
use crate::utils::file_system;
use crate::utils::platform::{Architecture, Platform};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the static builds are published.
struct Url;

impl Url {
    fn windows() -> &'static str {
        "https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip"
    }

    fn macos_intel() -> &'static str {
        "https://www.osxexperts.net/ffmpeg71intel.zip"
    }

    fn macos_arm() -> &'static str {
        "https://www.osxexperts.net/ffmpeg71arm.zip"
    }

    fn linux(arch: &str) -> String {
        format!(
            "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-{}-static.tar.xz",
            arch
        )
    }
}

/// Picks, downloads and unpacks an `ffmpeg` build.
///
/// # Example
///
/// ```rust,no_run
/// # use streamkit::deps::ffmpeg::BuildFetcher;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = BuildFetcher::new();
/// let release = fetcher.fetch_binary()?;
///
/// let archive = PathBuf::from("libs").join(&release.name);
/// release.download(&archive).await?;
/// let ffmpeg = fetcher.extract_binary(archive).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct BuildFetcher;

impl fmt::Display for BuildFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildFetcher")
    }
}

impl BuildFetcher {
    /// Create a new fetcher for ffmpeg.
    pub fn new() -> Self {
        Self
    }

    /// Selects the build for the current platform and architecture.
    pub fn fetch_binary(&self) -> Result<WantedRelease> {
        self.fetch_binary_for_platform(Platform::detect(), Architecture::detect())
    }

    /// Selects the build for the given platform and architecture.
    pub fn fetch_binary_for_platform(
        &self,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<WantedRelease> {
        tracing::debug!(
            "Selecting ffmpeg build for platform: {}, architecture: {}",
            platform,
            architecture
        );

        let url = Self::select_url(&platform, &architecture)
            .ok_or_else(|| Error::Binary("ffmpeg".to_string(), platform, architecture))?;
        let name = url
            .rsplit('/')
            .next()
            .unwrap_or("ffmpeg-release")
            .to_string();

        Ok(WantedRelease { url, name })
    }

    fn select_url(platform: &Platform, architecture: &Architecture) -> Option<String> {
        let url = match (platform, architecture) {
            (Platform::Windows, _) => Url::windows().to_string(),
            (Platform::Mac, Architecture::X64) => Url::macos_intel().to_string(),
            (Platform::Mac, Architecture::Aarch64) => Url::macos_arm().to_string(),
            (Platform::Linux, Architecture::X64) => Url::linux("amd64"),
            (Platform::Linux, Architecture::X86) => Url::linux("i686"),
            (Platform::Linux, Architecture::Armv7l) => Url::linux("armhf"),
            (Platform::Linux, Architecture::Aarch64) => Url::linux("arm64"),
            _ => return None,
        };

        Some(url)
    }

    /// Unpacks the archive next to itself, keeps only the `ffmpeg` executable, and removes
    /// the archive and the unpacked tree.
    pub async fn extract_binary(&self, archive: impl AsRef<Path> + fmt::Debug) -> Result<PathBuf> {
        self.extract_binary_for_platform(archive, Platform::detect())
            .await
    }

    /// Same as [`BuildFetcher::extract_binary`], for an explicit platform.
    pub async fn extract_binary_for_platform(
        &self,
        archive: impl AsRef<Path> + fmt::Debug,
        platform: Platform,
    ) -> Result<PathBuf> {
        tracing::debug!("Extracting ffmpeg from {:?}", archive);

        let archive = archive.as_ref().to_path_buf();
        let parent = file_system::try_parent(&archive)?;
        let unpacked = parent.join("ffmpeg-unpacked");

        match &platform {
            Platform::Windows | Platform::Mac => {
                file_system::extract_zip(&archive, &unpacked).await?
            }
            Platform::Linux => file_system::extract_tar_xz(&archive, &unpacked).await?,
            other => {
                return Err(Error::Binary(
                    "ffmpeg".to_string(),
                    other.clone(),
                    Architecture::detect(),
                ));
            }
        }

        let binary_name = format!("ffmpeg{}", platform.executable_suffix());
        let executable = file_system::find_file(&unpacked, &binary_name).ok_or_else(|| {
            Error::Path(format!("{} not found in {:?}", binary_name, archive))
        })?;
        let binary = parent.join(&binary_name);

        tokio::fs::copy(&executable, &binary).await?;
        tokio::fs::remove_dir_all(&unpacked).await?;
        tokio::fs::remove_file(&archive).await?;
        file_system::set_executable(&binary)?;

        Ok(binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_builds_per_platform() {
        let fetcher = BuildFetcher::new();

        let linux = fetcher
            .fetch_binary_for_platform(Platform::Linux, Architecture::Aarch64)
            .unwrap();
        assert_eq!(linux.name, "ffmpeg-release-arm64-static.tar.xz");

        let windows = fetcher
            .fetch_binary_for_platform(Platform::Windows, Architecture::X86)
            .unwrap();
        assert_eq!(windows.name, "ffmpeg-release-essentials.zip");

        let mac = fetcher
            .fetch_binary_for_platform(Platform::Mac, Architecture::Aarch64)
            .unwrap();
        assert!(mac.url.ends_with("ffmpeg71arm.zip"));
    }

    #[test]
    fn unsupported_platforms_are_errors() {
        let error = BuildFetcher::new()
            .fetch_binary_for_platform(Platform::Mac, Architecture::Armv7l)
            .unwrap_err();

        assert_eq!(
            error.to_string(),
            "No ffmpeg binary found for platform MacOS/armv7l"
        );
    }
}
