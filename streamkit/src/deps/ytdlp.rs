//! Fetch the latest 'yt-dlp' release binary from GitHub.

use crate::deps::{Asset, Release, WantedRelease};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::utils::platform::{Architecture, Platform};
use std::fmt;

/// Reads the latest release of a GitHub repository publishing `yt-dlp` builds.
#[derive(Clone, Debug)]
pub struct GitHubFetcher {
    /// The owner of the repository.
    owner: String,
    /// The name of the repository.
    repo: String,
}

impl fmt::Display for GitHubFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitHubFetcher({}/{})", self.owner, self.repo)
    }
}

impl GitHubFetcher {
    /// Creates a fetcher for `github.com/<owner>/<repo>`.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Fetches the latest release and selects the asset for the current platform.
    pub async fn fetch_release(&self) -> Result<WantedRelease> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/releases/latest",
            self.owner, self.repo
        );
        tracing::debug!("Fetching release from {}", url);

        let json = Fetcher::new(&url).fetch_json().await?;
        let release: Release = serde_json::from_value(json)?;
        tracing::debug!("Latest {}", release);

        let platform = Platform::detect();
        let architecture = Architecture::detect();

        Self::select_asset(&release.assets, &platform, &architecture)
            .map(WantedRelease::from)
            .ok_or(Error::Binary("yt-dlp".to_string(), platform, architecture))
    }

    /// The release asset name for a platform and architecture.
    pub fn asset_name(platform: &Platform, architecture: &Architecture) -> Option<&'static str> {
        match (platform, architecture) {
            (Platform::Windows, Architecture::X86) => Some("yt-dlp_x86.exe"),
            (Platform::Windows, _) => Some("yt-dlp.exe"),
            (Platform::Mac, _) => Some("yt-dlp_macos"),
            (Platform::Linux, Architecture::X64) => Some("yt-dlp_linux"),
            (Platform::Linux, Architecture::Aarch64) => Some("yt-dlp_linux_aarch64"),
            (Platform::Linux, Architecture::Armv7l) => Some("yt-dlp_linux_armv7l"),
            _ => None,
        }
    }

    /// Finds the asset matching a platform and architecture.
    pub fn select_asset(
        assets: &[Asset],
        platform: &Platform,
        architecture: &Architecture,
    ) -> Option<Asset> {
        let wanted = Self::asset_name(platform, architecture)?;

        assets.iter().find(|asset| asset.name == wanted).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets() -> Vec<Asset> {
        ["yt-dlp", "yt-dlp.exe", "yt-dlp_linux", "yt-dlp_linux_aarch64", "yt-dlp_macos"]
            .into_iter()
            .map(|name| Asset {
                name: name.to_string(),
                download_url: format!("https://github.com/yt-dlp/yt-dlp/releases/download/2024.10.22/{name}"),
            })
            .collect()
    }

    #[test]
    fn selects_platform_assets() {
        let assets = assets();

        let linux = GitHubFetcher::select_asset(&assets, &Platform::Linux, &Architecture::X64).unwrap();
        assert_eq!(linux.name, "yt-dlp_linux");

        let mac = GitHubFetcher::select_asset(&assets, &Platform::Mac, &Architecture::Aarch64).unwrap();
        assert_eq!(mac.name, "yt-dlp_macos");

        assert_eq!(
            GitHubFetcher::select_asset(&assets, &Platform::Linux, &Architecture::Armv7l),
            None
        );
        assert_eq!(
            GitHubFetcher::select_asset(
                &assets,
                &Platform::Unknown("haiku".to_string()),
                &Architecture::X64
            ),
            None
        );
    }
}
