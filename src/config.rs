//! User preferences, stored as `config.json` in the application's config directory.

use crate::error::{AppError, Result};
use crate::storage::{DocumentStore, JsonFile};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The name of the application directories.
pub const APP_NAME: &str = "tubegrab";

/// The `default_quality` value that selects the best download without prompting.
pub const HIGHEST: &str = "highest";

/// The persisted user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where downloads go unless `--output` says otherwise.
    pub default_download_directory: PathBuf,
    /// `highest`, a menu token such as `2` or `A1`, or empty to prompt every time.
    pub default_quality: String,
    /// An `ffmpeg` executable to use instead of searching for one.
    pub custom_ffmpeg_path: Option<PathBuf>,
    /// A `yt-dlp` executable to use instead of searching for one.
    pub custom_ytdlp_path: Option<PathBuf>,
    /// The log level used when `--verbosity` is not given.
    pub log_level: String,
    /// Put playlist downloads in a folder named after the playlist.
    pub auto_create_playlist_folder: bool,
    /// Print title, channel and duration before downloading.
    pub show_video_info_before_download: bool,
    /// Kept for compatibility with existing files; downloads always run one at a time.
    pub max_concurrent_downloads: u32,
}

/// The user's download directory if it exists, otherwise the current directory.
pub fn default_download_directory() -> PathBuf {
    dirs::download_dir()
        .filter(|dir| dir.is_dir())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_download_directory: default_download_directory(),
            default_quality: HIGHEST.to_string(),
            custom_ffmpeg_path: None,
            custom_ytdlp_path: None,
            log_level: "info".to_string(),
            auto_create_playlist_folder: true,
            show_video_info_before_download: true,
            max_concurrent_downloads: 1,
        }
    }
}

impl AppConfig {
    /// The selection token implied by `default_quality`: `Some("")` for highest,
    /// `None` when the user should be prompted.
    pub fn default_token(&self) -> Option<String> {
        let quality = self.default_quality.trim();

        if quality.is_empty() {
            None
        } else if quality.eq_ignore_ascii_case(HIGHEST) {
            Some(String::new())
        } else {
            Some(quality.to_string())
        }
    }
}

/// The directories the application keeps its files in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Holds `config.json` and `download-history.json`.
    pub config_dir: PathBuf,
    /// Holds installed `yt-dlp` and `ffmpeg` executables.
    pub libs_dir: PathBuf,
}

impl AppPaths {
    /// The per-user directories of the current platform.
    pub fn detect() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config("Could not find a valid config directory.".to_string()))?
            .join(APP_NAME);
        let libs_dir = dirs::data_local_dir()
            .ok_or_else(|| AppError::Config("Could not find a valid data directory.".to_string()))?
            .join(APP_NAME)
            .join("libs");

        Ok(Self {
            config_dir,
            libs_dir,
        })
    }

    /// `<config dir>/config.json`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// `<config dir>/download-history.json`.
    pub fn history_file(&self) -> PathBuf {
        self.config_dir.join("download-history.json")
    }

    /// `<config dir>/logs`, holding one log file per day.
    pub fn logs_dir(&self) -> PathBuf {
        self.config_dir.join("logs")
    }
}

/// Loads, holds and saves the [`AppConfig`].
pub struct ConfigStore {
    config: AppConfig,
    store: Box<dyn DocumentStore>,
}

impl ConfigStore {
    /// Opens the configuration in `config.json` under the given paths.
    pub fn open(paths: &AppPaths) -> Self {
        Self::load(JsonFile::new(paths.config_file()))
    }

    /// Loads the configuration from `store`.
    ///
    /// A missing or corrupt document is replaced by the defaults, which are written back;
    /// none of this is fatal.
    pub fn load(store: impl DocumentStore + 'static) -> Self {
        let loaded = match store.read_all() {
            Ok(Some(bytes)) => serde_json::from_slice::<AppConfig>(&bytes)
                .inspect_err(|e| warn!("Configuration file is invalid, using defaults: {}", e))
                .ok(),
            Ok(None) => {
                info!("Configuration file not found, using defaults");
                None
            }
            Err(e) => {
                warn!("Failed to read configuration, using defaults: {}", e);
                None
            }
        };

        let mut this = Self {
            config: loaded.clone().unwrap_or_default(),
            store: Box::new(store),
        };

        match loaded {
            Some(_) => info!("Configuration loaded from: {}", this.path()),
            None => {
                let defaults = this.config.clone();
                if let Err(e) = this.save(defaults) {
                    warn!("Could not write default configuration: {}", e);
                }
            }
        }

        this
    }

    /// The current configuration.
    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// Writes `config` and makes it current.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistFailed`] if it could not be written; the current
    /// configuration is left unchanged.
    pub fn save(&mut self, config: AppConfig) -> Result<()> {
        let persist_failed = |cause: std::io::Error| AppError::PersistFailed {
            location: self.store.location(),
            cause,
        };

        let json = serde_json::to_vec_pretty(&config).map_err(|e| persist_failed(e.into()))?;
        self.store.write_all(&json).map_err(persist_failed)?;

        info!("Configuration saved to: {}", self.path());
        self.config = config;
        Ok(())
    }

    /// Replaces the configuration with the defaults and saves it.
    pub fn reset_to_defaults(&mut self) -> Result<()> {
        self.save(AppConfig::default())?;
        info!("Configuration reset to defaults");
        Ok(())
    }

    /// Where the configuration is stored.
    pub fn path(&self) -> String {
        self.store.location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDocument;
    use std::sync::Arc;

    #[test]
    fn missing_configuration_writes_defaults() {
        let doc = Arc::new(MemoryDocument::new());
        let store = ConfigStore::load(doc.clone());

        assert_eq!(store.get().default_quality, "highest");
        assert!(store.get().auto_create_playlist_folder);
        assert_eq!(store.get().max_concurrent_downloads, 1);

        let written: AppConfig = serde_json::from_slice(&doc.content().unwrap()).unwrap();
        assert_eq!(&written, store.get());
    }

    #[test]
    fn corrupt_configuration_falls_back_to_defaults() {
        let store = ConfigStore::load(MemoryDocument::with_content("{ nope"));

        assert_eq!(store.get().log_level, "info");
    }

    #[test]
    fn partial_documents_keep_defaults_for_missing_fields() {
        let store = ConfigStore::load(MemoryDocument::with_content(
            r#"{"default_quality": "A1", "auto_create_playlist_folder": false}"#,
        ));

        assert_eq!(store.get().default_quality, "A1");
        assert!(!store.get().auto_create_playlist_folder);
        assert!(store.get().show_video_info_before_download);
    }

    #[test]
    fn failed_saves_keep_the_current_configuration() {
        let doc = Arc::new(MemoryDocument::new());
        let mut store = ConfigStore::load(doc.clone());
        doc.set_fail_writes(true);

        let mut changed = store.get().clone();
        changed.default_quality = "3".to_string();

        assert!(store.save(changed).is_err());
        assert_eq!(store.get().default_quality, "highest");
    }

    #[test]
    fn reset_restores_defaults() {
        let mut store = ConfigStore::load(MemoryDocument::new());
        let mut changed = store.get().clone();
        changed.log_level = "debug".to_string();
        store.save(changed).unwrap();

        store.reset_to_defaults().unwrap();
        assert_eq!(store.get().log_level, "info");
    }

    #[test]
    fn default_tokens() {
        let mut config = AppConfig::default();
        assert_eq!(config.default_token(), Some(String::new()));

        config.default_quality = String::new();
        assert_eq!(config.default_token(), None);

        config.default_quality = "a2".to_string();
        assert_eq!(config.default_token(), Some("a2".to_string()));
    }
}
