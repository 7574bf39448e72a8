//! The log of completed downloads, most recent first.
//!
//! Every operation runs under one mutex, and every mutation is written through to the
//! backing document before it returns. A failed write keeps the in-memory change.

use crate::error::{AppError, Result};
use crate::storage::DocumentStore;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// The most entries the log keeps; older ones are dropped first.
pub const HISTORY_CAPACITY: usize = 1000;

/// One completed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadHistoryEntry {
    pub video_id: String,
    pub video_title: String,
    pub channel_name: String,
    pub video_url: String,
    pub file_path: PathBuf,
    /// The quality token as typed, or `highest`.
    pub quality: String,
    pub file_size_bytes: u64,
    pub download_date: DateTime<Utc>,
    pub duration_secs: Option<u64>,
    pub is_playlist: bool,
    pub playlist_title: Option<String>,
}

/// A thread-safe, capacity-bounded, deduplicating log of downloads.
pub struct HistoryStore {
    entries: Mutex<Vec<DownloadHistoryEntry>>,
    store: Box<dyn DocumentStore>,
}

fn decode(bytes: &[u8]) -> serde_json::Result<Vec<DownloadHistoryEntry>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(bytes)
}

impl HistoryStore {
    /// Loads the log from `store`.
    ///
    /// A missing, unreadable or corrupt document yields an empty log and a warning.
    pub fn open(store: impl DocumentStore + 'static) -> Self {
        let entries = match store.read_all() {
            Ok(Some(bytes)) => match decode(&bytes) {
                Ok(mut entries) => {
                    entries.truncate(HISTORY_CAPACITY);
                    info!("Loaded {} download history entries", entries.len());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring corrupt download history at {}: {}", store.location(), e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read download history at {}: {}", store.location(), e);
                Vec::new()
            }
        };

        Self {
            entries: Mutex::new(entries),
            store: Box::new(store),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DownloadHistoryEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &[DownloadHistoryEntry]) -> Result<()> {
        let persist_failed = |cause: std::io::Error| AppError::PersistFailed {
            location: self.store.location(),
            cause,
        };

        let json = serde_json::to_vec_pretty(entries).map_err(|e| persist_failed(e.into()))?;
        self.store.write_all(&json).map_err(persist_failed)
    }

    /// Records a download at the head of the log.
    ///
    /// A non-playlist entry replaces any earlier non-playlist entry for the same id.
    /// Entries past [`HISTORY_CAPACITY`] are dropped from the tail.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PersistFailed`] if the log could not be written; the entry is
    /// recorded in memory regardless.
    pub fn append(&self, entry: DownloadHistoryEntry) -> Result<()> {
        let mut entries = self.lock();

        if !entry.is_playlist {
            entries.retain(|e| e.is_playlist || e.video_id != entry.video_id);
        }

        info!("Added download history entry: {}", entry.video_title);
        entries.insert(0, entry);
        entries.truncate(HISTORY_CAPACITY);

        self.persist(&entries)
    }

    /// Up to `limit` entries (all when `None` or 0), most recent first.
    pub fn list(&self, limit: Option<usize>) -> Vec<DownloadHistoryEntry> {
        let entries = self.lock();
        let limit = limit.filter(|l| *l > 0).unwrap_or(entries.len());

        entries.iter().take(limit).cloned().collect()
    }

    /// The most recent entry for a media id.
    pub fn find_by_media_id(&self, video_id: &str) -> Option<DownloadHistoryEntry> {
        self.lock().iter().find(|e| e.video_id == video_id).cloned()
    }

    /// The entries downloaded between `start` and `end`, both inclusive.
    pub fn list_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DownloadHistoryEntry> {
        self.lock()
            .iter()
            .filter(|e| e.download_date >= start && e.download_date <= end)
            .cloned()
            .collect()
    }

    /// Removes every entry for a media id, playlist or not.
    ///
    /// The log is only written when something was removed.
    ///
    /// # Returns
    ///
    /// The number of removed entries.
    pub fn remove(&self, video_id: &str) -> Result<usize> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.video_id != video_id);

        let removed = before - entries.len();
        if removed > 0 {
            info!("Removed history entries for video ID: {}", video_id);
            self.persist(&entries)?;
        }

        Ok(removed)
    }

    /// Empties the log.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.lock();
        entries.clear();

        info!("Download history cleared");
        self.persist(&entries)
    }

    /// The number of recorded downloads.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Where the log is stored.
    pub fn location(&self) -> String {
        self.store.location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFile, MemoryDocument};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn entry(id: &str, title: &str) -> DownloadHistoryEntry {
        DownloadHistoryEntry {
            video_id: id.to_string(),
            video_title: title.to_string(),
            channel_name: "Channel".to_string(),
            video_url: format!("https://www.youtube.com/watch?v={id}"),
            file_path: PathBuf::from(format!("/downloads/{title}.mp4")),
            quality: "highest".to_string(),
            file_size_bytes: 1024,
            download_date: Utc::now(),
            duration_secs: Some(60),
            is_playlist: false,
            playlist_title: None,
        }
    }

    fn playlist_entry(id: &str, title: &str) -> DownloadHistoryEntry {
        DownloadHistoryEntry {
            is_playlist: true,
            playlist_title: Some("Mix".to_string()),
            ..entry(id, title)
        }
    }

    #[test]
    fn same_id_keeps_only_the_latest() {
        let history = HistoryStore::open(MemoryDocument::new());

        history.append(entry("abc", "first")).unwrap();
        history.append(entry("other", "other")).unwrap();
        history.append(entry("abc", "second")).unwrap();

        let entries = history.list(None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].video_id, "abc");
        assert_eq!(entries[0].video_title, "second");
        assert_eq!(entries.iter().filter(|e| e.video_id == "abc").count(), 1);
    }

    #[test]
    fn playlist_entries_coexist_with_single_entries() {
        let history = HistoryStore::open(MemoryDocument::new());

        history.append(playlist_entry("abc", "from playlist")).unwrap();
        history.append(entry("abc", "single")).unwrap();
        history.append(playlist_entry("abc", "from playlist again")).unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(
            history.find_by_media_id("abc").unwrap().video_title,
            "from playlist again"
        );
    }

    #[test]
    fn capacity_keeps_the_most_recent() {
        let history = HistoryStore::open(MemoryDocument::new());

        for i in 0..1005 {
            history.append(entry(&format!("id{i}"), "t")).unwrap();
        }

        let entries = history.list(None);
        assert_eq!(entries.len(), HISTORY_CAPACITY);
        assert_eq!(entries[0].video_id, "id1004");
        assert_eq!(entries[999].video_id, "id5");
        assert!(history.find_by_media_id("id4").is_none());
    }

    #[test]
    fn persist_failures_keep_the_entry() {
        let doc = Arc::new(MemoryDocument::new());
        let history = HistoryStore::open(doc.clone());

        doc.set_fail_writes(true);
        let error = history.append(entry("abc", "kept")).unwrap_err();

        assert!(matches!(error, AppError::PersistFailed { .. }));
        assert_eq!(history.find_by_media_id("abc").unwrap().video_title, "kept");
        assert_eq!(doc.content(), None);
    }

    #[test]
    fn every_mutation_is_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download-history.json");

        {
            let history = HistoryStore::open(JsonFile::new(&path));
            history.append(entry("a", "a")).unwrap();
            history.append(entry("b", "b")).unwrap();
            history.remove("a").unwrap();
        }

        let reopened = HistoryStore::open(JsonFile::new(&path));
        let ids: Vec<_> = reopened.list(None).into_iter().map(|e| e.video_id).collect();
        assert_eq!(ids, vec!["b"]);

        reopened.clear().unwrap();
        assert!(HistoryStore::open(JsonFile::new(&path)).is_empty());
    }

    #[test]
    fn corrupt_documents_load_as_empty() {
        let history = HistoryStore::open(MemoryDocument::with_content("{not json"));
        assert!(history.is_empty());

        let blank = HistoryStore::open(MemoryDocument::with_content("  \n"));
        assert!(blank.is_empty());
    }

    #[test]
    fn remove_only_writes_when_something_changed() {
        let doc = Arc::new(MemoryDocument::new());
        let history = HistoryStore::open(doc.clone());
        history.append(entry("abc", "t")).unwrap();
        history.append(playlist_entry("abc", "t")).unwrap();

        doc.set_fail_writes(true);
        assert_eq!(history.remove("missing").unwrap(), 0);
        assert!(history.remove("abc").is_err());
        assert!(history.is_empty());
    }

    #[test]
    fn limits_and_date_ranges() {
        let history = HistoryStore::open(MemoryDocument::new());
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        for day in 0..5 {
            let mut e = entry(&format!("d{day}"), "t");
            e.download_date = base + Duration::days(day);
            history.append(e).unwrap();
        }

        assert_eq!(history.list(Some(2)).len(), 2);
        assert_eq!(history.list(Some(0)).len(), 5);
        assert_eq!(history.list(Some(50)).len(), 5);

        let range = history.list_by_date_range(base + Duration::days(1), base + Duration::days(3));
        let ids: Vec<_> = range.into_iter().map(|e| e.video_id).collect();
        assert_eq!(ids, vec!["d3", "d2", "d1"]);
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let history = Arc::new(HistoryStore::open(MemoryDocument::new()));

        let handles: Vec<_> = (0..8)
            .map(|thread| {
                let history = history.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        history.append(entry(&format!("t{thread}-{i}"), "t")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(history.len(), 200);
    }

    #[test]
    fn serializes_with_stable_field_names() {
        let json = serde_json::to_value(entry("abc", "t")).unwrap();

        for field in [
            "video_id",
            "video_title",
            "channel_name",
            "video_url",
            "file_path",
            "quality",
            "file_size_bytes",
            "download_date",
            "duration_secs",
            "is_playlist",
            "playlist_title",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }
}
