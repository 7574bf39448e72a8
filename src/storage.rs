//! Whole-document storage for the JSON files the application keeps.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reads and writes one document as a whole.
pub trait DocumentStore: Send + Sync {
    /// Returns the document, or `None` if it does not exist yet.
    fn read_all(&self) -> io::Result<Option<Vec<u8>>>;

    /// Replaces the document.
    fn write_all(&self, bytes: &[u8]) -> io::Result<()>;

    /// A human-readable location, for logs and messages.
    fn location(&self) -> String;
}

/// A document stored in a file.
///
/// Writes go to a sibling temporary file that is then renamed over the document, so a
/// crash never leaves it half written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    /// A document at `path`. Nothing is read or created until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for JsonFile {
    fn read_all(&self) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        std::fs::write(&staging, bytes)?;
        std::fs::rename(&staging, &self.path).inspect_err(|_| {
            let _ = std::fs::remove_file(&staging);
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// An in-memory document, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    content: Mutex<Option<Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// A document that already holds `bytes`.
    pub fn with_content(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content: Mutex::new(Some(bytes.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every following write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The current content.
    pub fn content(&self) -> Option<Vec<u8>> {
        self.content
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DocumentStore for MemoryDocument {
    fn read_all(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.content())
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("writes are disabled"));
        }

        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    fn read_all(&self) -> io::Result<Option<Vec<u8>>> {
        (**self).read_all()
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn location(&self) -> String {
        (**self).location()
    }
}
