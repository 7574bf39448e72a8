#![doc = include_str!("../README.md")]

pub mod batch;
pub mod config;
pub mod error;
pub mod history;
pub mod logs;
pub mod session;
pub mod storage;
pub mod target;

pub use batch::{BatchRunner, BatchSummary, read_batch_file};
pub use config::{AppConfig, AppPaths, ConfigStore};
pub use error::{AppError, Result};
pub use history::{DownloadHistoryEntry, HISTORY_CAPACITY, HistoryStore};
pub use session::{DownloadContext, ItemOutcome, PreparedItem, Session, SessionEvent, SessionSink};
pub use storage::{DocumentStore, JsonFile, MemoryDocument};
pub use target::{Target, classify};
