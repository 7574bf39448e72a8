#![doc = include_str!("../README.md")]

pub mod deps;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod model;
pub mod mux;
pub mod provider;
pub mod selection;
pub mod telemetry;
pub mod utils;

pub use error::{Error, MergeStage, ProviderError, Result};
pub use fetcher::{MergeEvent, MergeOrchestrator, MergeState, Transfer};
pub use model::{EncodingCatalog, EncodingDescriptor, EncodingKind, MediaDetails, MediaItem};
pub use mux::{FfmpegMuxer, Muxer};
pub use provider::{CatalogProvider, YtDlpProvider};
pub use selection::{MenuEntry, SelectionMenu, SelectionResult};
pub use telemetry::{Sample, Sampler};
