//! Archiscribe Cache - year-partitioned cache of OCR line records
//!
//! Samples candidate documents from an [`IdentifierIndex`], filters them with
//! a [`ScriptClassifier`], fetches their lines through a [`LineSource`] and
//! keeps `<root>/<year>/<identifier>.json` stocked via the [`watcher`].

pub mod error;
pub mod fetch;
pub mod filler;
pub mod index;
pub mod model;
pub mod root;
pub mod service;
pub mod watcher;

// Re-exports for convenience
pub use error::{FillError, IndexError, RootError, SampleError};
pub use fetch::{FetchProgress, FetchReporter, LineFetch, LineSource, ScriptClassifier};
pub use filler::{FillPolicy, FillYear, Filler};
pub use index::{Catalog, IdentifierIndex};
pub use model::{IdentifierEntry, OcrLine};
pub use root::{CACHE_ENV, CacheRoot};
pub use service::CacheService;
pub use watcher::{
    CacheWatcher, StockReport, WatchCommand, WatcherConfig, WatcherHandle, YearState, YearStatus,
};
