//! Archiscribe Archive - Internet Archive adapters for the line cache
//!
//! - [`ArchiveCatalog`]: candidate identifiers per year from the scrape API
//! - [`ArchiveClassifier`]: Fraktur detection from item metadata
//! - [`ArchiveLineSource`]: line crops from the ABBYY OCR of an item

pub mod abbyy;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod lines;

// Re-exports for convenience
pub use abbyy::{LineBox, parse_abbyy};
pub use catalog::ArchiveCatalog;
pub use classifier::ArchiveClassifier;
pub use config::ArchiveConfig;
pub use lines::{ArchiveLineSource, build_lines};
