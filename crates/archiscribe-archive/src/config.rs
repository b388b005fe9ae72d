//! Internet Archive endpoints and sampling settings

use serde::Deserialize;

use crate::abbyy::LineBox;

/// Settings for the archive.org adapters (`[archive]` in the config file).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Advanced-search query selecting candidate items
    pub query: String,
    /// First publication year indexed (inclusive)
    pub year_from: i32,
    /// Last publication year indexed (inclusive)
    pub year_to: i32,
    /// Results per scrape API page (the API wants at least 100)
    pub page_size: u32,
    /// Script name expected in `ocr_detected_script`
    pub target_script: String,
    /// Lines kept per document; 0 keeps every line
    pub lines_per_document: usize,
    pub scrape_url: String,
    pub metadata_url: String,
    pub download_url: String,
    pub iiif_url: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            query: "mediatype:texts AND language:(ger OR german)".to_string(),
            year_from: 1800,
            year_to: 1900,
            page_size: 10_000,
            target_script: "Fraktur".to_string(),
            lines_per_document: 50,
            scrape_url: "https://archive.org/services/search/v1/scrape".to_string(),
            metadata_url: "https://archive.org/metadata".to_string(),
            download_url: "https://archive.org/download".to_string(),
            iiif_url: "https://iiif.archivelab.org/iiif".to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Full catalog query including the year range.
    pub fn catalog_query(&self) -> String {
        format!("({}) AND year:[{} TO {}]", self.query, self.year_from, self.year_to)
    }

    pub fn metadata_endpoint(&self, identifier: &str) -> String {
        format!("{}/{identifier}/metadata", self.metadata_url.trim_end_matches('/'))
    }

    /// Gzipped ABBYY FineReader XML of an item.
    pub fn abbyy_endpoint(&self, identifier: &str) -> String {
        format!(
            "{}/{identifier}/{identifier}_abbyy.gz",
            self.download_url.trim_end_matches('/')
        )
    }

    /// IIIF crop of one line box.
    pub fn line_image(&self, identifier: &str, line: &LineBox) -> String {
        format!(
            "{}/{identifier}${}/{},{},{},{}/full/0/default.jpg",
            self.iiif_url.trim_end_matches('/'),
            line.page,
            line.l,
            line.t,
            line.width(),
            line.height()
        )
    }
}
