//! Records stored in the index snapshot and in cached year files

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// A candidate document and its publication year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierEntry {
    pub identifier: String,
    pub year: i32,
}

impl IdentifierEntry {
    pub fn new(identifier: impl Into<String>, year: i32) -> Self {
        Self {
            identifier: identifier.into(),
            year,
        }
    }
}

/// One OCR line: its image crop plus neighbouring crops for context.
///
/// `transcription` stays empty until a human annotates the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrLine {
    #[serde(rename = "line")]
    pub image_url: String,
    #[serde(rename = "previous", default, skip_serializing_if = "Option::is_none")]
    pub previous_image_url: Option<String>,
    #[serde(rename = "next", default, skip_serializing_if = "Option::is_none")]
    pub next_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

impl OcrLine {
    pub fn new(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            previous_image_url: None,
            next_image_url: None,
            transcription: None,
        }
    }

    /// Stable name of this line within document `identifier`:
    /// `<identifier>_<first 8 hex chars of SHA-1(image URL)>`.
    ///
    /// Transcriptions already in the corpus are keyed by these names, so the
    /// digest must stay SHA-1.
    pub fn line_id(&self, identifier: &str) -> String {
        let digest = hex::encode(Sha1::digest(self.image_url.as_bytes()));
        format!("{identifier}_{}", &digest[..8])
    }
}

/// Identifiers end up as file names; reject anything that could escape the
/// year directory or collide with temp files.
pub fn is_safe_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.starts_with('.')
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
