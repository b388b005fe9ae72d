//! Fraktur detection from archive.org item metadata.
//!
//! The OCR pipeline records the detected script per item, e.g.
//! `{"result": {"ocr_detected_script": "Fraktur", ...}}`. Some items list
//! several scripts; any match counts.

use archiscribe_cache::ScriptClassifier;
use archiscribe_core::{FetchError, get_text_with_retry};
use serde_json::Value;

use crate::config::ArchiveConfig;

pub struct ArchiveClassifier {
    config: ArchiveConfig,
}

impl ArchiveClassifier {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }
}

impl ScriptClassifier for ArchiveClassifier {
    async fn is_target_script(&self, identifier: &str) -> Result<bool, FetchError> {
        let body = get_text_with_retry(&self.config.metadata_endpoint(identifier)).await?;
        let matches = script_matches(&body, &self.config.target_script)?;
        log::debug!(
            "{identifier}: {} {}",
            if matches { "is" } else { "is not" },
            self.config.target_script
        );
        Ok(matches)
    }
}

/// Whether the metadata response names `target` as a detected script.
///
/// Unknown items (`{}`) and items without script detection do not match.
fn script_matches(body: &str, target: &str) -> Result<bool, FetchError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("metadata JSON: {e}")))?;
    let matches = |v: &Value| v.as_str().is_some_and(|s| s.trim().eq_ignore_ascii_case(target));

    Ok(match &json["result"]["ocr_detected_script"] {
        Value::Array(scripts) => scripts.iter().any(matches),
        other => matches(other),
    })
}
