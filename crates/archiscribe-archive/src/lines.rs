//! Line crops of one archive.org item.
//!
//! Pipeline per item:
//!
//! ```text
//! GET <id>_abbyy.gz → byte counter → gunzip → quick-xml → LineBox → OcrLine
//! ```
//!
//! Progress is the share of compressed bytes consumed, sampled at each page
//! start. Neighbour crops come from the full document even when only a
//! sample of its lines is kept.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use archiscribe_cache::model::is_safe_identifier;
use archiscribe_cache::{FetchReporter, LineFetch, LineSource, OcrLine};
use archiscribe_core::{FetchError, open_gzip_stream};
use rand::seq::index;

use crate::abbyy::{LineBox, parse_abbyy};
use crate::config::ArchiveConfig;

pub struct ArchiveLineSource {
    config: Arc<ArchiveConfig>,
}

impl ArchiveLineSource {
    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl LineSource for ArchiveLineSource {
    fn fetch_lines(&self, identifier: &str) -> LineFetch {
        if !is_safe_identifier(identifier) {
            return LineFetch::failed(FetchError::Malformed(format!(
                "unusable identifier {identifier:?}"
            )));
        }
        let config = Arc::clone(&self.config);
        let identifier = identifier.to_string();
        LineFetch::spawn(move |reporter| async move {
            let outcome = fetch_document(&config, &identifier, &reporter).await;
            if let Err(e) = &outcome {
                log::debug!("{identifier}: {e}");
            }
            reporter.complete(outcome);
        })
    }
}

async fn fetch_document(
    config: &ArchiveConfig,
    identifier: &str,
    reporter: &FetchReporter,
) -> Result<Vec<OcrLine>, FetchError> {
    let url = config.abbyy_endpoint(identifier);
    let (reader, counter, total_bytes) = open_gzip_stream(&url).await?;

    let boxes = parse_abbyy(reader, |_page| {
        if let Some(total) = total_bytes.filter(|&t| t > 0) {
            reporter.report(counter.load(Ordering::Relaxed) as f64 / total as f64);
        }
    })
    .await?;
    log::debug!(
        "{identifier}: {} lines, {} compressed bytes",
        boxes.len(),
        counter.load(Ordering::Relaxed)
    );

    build_lines(config, identifier, &boxes)
}

/// Turn parsed line boxes into line records.
///
/// With `lines_per_document > 0` a uniformly random subset of that size is
/// kept, in document order.
pub fn build_lines(
    config: &ArchiveConfig,
    identifier: &str,
    boxes: &[LineBox],
) -> Result<Vec<OcrLine>, FetchError> {
    if boxes.is_empty() {
        return Err(FetchError::NoLines);
    }

    let keep = config.lines_per_document;
    let mut picked: Vec<usize> = if keep == 0 || keep >= boxes.len() {
        (0..boxes.len()).collect()
    } else {
        index::sample(&mut rand::thread_rng(), boxes.len(), keep).into_vec()
    };
    picked.sort_unstable();

    let image = |i: usize| config.line_image(identifier, &boxes[i]);
    Ok(picked
        .into_iter()
        .map(|i| OcrLine {
            image_url: image(i),
            previous_image_url: i.checked_sub(1).map(image),
            next_image_url: (i + 1 < boxes.len()).then(|| image(i + 1)),
            transcription: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use archiscribe_core::gzip_stream;

    fn boxes(n: usize) -> Vec<LineBox> {
        (0..n as u32)
            .map(|i| LineBox {
                page: (i / 10) as usize,
                l: 10,
                t: 100 + i * 50,
                r: 500,
                b: 140 + i * 50,
            })
            .collect()
    }

    fn config(lines_per_document: usize) -> ArchiveConfig {
        ArchiveConfig {
            lines_per_document,
            ..ArchiveConfig::default()
        }
    }

    #[test]
    fn neighbours_in_document_order() {
        let config = config(0);
        let lines = build_lines(&config, "doc", &boxes(3)).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].previous_image_url, None);
        assert_eq!(lines[0].next_image_url.as_deref(), Some(lines[1].image_url.as_str()));
        assert_eq!(lines[1].previous_image_url.as_deref(), Some(lines[0].image_url.as_str()));
        assert_eq!(lines[2].next_image_url, None);
        assert_eq!(
            lines[0].image_url,
            "https://iiif.archivelab.org/iiif/doc$0/10,100,490,40/full/0/default.jpg"
        );
        assert!(lines.iter().all(|l| l.transcription.is_none()));
    }

    #[test]
    fn sample_keeps_order_and_full_neighbours() {
        let config = config(5);
        let all = boxes(40);
        let lines = build_lines(&config, "doc", &all).unwrap();
        assert_eq!(lines.len(), 5);

        let urls: Vec<String> = (0..all.len())
            .map(|i| config.line_image("doc", &all[i]))
            .collect();
        let positions: Vec<usize> = lines
            .iter()
            .map(|l| urls.iter().position(|u| *u == l.image_url).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        for (line, &i) in lines.iter().zip(&positions) {
            let previous = i.checked_sub(1).map(|p| urls[p].clone());
            let next = urls.get(i + 1).cloned();
            assert_eq!(line.previous_image_url, previous);
            assert_eq!(line.next_image_url, next);
        }
    }

    #[test]
    fn short_document_keeps_everything() {
        let lines = build_lines(&config(50), "doc", &boxes(7)).unwrap();
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn empty_document_is_no_lines() {
        assert!(matches!(
            build_lines(&config(50), "doc", &[]),
            Err(FetchError::NoLines)
        ));
    }

    #[tokio::test]
    async fn gzipped_abbyy_to_lines() {
        let xml = r#"<document>
<page width="1000" height="1000"><line l="1" t="2" r="101" b="22"/><line l="1" t="30" r="101" b="50"/></page>
<page width="1000" height="1000"><line l="5" t="5" r="55" b="25"/></page>
</document>"#;
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(xml.as_bytes()).unwrap();
        let bytes = enc.finish().unwrap();

        let (reader, counter) = gzip_stream(&bytes[..]);
        let mut pages = 0;
        let boxes = parse_abbyy(reader, |_| pages += 1).await.unwrap();
        assert_eq!(pages, 2);
        assert_eq!(counter.load(Ordering::Relaxed), bytes.len() as u64);

        let lines = build_lines(&config(0), "item", &boxes).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].image_url.contains("item$1/5,5,50,20/"));
        // Neighbours cross page boundaries
        assert!(lines[1].next_image_url.as_deref().unwrap().contains("item$1/"));
    }

    #[tokio::test]
    async fn unsafe_identifier_fails_immediately() {
        let source = ArchiveLineSource::new(ArchiveConfig::default());
        let err = source.fetch_lines("../etc").outcome().await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    /// Run with: cargo test -p archiscribe-archive -- --ignored live_line_fetch
    #[tokio::test]
    #[ignore]
    async fn live_line_fetch() {
        let source = ArchiveLineSource::new(config(10));
        let fetch = source.fetch_lines("diegartenlaube1853");
        let lines = fetch.outcome().await.unwrap();
        assert!(!lines.is_empty() && lines.len() <= 10);
    }
}
