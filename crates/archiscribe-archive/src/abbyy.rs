//! Streaming parser for ABBYY FineReader XML.
//!
//! Only page boundaries and line boxes are read:
//!
//! ```xml
//! <page width="2000" height="3000" resolution="400">
//!   <block ...><text><par>
//!     <line baseline="310" l="120" t="260" r="1830" b="318">...</line>
//! ```

use archiscribe_core::FetchError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio::io::AsyncBufRead;

/// Pixel box of one text line; `page` is the 0-based page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBox {
    pub page: usize,
    pub l: u32,
    pub t: u32,
    pub r: u32,
    pub b: u32,
}

impl LineBox {
    pub fn width(&self) -> u32 {
        self.r.saturating_sub(self.l)
    }

    pub fn height(&self) -> u32 {
        self.b.saturating_sub(self.t)
    }
}

/// Parse all line boxes in document order.
///
/// `on_page` runs at every page start, which is where callers sample
/// download progress. Degenerate boxes are dropped; a box reaching past its
/// page is clamped to the page size.
pub async fn parse_abbyy<R: AsyncBufRead + Unpin>(
    source: R,
    mut on_page: impl FnMut(usize),
) -> Result<Vec<LineBox>, FetchError> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut lines = Vec::new();
    let mut buf = Vec::new();
    // (index, width, height) of the current page
    let mut page: Option<(usize, Option<u32>, Option<u32>)> = None;
    let mut pages = 0usize;
    let mut dropped = 0usize;

    loop {
        let event = reader
            .read_event_into_async(&mut buf)
            .await
            .map_err(|e| malformed(&reader, e))?;
        match event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"page" => {
                    let index = pages;
                    pages += 1;
                    page = Some((index, attr_u32(&e, b"width")?, attr_u32(&e, b"height")?));
                    on_page(index);
                }
                b"line" => {
                    let Some((index, width, height)) = page else {
                        return Err(FetchError::Malformed("<line> outside of <page>".into()));
                    };
                    match line_box(&e, index, width, height)? {
                        Some(line) => lines.push(line),
                        None => dropped += 1,
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if dropped > 0 {
        log::debug!("Dropped {dropped} degenerate line boxes");
    }
    Ok(lines)
}

fn line_box(
    e: &BytesStart<'_>,
    page: usize,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<Option<LineBox>, FetchError> {
    let coord = |name: &[u8]| -> Result<u32, FetchError> {
        attr_u32(e, name)?.ok_or_else(|| {
            FetchError::Malformed(format!(
                "<line> without {} attribute",
                String::from_utf8_lossy(name)
            ))
        })
    };
    let (l, t, mut r, mut b) = (coord(b"l")?, coord(b"t")?, coord(b"r")?, coord(b"b")?);
    if let Some(w) = width {
        r = r.min(w);
    }
    if let Some(h) = height {
        b = b.min(h);
    }

    if r <= l || b <= t {
        return Ok(None);
    }
    Ok(Some(LineBox { page, l, t, r, b }))
}

fn attr_u32(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<u32>, FetchError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FetchError::Malformed(err.to_string()))?;
        if attr.key.local_name().as_ref() != name {
            continue;
        }
        let value = std::str::from_utf8(&attr.value)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| {
                FetchError::Malformed(format!(
                    "bad {} attribute: {:?}",
                    String::from_utf8_lossy(name),
                    String::from_utf8_lossy(&attr.value)
                ))
            })?;
        return Ok(Some(value));
    }
    Ok(None)
}

fn malformed<R>(reader: &Reader<R>, e: quick_xml::Error) -> FetchError {
    match e {
        // Transport errors surface through the XML reader
        quick_xml::Error::Io(io) => FetchError::from_io(&io),
        other => FetchError::Malformed(format!(
            "XML error at byte {}: {other}",
            reader.buffer_position()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<document xmlns="http://www.abbyy.com/FineReader_xml/FineReader10-schema-v1.xml" version="1.0">
<page width="2000" height="3000" resolution="400" originalCoords="1">
<block blockType="Text" l="100" t="200" r="1900" b="900"><text><par>
<line baseline="310" l="120" t="260" r="1830" b="318"><formatting lang="GermanNewSpelling">Die</formatting></line>
<line baseline="380" l="120" t="330" r="1700" b="388"><formatting>Gartenlaube</formatting></line>
</par></text></block>
</page>
<page width="2000" height="3000" resolution="400">
<block blockType="Picture" l="0" t="0" r="10" b="10"/>
<block blockType="Text"><text><par>
<line baseline="90" l="50" t="40" r="2400" b="100"/>
<line baseline="10" l="60" t="10" r="60" b="30"/>
</par></text></block>
</page>
</document>"#;

    async fn parse(xml: &str) -> Result<(Vec<LineBox>, Vec<usize>), FetchError> {
        let mut pages = Vec::new();
        let lines = parse_abbyy(xml.as_bytes(), |p| pages.push(p)).await?;
        Ok((lines, pages))
    }

    #[tokio::test]
    async fn lines_in_document_order() {
        let (lines, pages) = parse(SAMPLE).await.unwrap();
        assert_eq!(pages, vec![0, 1]);
        assert_eq!(
            lines,
            vec![
                LineBox { page: 0, l: 120, t: 260, r: 1830, b: 318 },
                LineBox { page: 0, l: 120, t: 330, r: 1700, b: 388 },
                // Clamped to the page width; the zero-width box is gone
                LineBox { page: 1, l: 50, t: 40, r: 2000, b: 100 },
            ]
        );
        assert_eq!(lines[0].width(), 1710);
        assert_eq!(lines[0].height(), 58);
    }

    #[tokio::test]
    async fn empty_document() {
        let (lines, pages) = parse("<document><page width=\"1\" height=\"1\"/></document>")
            .await
            .unwrap();
        assert!(lines.is_empty());
        assert_eq!(pages, vec![0]);
    }

    #[tokio::test]
    async fn bad_coordinate_is_malformed() {
        let err = parse(r#"<document><page><line l="x" t="1" r="2" b="3"/></page></document>"#)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(msg) if msg.contains("bad l attribute")));
    }

    #[tokio::test]
    async fn missing_coordinate_is_malformed() {
        let err = parse(r#"<document><page><line l="1" t="1" r="2"/></page></document>"#)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(msg) if msg.contains("without b")));
    }

    #[tokio::test]
    async fn line_outside_page() {
        let err = parse(r#"<document><line l="1" t="1" r="2" b="3"/></document>"#)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn broken_xml() {
        let err = parse("<document><page></document>").await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }
}
