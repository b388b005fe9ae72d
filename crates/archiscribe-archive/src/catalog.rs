//! Candidate identifiers from the archive.org scrape API.
//!
//! `GET <scrape_url>?q=<query>&fields=identifier,year&count=<n>[&cursor=<c>]`
//! answers `{"items": [{"identifier": "...", "year": "1853"}], "cursor": "..."}`;
//! the last page carries no cursor.

use anyhow::{Context, Result};
use archiscribe_cache::{Catalog, IdentifierEntry};
use archiscribe_core::get_text_with_retry;
use archiscribe_core::progress::fmt_num;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ArchiveConfig;

/// Safety stop against a cursor that never ends
const MAX_PAGES: usize = 1_000;

#[derive(Debug, Deserialize)]
struct ScrapePage {
    #[serde(default)]
    items: Vec<ScrapeItem>,
    cursor: Option<String>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ScrapeItem {
    identifier: String,
    #[serde(default)]
    year: Value,
}

pub struct ArchiveCatalog {
    config: ArchiveConfig,
}

impl ArchiveCatalog {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    fn page_url(&self, cursor: Option<&str>) -> Result<reqwest::Url> {
        let count = self.config.page_size.max(100).to_string();
        let query = self.config.catalog_query();
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", "identifier,year"),
            ("count", count.as_str()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        reqwest::Url::parse_with_params(&self.config.scrape_url, &params)
            .with_context(|| format!("Invalid scrape URL {}", self.config.scrape_url))
    }

    async fn fetch_all(&self) -> Result<Vec<IdentifierEntry>> {
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;

        for page_no in 1..=MAX_PAGES {
            let url = self.page_url(cursor.as_deref())?;
            let body = get_text_with_retry(url.as_str())
                .await
                .with_context(|| format!("Catalog page {page_no} failed"))?;
            let page = parse_page(&body, &self.config)
                .with_context(|| format!("Invalid catalog page {page_no}"))?;

            entries.extend(page.entries);
            match page.total {
                Some(total) => log::info!(
                    "Catalog page {page_no}: {} / {} items",
                    fmt_num(entries.len()),
                    fmt_num(total as usize)
                ),
                None => log::info!("Catalog page {page_no}: {} items", fmt_num(entries.len())),
            }

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(entries),
            }
        }
        anyhow::bail!("Catalog still paging after {MAX_PAGES} pages")
    }
}

impl Catalog for ArchiveCatalog {
    fn describe(&self) -> String {
        self.config.catalog_query()
    }

    async fn query(&self) -> Result<Vec<IdentifierEntry>> {
        self.fetch_all().await
    }
}

struct ParsedPage {
    entries: Vec<IdentifierEntry>,
    cursor: Option<String>,
    total: Option<u64>,
}

/// Decode one scrape page, keeping items with a year inside the range.
fn parse_page(body: &str, config: &ArchiveConfig) -> Result<ParsedPage> {
    let page: ScrapePage = serde_json::from_str(body).context("Invalid scrape JSON")?;
    let range = config.year_from..=config.year_to;

    let mut skipped = 0usize;
    let entries: Vec<IdentifierEntry> = page
        .items
        .into_iter()
        .filter_map(|item| match parse_year(&item.year) {
            Some(year) if range.contains(&year) => Some(IdentifierEntry::new(item.identifier, year)),
            _ => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        log::debug!("Skipped {skipped} items without a usable year");
    }

    Ok(ParsedPage {
        entries,
        cursor: page.cursor.filter(|c| !c.is_empty()),
        total: page.total,
    })
}

/// Years come as numbers, strings ("1853", "1853-1854") or lists of those.
fn parse_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            if digits.len() == 4 { digits.parse().ok() } else { None }
        }
        Value::Array(values) => values.first().and_then(parse_year),
        _ => None,
    }
}
