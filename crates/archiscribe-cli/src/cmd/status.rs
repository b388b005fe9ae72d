//! `archiscribe status` and `archiscribe config`

use anyhow::Result;
use archiscribe_cache::IdentifierIndex;
use archiscribe_cache::root::count_cached;
use archiscribe_core::progress::fmt_num;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show these years (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<i32>,
}

/// Stock per year from disk and the index snapshot; never touches the network.
pub async fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let root = super::cache_root(config)?;
    let index_path = root.index_path();
    let index = if index_path.exists() {
        Some(IdentifierIndex::load(&index_path).await?)
    } else {
        eprintln!("No identifier index yet (run `archiscribe index`)");
        None
    };

    let mut years = if !args.years.is_empty() {
        args.years
    } else if !config.cache.years.is_empty() {
        config.cache.years.clone()
    } else {
        root.existing_years()?
    };
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        eprintln!("No cached years under {}", root.path().display());
        return Ok(());
    }

    let min_stock = config.cache.min_stock;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Year").fg(Color::Cyan),
            Cell::new("Indexed").fg(Color::Cyan),
            Cell::new("Cached").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);

    let mut understocked = 0;
    for year in &years {
        let cached = count_cached(&root.year_dir(*year)).await;
        let indexed = index
            .as_ref()
            .map_or_else(|| "-".to_string(), |i| fmt_num(i.len(*year)));
        let status_cell = if cached >= min_stock {
            Cell::new("stocked").fg(Color::Green)
        } else {
            understocked += 1;
            Cell::new(format!("{cached}/{min_stock}")).fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(year),
            Cell::new(indexed),
            Cell::new(cached),
            status_cell,
        ]);
    }

    eprintln!("\n{table}");
    eprintln!(
        "{} years, {understocked} below minimum stock of {min_stock} ({})",
        years.len(),
        root.path().display()
    );
    Ok(())
}

pub fn print_config(config: &Config) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let root = match super::cache_root(config) {
        Ok(root) => root.path().display().to_string(),
        Err(e) => format!("unusable: {e}"),
    };
    let years = if config.cache.years.is_empty() {
        "auto".to_string()
    } else {
        let years: Vec<String> = config.cache.years.iter().map(i32::to_string).collect();
        years.join(", ")
    };

    table.add_row(vec!["Cache root", &root]);
    table.add_row(vec!["Watched years", &years]);
    table.add_row(vec!["Minimum stock", &config.cache.min_stock.to_string()]);
    table.add_row(vec![
        "Grace period",
        &format!("{}s", config.cache.grace_period_secs),
    ]);
    table.add_row(vec![
        "Fetch failures per fill",
        &config.fill.max_fetch_failures.to_string(),
    ]);
    table.add_row(vec![
        "Candidates per fill",
        &config.fill.max_candidates.to_string(),
    ]);
    table.add_row(vec![
        "Fetch timeout",
        &format!("{}s", config.fill.fetch_timeout_secs),
    ]);
    table.add_row(vec![
        "Backoff",
        &format!(
            "{}s doubling, max {}s",
            config.fill.backoff_base_secs, config.fill.max_backoff_secs
        ),
    ]);
    table.add_row(vec!["Catalog query", &config.archive.catalog_query()]);
    table.add_row(vec!["Target script", &config.archive.target_script]);
    table.add_row(vec![
        "Lines per document",
        &match config.archive.lines_per_document {
            0 => "all".to_string(),
            n => n.to_string(),
        },
    ]);
    table.add_row(vec![
        "Connect timeout",
        &format!("{}s", config.http.connect_timeout_secs),
    ]);
    table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);

    eprintln!("\n{table}");
}
