//! `archiscribe index` - build the identifier index

use anyhow::Result;
use archiscribe_archive::ArchiveCatalog;
use archiscribe_cache::IdentifierIndex;
use archiscribe_core::progress::fmt_num;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Query the catalog again even if a snapshot exists
    #[arg(long)]
    pub rebuild: bool,

    /// List identifier counts per year
    #[arg(long)]
    pub years: bool,
}

pub async fn run(args: IndexArgs, config: &Config) -> Result<()> {
    let root = super::cache_root(config)?;
    let path = root.index_path();
    let catalog = ArchiveCatalog::new(config.archive.clone());

    let index = if args.rebuild {
        IdentifierIndex::build(&catalog, &path).await?
    } else {
        IdentifierIndex::open_or_build(&path, &catalog).await?
    };

    if args.years {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Year").fg(Color::Cyan),
                Cell::new("Identifiers").fg(Color::Cyan),
            ]);
        for year in index.years() {
            table.add_row(vec![Cell::new(year), Cell::new(fmt_num(index.len(year)))]);
        }
        eprintln!("\n{table}");
    }

    eprintln!(
        "{} identifiers over {} years (built {}, query: {})",
        fmt_num(index.total_len()),
        index.years().len(),
        index.created_at().format("%Y-%m-%d %H:%M UTC"),
        index.query()
    );
    Ok(())
}
