//! `archiscribe watch` - keep years stocked

use anyhow::Result;
use archiscribe_cache::StockReport;
use archiscribe_core::{SharedProgress, cancel_on_ctrl_c};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Years to watch (comma-separated; default: cache.years, then years on disk)
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<i32>,

    /// Minimum documents per year (overrides cache.min_stock)
    #[arg(long)]
    pub min_stock: Option<usize>,

    /// Exit once every year is stocked
    #[arg(long)]
    pub once: bool,
}

pub async fn run(args: WatchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let service = super::open_service(config, progress).await?;

    let configured = if args.years.is_empty() {
        &config.cache.years
    } else {
        &args.years
    };
    let years = service.watched_years(configured);
    anyhow::ensure!(!years.is_empty(), "No years to watch");

    let mut watcher_config = config.watcher_config();
    if let Some(min_stock) = args.min_stock {
        anyhow::ensure!(min_stock > 0, "--min-stock must be at least 1");
        watcher_config.min_stock = min_stock;
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let handle = service.spawn_watcher(watcher_config, years, cancel.clone()).await;

    let status = progress.stage_line("watch");
    let mut reports = handle.subscribe();
    let mut last_line = String::new();
    loop {
        let line = summary(&reports.borrow_and_update());
        if line != last_line {
            status.set_message(line.clone());
            log::info!("{line}");
            last_line = line;
        }
        if args.once && reports.borrow().all_stocked() {
            break;
        }
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            () = cancel.cancelled() => break,
        }
    }
    status.finish_and_clear();

    let report = handle.report();
    handle.shutdown().await;
    if !report.all_stocked() {
        let missing: Vec<String> = report.understocked().map(|y| y.to_string()).collect();
        log::warn!("Stopped with understocked years: {}", missing.join(", "));
    }
    Ok(())
}

/// One-line stock summary, e.g. `2/3 years stocked; filling 1850 (1/3)`.
fn summary(report: &StockReport) -> String {
    let stocked = report.years.len() - report.understocked().count();
    let mut line = format!("{stocked}/{} years stocked", report.years.len());
    let busy: Vec<String> = report
        .understocked()
        .map(|year| {
            let s = &report.years[&year];
            format!("{year} {} ({}/{})", s.state, s.stock, report.min_stock)
        })
        .collect();
    if !busy.is_empty() {
        line.push_str("; ");
        line.push_str(&busy.join(", "));
    }
    line
}
