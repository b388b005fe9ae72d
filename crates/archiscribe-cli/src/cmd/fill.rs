//! `archiscribe fill` - add documents to one year without the watcher

use anyhow::Result;
use archiscribe_cache::FillYear;
use archiscribe_core::{SharedProgress, cancel_on_ctrl_c};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct FillArgs {
    /// Publication year to fill
    pub year: i32,

    /// Number of documents to add
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
}

pub async fn run(args: FillArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let service = super::open_service(config, progress).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let status = progress.stage_line("fill");
    for i in 1..=args.count {
        status.set_message(format!("{} ({i}/{})", args.year, args.count));
        let result = tokio::select! {
            result = service.filler().fill_one(args.year) => result,
            () = cancel.cancelled() => {
                status.finish_and_clear();
                anyhow::bail!("Interrupted after {} of {} documents", i - 1, args.count);
            }
        };
        let path = result?;
        progress.println(format!("{}", path.display()));
    }
    status.finish_and_clear();

    let cached = service.cached_files(args.year).await.len();
    log::info!("{}: {cached} documents cached", args.year);
    Ok(())
}
