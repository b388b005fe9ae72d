//! Multi-year cache watcher.
//!
//! One coordinator task owns all stock accounting. Every understocked year
//! gets at most one fill task; tasks report back on a shared completion
//! queue, and runtime commands ([`WatchCommand`]) arrive on a second queue.
//! The coordinator reacts to those two queues and the cancellation token;
//! the only timer is a slow tick that checks for years stuck below the
//! minimum past the grace period.
//!
//! ```text
//!  WatcherHandle ──commands──▶ ┌─────────────┐ ──spawn──▶ fill task (1850)
//!                              │ coordinator │ ──spawn──▶ fill task (1860)
//!  fill tasks ──completions──▶ └─────────────┘
//!                                     │
//!                               StockReport (watch)
//! ```

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use archiscribe_core::capped_backoff;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::FillError;
use crate::filler::FillYear;
use crate::root::{CacheRoot, cleanup_tmp_files, count_cached};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Cached documents every watched year should hold
    pub min_stock: usize,
    /// Delay before the first retry after a failed fill
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    /// Understocked longer than this gets a warning, once per spell
    pub grace_period: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            min_stock: 3,
            backoff_base: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            grace_period: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearState {
    /// Below minimum, no task running
    Understocked,
    Filling,
    /// Task running after at least one failed fill (may be in backoff)
    Retrying,
    Stocked,
}

impl std::fmt::Display for YearState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Understocked => "understocked",
            Self::Filling => "filling",
            Self::Retrying => "retrying",
            Self::Stocked => "stocked",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearStatus {
    pub stock: usize,
    pub state: YearState,
    pub consecutive_failures: u32,
    pub understocked_since: Option<Instant>,
}

/// Snapshot of every watched year, republished after each change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockReport {
    pub min_stock: usize,
    pub years: BTreeMap<i32, YearStatus>,
}

impl StockReport {
    pub fn all_stocked(&self) -> bool {
        self.years.values().all(|s| s.state == YearState::Stocked)
    }

    pub fn understocked(&self) -> impl Iterator<Item = i32> + '_ {
        self.years
            .iter()
            .filter(|(_, s)| s.state != YearState::Stocked)
            .map(|(year, _)| *year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
    /// Start managing a year
    Watch(i32),
    /// Stop managing a year, aborting its fill
    Unwatch(i32),
    /// Files of this year were consumed; recount and refill
    Consumed(i32),
    Shutdown,
}

struct FillCompletion {
    year: i32,
    task: u64,
    result: Result<PathBuf, FillError>,
}

struct RunningFill {
    id: u64,
    abort: AbortHandle,
}

#[derive(Default)]
struct YearSlot {
    stock: usize,
    task: Option<RunningFill>,
    failures: u32,
    understocked_since: Option<Instant>,
    grace_warned: bool,
}

impl YearSlot {
    fn status(&self, min_stock: usize) -> YearStatus {
        let state = match &self.task {
            Some(_) if self.failures > 0 => YearState::Retrying,
            Some(_) => YearState::Filling,
            None if self.stock >= min_stock => YearState::Stocked,
            None => YearState::Understocked,
        };
        YearStatus {
            stock: self.stock,
            state,
            consecutive_failures: self.failures,
            understocked_since: self.understocked_since,
        }
    }

    /// How long the year has been understocked, if that exceeds `grace` and
    /// has not been reported yet for the current spell.
    fn overdue(&mut self, grace: Duration) -> Option<Duration> {
        let waited = self.understocked_since?.elapsed();
        if self.grace_warned || waited <= grace {
            return None;
        }
        self.grace_warned = true;
        Some(waited)
    }
}

/// Grace-period check cadence: a quarter of the grace period, within [1s, 60s].
fn grace_check_period(grace: Duration) -> Duration {
    (grace / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

/// Keeps a set of year directories stocked with at least `min_stock` files.
pub struct CacheWatcher<F> {
    filler: Arc<F>,
    root: CacheRoot,
    config: WatcherConfig,
}

impl<F: FillYear> CacheWatcher<F> {
    pub fn new(filler: Arc<F>, root: CacheRoot, config: WatcherConfig) -> Self {
        Self {
            filler,
            root,
            config,
        }
    }

    /// Count the stock of `years`, launch fills where needed and start the
    /// coordinator. The first report is published before this returns.
    pub async fn spawn(
        self,
        years: impl IntoIterator<Item = i32>,
        cancel: CancellationToken,
    ) -> WatcherHandle {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = watch::channel(StockReport::default());

        let mut coordinator = Coordinator {
            filler: self.filler,
            root: self.root,
            config: self.config,
            years: BTreeMap::new(),
            completions: completions_tx,
            next_task: 0,
            report: report_tx,
        };
        for year in years {
            coordinator.add_year(year).await;
        }
        coordinator.publish();
        log::info!(
            "Watching {} years (min stock {})",
            coordinator.years.len(),
            coordinator.config.min_stock
        );

        let task = tokio::spawn(coordinator.run(commands_rx, completions_rx, cancel.clone()));
        WatcherHandle {
            commands: commands_tx,
            report: report_rx,
            cancel,
            task,
        }
    }
}

/// Control and observation handle for a running watcher.
///
/// Dropping the handle stops the coordinator.
pub struct WatcherHandle {
    commands: mpsc::UnboundedSender<WatchCommand>,
    report: watch::Receiver<StockReport>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Send a command; `false` once the coordinator has stopped.
    pub fn send(&self, command: WatchCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn watch(&self, year: i32) -> bool {
        self.send(WatchCommand::Watch(year))
    }

    pub fn unwatch(&self, year: i32) -> bool {
        self.send(WatchCommand::Unwatch(year))
    }

    pub fn consumed(&self, year: i32) -> bool {
        self.send(WatchCommand::Consumed(year))
    }

    /// Latest published report.
    pub fn report(&self) -> StockReport {
        self.report.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StockReport> {
        self.report.clone()
    }

    /// Wait until every watched year is stocked with no fill running.
    ///
    /// Returns `false` if the coordinator stopped first.
    pub async fn wait_until_stocked(&self) -> bool {
        let mut rx = self.report.clone();
        let stocked = rx.wait_for(StockReport::all_stocked).await.is_ok();
        stocked
    }

    /// Wait for the coordinator to end (cancellation or shutdown command).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            log::error!("Watcher coordinator failed: {e}");
        }
    }

    /// Stop the coordinator and abort every running fill.
    pub async fn shutdown(self) {
        let _ = self.commands.send(WatchCommand::Shutdown);
        self.cancel.cancel();
        self.join().await;
    }
}

struct Coordinator<F> {
    filler: Arc<F>,
    root: CacheRoot,
    config: WatcherConfig,
    years: BTreeMap<i32, YearSlot>,
    completions: mpsc::UnboundedSender<FillCompletion>,
    next_task: u64,
    report: watch::Sender<StockReport>,
}

impl<F: FillYear> Coordinator<F> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<WatchCommand>,
        mut completions: mpsc::UnboundedReceiver<FillCompletion>,
        cancel: CancellationToken,
    ) {
        let mut grace_tick = tokio::time::interval(grace_check_period(self.config.grace_period));
        grace_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = grace_tick.tick() => {
                    self.warn_overdue();
                    continue;
                }
                Some(done) = completions.recv() => self.on_completion(done).await,
                command = commands.recv() => match command {
                    Some(WatchCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
            }
            self.publish();
        }

        for slot in self.years.values_mut() {
            if let Some(task) = slot.task.take() {
                task.abort.abort();
            }
        }
        self.publish();
        log::info!("Watcher stopped");
    }

    async fn add_year(&mut self, year: i32) {
        if self.years.contains_key(&year) {
            return;
        }
        let dir = self.root.year_dir(year);
        match cleanup_tmp_files(&dir).await {
            Ok(0) => {}
            Ok(n) => log::info!("{year}: removed {n} stale tmp files"),
            Err(e) => log::warn!("{year}: cannot clean up {}: {e}", dir.display()),
        }
        let stock = count_cached(&dir).await;
        log::debug!("{year}: {stock} cached");

        self.years.insert(
            year,
            YearSlot {
                stock,
                ..YearSlot::default()
            },
        );
        self.touch(year);
        self.launch(year);
    }

    async fn on_command(&mut self, command: WatchCommand) {
        match command {
            WatchCommand::Watch(year) => self.add_year(year).await,
            WatchCommand::Unwatch(year) => {
                if let Some(slot) = self.years.remove(&year) {
                    if let Some(task) = slot.task {
                        task.abort.abort();
                    }
                    log::info!("{year}: no longer watched");
                }
            }
            WatchCommand::Consumed(year) => {
                if !self.years.contains_key(&year) {
                    return;
                }
                let stock = count_cached(&self.root.year_dir(year)).await;
                if let Some(slot) = self.years.get_mut(&year) {
                    slot.stock = stock;
                }
                self.touch(year);
                self.launch(year);
            }
            WatchCommand::Shutdown => {}
        }
    }

    async fn on_completion(&mut self, done: FillCompletion) {
        let FillCompletion { year, task, result } = done;
        let current = self
            .years
            .get(&year)
            .and_then(|slot| slot.task.as_ref())
            .map(|t| t.id);
        if current != Some(task) {
            log::debug!("{year}: ignoring stale completion of task {task}");
            return;
        }

        // Recount: the web layer may have consumed files meanwhile
        let stock = count_cached(&self.root.year_dir(year)).await;
        let min_stock = self.config.min_stock;
        let Some(slot) = self.years.get_mut(&year) else {
            return;
        };
        slot.task = None;
        slot.stock = stock;

        match result {
            Ok(path) => {
                slot.failures = 0;
                log::info!(
                    "{year}: stock {}/{min_stock} ({})",
                    slot.stock,
                    path.display()
                );
            }
            Err(e) => {
                slot.failures += 1;
                log::error!("{year}: fill failed ({} in a row): {e}", slot.failures);
            }
        }
        self.touch(year);
        self.warn_overdue();
        self.launch(year);
    }

    /// Warn about years stuck below the minimum past the grace period,
    /// whether their fills keep failing or are just slow.
    fn warn_overdue(&mut self) {
        let min_stock = self.config.min_stock;
        let grace = self.config.grace_period;
        for (year, slot) in &mut self.years {
            if let Some(waited) = slot.overdue(grace) {
                log::warn!(
                    "{year}: understocked for {}s ({}/{min_stock})",
                    waited.as_secs(),
                    slot.stock
                );
            }
        }
    }

    /// Track when a year went below the minimum.
    fn touch(&mut self, year: i32) {
        let min_stock = self.config.min_stock;
        if let Some(slot) = self.years.get_mut(&year) {
            if slot.stock >= min_stock {
                slot.understocked_since = None;
                slot.grace_warned = false;
            } else if slot.understocked_since.is_none() {
                slot.understocked_since = Some(Instant::now());
            }
        }
    }

    /// Start a fill for `year` unless one is running or it is stocked.
    fn launch(&mut self, year: i32) {
        let Some(slot) = self.years.get_mut(&year) else {
            return;
        };
        if slot.task.is_some() || slot.stock >= self.config.min_stock {
            return;
        }

        let delay = capped_backoff(self.config.backoff_base, slot.failures, self.config.max_backoff);
        self.next_task += 1;
        let id = self.next_task;
        let filler = Arc::clone(&self.filler);
        let completions = self.completions.clone();

        if delay.is_zero() {
            log::debug!("{year}: starting fill task {id}");
        } else {
            log::info!("{year}: retrying in {}s", delay.as_secs());
        }
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = AssertUnwindSafe(filler.fill_one(year))
                .catch_unwind()
                .await
                .unwrap_or(Err(FillError::Panicked { year }));
            let _ = completions.send(FillCompletion {
                year,
                task: id,
                result,
            });
        });
        slot.task = Some(RunningFill {
            id,
            abort: handle.abort_handle(),
        });
    }

    fn publish(&self) {
        let min_stock = self.config.min_stock;
        let years = self
            .years
            .iter()
            .map(|(year, slot)| (*year, slot.status(min_stock)))
            .collect();
        self.report.send_replace(StockReport { min_stock, years });
    }
}
