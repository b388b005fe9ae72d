//! Single-year cache fill: sample -> classify -> fetch -> persist.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use archiscribe_core::progress::set_fraction;
use archiscribe_core::{FetchError, ProgressContext, SharedProgress};
use indicatif::ProgressBar;
use rustc_hash::FxHashSet;

use crate::error::FillError;
use crate::fetch::{FetchProgress, LineFetch, LineSource, ScriptClassifier};
use crate::index::IdentifierIndex;
use crate::model::OcrLine;
use crate::root::{CacheRoot, cached_identifiers, write_atomic};

/// Limits for one [`FillYear::fill_one`] call.
#[derive(Debug, Clone)]
pub struct FillPolicy {
    /// Consecutive fetch failures tolerated; one more is terminal
    pub max_fetch_failures: u32,
    /// Candidates examined per call, classifier rejections included
    pub max_candidates: u32,
    /// Deadline for a single document fetch
    pub fetch_timeout: Duration,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            max_fetch_failures: 3,
            max_candidates: 200,
            fetch_timeout: Duration::from_secs(300),
        }
    }
}

/// Adds one cached document to a year.
pub trait FillYear: Send + Sync + 'static {
    /// Returns the path of the new `<year>/<identifier>.json`.
    fn fill_one(&self, year: i32) -> impl Future<Output = Result<PathBuf, FillError>> + Send;
}

pub struct Filler<C, L> {
    index: Arc<IdentifierIndex>,
    root: CacheRoot,
    classifier: C,
    source: L,
    policy: FillPolicy,
    progress: SharedProgress,
}

impl<C: ScriptClassifier, L: LineSource> Filler<C, L> {
    pub fn new(
        index: Arc<IdentifierIndex>,
        root: CacheRoot,
        classifier: C,
        source: L,
        policy: FillPolicy,
    ) -> Self {
        Self {
            index,
            root,
            classifier,
            source,
            policy,
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    /// Draw a progress bar per fetch on `progress`.
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn policy(&self) -> &FillPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    async fn run(&self, year: i32) -> Result<PathBuf, FillError> {
        let dir = self.root.year_dir(year);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| FillError::YearDir {
                year,
                path: dir.clone(),
                source,
            })?;

        // Never overwrite what is already in stock
        let mut tried: FxHashSet<String> = cached_identifiers(&dir).await.into_iter().collect();
        let mut failures = 0u32;
        let mut examined = 0u32;

        loop {
            if examined >= self.policy.max_candidates {
                return Err(FillError::TooManyCandidates { year, examined });
            }
            let identifier = self.index.random_excluding(year, &tried)?.identifier.clone();
            examined += 1;
            tried.insert(identifier.clone());

            match self.classifier.is_target_script(&identifier).await {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("{year}/{identifier}: not the target script, resampling");
                    continue;
                }
                Err(e) => {
                    log::warn!("{year}/{identifier}: classification failed: {e}");
                    continue;
                }
            }

            let result = match self.fetch(year, &identifier).await {
                Ok(lines) => persist(&dir, &identifier, &lines).await.map(|p| (p, lines.len())),
                Err(e) => Err(e),
            };
            match result {
                Ok((path, n)) => {
                    log::info!("{year}/{identifier}: cached {n} lines");
                    return Ok(path);
                }
                Err(e) => {
                    failures += 1;
                    log::warn!(
                        "{year}/{identifier}: fetch failed ({failures}/{}): {e}",
                        self.policy.max_fetch_failures + 1
                    );
                    if failures > self.policy.max_fetch_failures {
                        return Err(FillError::RetriesExhausted {
                            year,
                            failures,
                            last: e,
                        });
                    }
                }
            }
        }
    }

    /// Fetch under the deadline while mirroring progress onto a bar.
    async fn fetch(&self, year: i32, identifier: &str) -> Result<Vec<OcrLine>, FetchError> {
        let fetch = self.source.fetch_lines(identifier);
        let bar = self.progress.fetch_bar(&format!("{year}/{identifier}"));
        let timeout = self.policy.fetch_timeout;

        let result = match tokio::time::timeout(timeout, observe(fetch, &bar)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::TimedOut(timeout)),
        };
        bar.finish_and_clear();

        match result {
            Ok(lines) if lines.is_empty() => Err(FetchError::NoLines),
            other => other,
        }
    }
}

impl<C: ScriptClassifier, L: LineSource> FillYear for Filler<C, L> {
    async fn fill_one(&self, year: i32) -> Result<PathBuf, FillError> {
        self.run(year).await
    }
}

/// Follow progress until the outcome resolves.
async fn observe(fetch: LineFetch, bar: &ProgressBar) -> Result<Vec<OcrLine>, FetchError> {
    let mut progress = fetch.subscribe();
    let outcome = fetch.outcome();
    tokio::pin!(outcome);

    loop {
        tokio::select! {
            result = &mut outcome => return result,
            changed = progress.changed() => {
                if changed.is_err() {
                    // Producer done; the outcome is ready or about to be
                    return (&mut outcome).await;
                }
                if let FetchProgress::Running(fraction) = *progress.borrow_and_update() {
                    set_fraction(bar, fraction);
                }
            }
        }
    }
}

async fn persist(dir: &Path, identifier: &str, lines: &[OcrLine]) -> Result<PathBuf, FetchError> {
    let json =
        serde_json::to_vec_pretty(lines).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let path = dir.join(format!("{identifier}.json"));
    write_atomic(&path, &json).await?;
    Ok(path)
}
