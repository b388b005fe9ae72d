//! Service object wiring root, index and filler together.
//!
//! Constructed once at startup and shared with the watcher and the web
//! layer, instead of process-wide globals.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::error::IndexError;
use crate::fetch::{LineSource, ScriptClassifier};
use crate::filler::Filler;
use crate::index::{Catalog, IdentifierIndex};
use crate::model::{OcrLine, is_safe_identifier};
use crate::root::{CacheRoot, list_cached};
use crate::watcher::{CacheWatcher, WatcherConfig, WatcherHandle};

pub struct CacheService<C, L> {
    root: CacheRoot,
    index: Arc<IdentifierIndex>,
    filler: Arc<Filler<C, L>>,
}

impl<C: ScriptClassifier, L: LineSource> CacheService<C, L> {
    /// Open (or build) the index under `root` and wire the filler.
    pub async fn open<K: Catalog>(
        root: CacheRoot,
        catalog: &K,
        make_filler: impl FnOnce(Arc<IdentifierIndex>, CacheRoot) -> Filler<C, L>,
    ) -> Result<Self, IndexError> {
        let index = Arc::new(IdentifierIndex::open_or_build(&root.index_path(), catalog).await?);
        let filler = Arc::new(make_filler(index.clone(), root.clone()));
        Ok(Self {
            root,
            index,
            filler,
        })
    }

    pub fn root(&self) -> &CacheRoot {
        &self.root
    }

    pub fn index(&self) -> &Arc<IdentifierIndex> {
        &self.index
    }

    pub fn filler(&self) -> &Arc<Filler<C, L>> {
        &self.filler
    }

    /// Years to keep stocked: `configured` if non-empty, else the year
    /// directories already on disk, else every indexed year.
    pub fn watched_years(&self, configured: &[i32]) -> Vec<i32> {
        if !configured.is_empty() {
            let mut years = configured.to_vec();
            years.sort_unstable();
            years.dedup();
            return years;
        }
        match self.root.existing_years() {
            Ok(years) if !years.is_empty() => years,
            Ok(_) => self.index.years(),
            Err(e) => {
                log::warn!("Cannot list {}: {e}", self.root.path().display());
                self.index.years()
            }
        }
    }

    /// Cached documents for `year`, sorted by path.
    pub async fn cached_files(&self, year: i32) -> Vec<PathBuf> {
        list_cached(&self.root.year_dir(year)).await
    }

    /// Read one cached document.
    pub async fn read_cached(&self, year: i32, identifier: &str) -> Result<Vec<OcrLine>> {
        anyhow::ensure!(is_safe_identifier(identifier), "invalid identifier {identifier:?}");
        let path = self.root.year_dir(year).join(format!("{identifier}.json"));
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Start a watcher over `years`.
    pub async fn spawn_watcher(
        &self,
        config: WatcherConfig,
        years: Vec<i32>,
        cancel: CancellationToken,
    ) -> WatcherHandle {
        CacheWatcher::new(self.filler.clone(), self.root.clone(), config)
            .spawn(years, cancel)
            .await
    }
}
