pub mod fill;
pub mod index;
pub mod status;
pub mod watch;

use archiscribe_archive::{ArchiveCatalog, ArchiveClassifier, ArchiveLineSource};
use archiscribe_cache::{CacheRoot, CacheService, Filler};
use archiscribe_core::SharedProgress;

use crate::config::Config;

pub type ArchiveService = CacheService<ArchiveClassifier, ArchiveLineSource>;

pub fn cache_root(config: &Config) -> anyhow::Result<CacheRoot> {
    Ok(CacheRoot::resolve(config.cache.root.as_deref())?)
}

/// Open the index (building it on first use) and wire the archive adapters.
pub async fn open_service(config: &Config, progress: &SharedProgress) -> anyhow::Result<ArchiveService> {
    let root = cache_root(config)?;
    let catalog = ArchiveCatalog::new(config.archive.clone());
    let service = CacheService::open(root, &catalog, |index, root| {
        Filler::new(
            index,
            root,
            ArchiveClassifier::new(config.archive.clone()),
            ArchiveLineSource::new(config.archive.clone()),
            config.fill_policy(),
        )
        .with_progress(progress.clone())
    })
    .await?;
    Ok(service)
}
