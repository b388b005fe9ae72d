//! Identifier index: publication year -> candidate documents.
//!
//! Built once from a [`Catalog`] or loaded from `identifiers.json`; read-only
//! afterwards, so it is shared behind an `Arc` and sampled without locks.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::seq::{IteratorRandom, SliceRandom};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, SampleError};
use crate::model::{IdentifierEntry, is_safe_identifier};
use crate::root::write_atomic;

/// Rejection-sampling rounds before falling back to a filtered scan
const REJECTION_ROUNDS: usize = 16;

/// Remote listing of candidate documents.
pub trait Catalog: Send + Sync {
    /// Human-readable query, stored in the snapshot
    fn describe(&self) -> String;

    fn query(&self) -> impl Future<Output = anyhow::Result<Vec<IdentifierEntry>>> + Send;
}

/// On-disk form of the index.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    created_at: DateTime<Utc>,
    query: String,
    years: BTreeMap<i32, Vec<String>>,
}

#[derive(Debug)]
pub struct IdentifierIndex {
    years: FxHashMap<i32, Vec<IdentifierEntry>>,
    created_at: DateTime<Utc>,
    query: String,
}

impl IdentifierIndex {
    /// Partition entries by year, dropping duplicates and identifiers that
    /// are unusable as file names.
    pub fn from_entries(
        entries: impl IntoIterator<Item = IdentifierEntry>,
        query: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let mut years: FxHashMap<i32, Vec<IdentifierEntry>> = FxHashMap::default();
        let mut skipped = 0usize;
        for entry in entries {
            if !is_safe_identifier(&entry.identifier) {
                skipped += 1;
                continue;
            }
            years.entry(entry.year).or_default().push(entry);
        }
        if skipped > 0 {
            log::warn!("Skipped {skipped} identifiers unusable as file names");
        }

        for list in years.values_mut() {
            list.sort_unstable_by(|a, b| a.identifier.cmp(&b.identifier));
            list.dedup_by(|a, b| a.identifier == b.identifier);
        }
        if years.is_empty() {
            return Err(IndexError::Empty);
        }

        Ok(Self {
            years,
            created_at: Utc::now(),
            query: query.into(),
        })
    }

    /// Query the catalog once and persist the result at `path`.
    pub async fn build<C: Catalog>(catalog: &C, path: &Path) -> Result<Self, IndexError> {
        let query = catalog.describe();
        log::info!("Building identifier index: {query}");
        let entries = catalog.query().await.map_err(IndexError::Catalog)?;
        let index = Self::from_entries(entries, query)?;
        index.persist(path).await?;
        log::info!(
            "Indexed {} identifiers over {} years -> {}",
            index.total_len(),
            index.years.len(),
            path.display()
        );
        Ok(index)
    }

    /// Load a snapshot written by [`IdentifierIndex::build`].
    pub async fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|source| IndexError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        // Same filtering as a fresh build; the file may be stale or edited by hand
        let entries = snapshot
            .years
            .into_iter()
            .flat_map(|(year, ids)| ids.into_iter().map(move |id| IdentifierEntry::new(id, year)));
        let mut index = Self::from_entries(entries, snapshot.query)?;
        index.created_at = snapshot.created_at;
        log::info!(
            "Loaded identifier index: {} identifiers, {} years (built {})",
            index.total_len(),
            index.years.len(),
            index.created_at.format("%Y-%m-%d")
        );
        Ok(index)
    }

    /// Load `path` if it exists, otherwise build from `catalog`.
    pub async fn open_or_build<C: Catalog>(path: &Path, catalog: &C) -> Result<Self, IndexError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| IndexError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            Self::load(path).await
        } else {
            Self::build(catalog, path).await
        }
    }

    /// Write the snapshot (tmp + rename).
    pub async fn persist(&self, path: &Path) -> Result<(), IndexError> {
        let json = serde_json::to_vec_pretty(&self.snapshot()).map_err(|source| {
            IndexError::Corrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;
        write_atomic(path, &json)
            .await
            .map_err(|source| IndexError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn snapshot(&self) -> Snapshot {
        let years = self
            .years
            .iter()
            .map(|(year, entries)| {
                let ids = entries.iter().map(|e| e.identifier.clone()).collect();
                (*year, ids)
            })
            .collect();
        Snapshot {
            created_at: self.created_at,
            query: self.query.clone(),
            years,
        }
    }

    fn entries(&self, year: i32) -> Result<&[IdentifierEntry], SampleError> {
        match self.years.get(&year) {
            Some(entries) if !entries.is_empty() => Ok(entries),
            _ => Err(SampleError::NoCandidates { year }),
        }
    }

    /// Uniformly random entry of `year`.
    pub fn random(&self, year: i32) -> Result<&IdentifierEntry, SampleError> {
        let entries = self.entries(year)?;
        entries
            .choose(&mut rand::thread_rng())
            .ok_or(SampleError::NoCandidates { year })
    }

    /// Uniformly random entry of `year` whose identifier is not in `tried`.
    pub fn random_excluding(
        &self,
        year: i32,
        tried: &FxHashSet<String>,
    ) -> Result<&IdentifierEntry, SampleError> {
        let entries = self.entries(year)?;
        let mut rng = rand::thread_rng();

        // Cheap while most of the year is untried
        for _ in 0..REJECTION_ROUNDS {
            if let Some(entry) = entries.choose(&mut rng) {
                if !tried.contains(&entry.identifier) {
                    return Ok(entry);
                }
            }
        }

        entries
            .iter()
            .filter(|e| !tried.contains(&e.identifier))
            .choose(&mut rng)
            .ok_or(SampleError::Exhausted {
                year,
                tried: tried.len(),
            })
    }

    /// Indexed years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.years.keys().copied().collect();
        years.sort_unstable();
        years
    }

    pub fn len(&self, year: i32) -> usize {
        self.years.get(&year).map_or(0, Vec::len)
    }

    pub fn total_len(&self) -> usize {
        self.years.values().map(Vec::len).sum()
    }

    pub fn contains(&self, year: i32, identifier: &str) -> bool {
        self.years
            .get(&year)
            .is_some_and(|entries| entries.iter().any(|e| e.identifier == identifier))
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeCatalog {
        entries: Vec<IdentifierEntry>,
        calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn new(entries: Vec<IdentifierEntry>) -> Self {
            Self {
                entries,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Catalog for FakeCatalog {
        fn describe(&self) -> String {
            "fake".to_string()
        }

        async fn query(&self) -> anyhow::Result<Vec<IdentifierEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.clone())
        }
    }

    struct FailingCatalog;

    impl Catalog for FailingCatalog {
        fn describe(&self) -> String {
            "down".to_string()
        }

        async fn query(&self) -> anyhow::Result<Vec<IdentifierEntry>> {
            anyhow::bail!("connection refused")
        }
    }

    fn sample_entries() -> Vec<IdentifierEntry> {
        let mut entries = Vec::new();
        for i in 0..20 {
            entries.push(IdentifierEntry::new(format!("doc1850_{i}"), 1850));
            entries.push(IdentifierEntry::new(format!("doc1860_{i}"), 1860));
        }
        entries.push(IdentifierEntry::new("solo", 1900));
        entries
    }

    #[test]
    fn random_never_crosses_years() {
        let index = IdentifierIndex::from_entries(sample_entries(), "q").unwrap();
        for year in [1850, 1860, 1900] {
            for _ in 0..200 {
                assert_eq!(index.random(year).unwrap().year, year);
            }
        }
    }

    #[test]
    fn random_concurrent_reads() {
        let index = Arc::new(IdentifierIndex::from_entries(sample_entries(), "q").unwrap());
        let handles: Vec<_> = [1850, 1860, 1850, 1860]
            .into_iter()
            .map(|year| {
                let index = index.clone();
                std::thread::spawn(move || {
                    (0..500).all(|_| index.random(year).is_ok_and(|e| e.year == year))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn random_missing_year() {
        let index = IdentifierIndex::from_entries(sample_entries(), "q").unwrap();
        assert_eq!(
            index.random(1700).unwrap_err(),
            SampleError::NoCandidates { year: 1700 }
        );
    }

    #[test]
    fn from_entries_dedups_and_filters() {
        let entries = vec![
            IdentifierEntry::new("b", 1850),
            IdentifierEntry::new("a", 1850),
            IdentifierEntry::new("b", 1850),
            IdentifierEntry::new("../evil", 1850),
        ];
        let index = IdentifierIndex::from_entries(entries, "q").unwrap();
        assert_eq!(index.len(1850), 2);
        assert!(index.contains(1850, "a"));
        assert!(!index.contains(1850, "../evil"));
    }

    #[test]
    fn from_entries_empty() {
        let err = IdentifierIndex::from_entries(Vec::new(), "q").unwrap_err();
        assert!(matches!(err, IndexError::Empty));
    }

    #[test]
    fn random_excluding_skips_tried_until_exhausted() {
        let entries = (0..5).map(|i| IdentifierEntry::new(format!("d{i}"), 1850));
        let index = IdentifierIndex::from_entries(entries, "q").unwrap();

        let mut tried = FxHashSet::default();
        for _ in 0..5 {
            let entry = index.random_excluding(1850, &tried).unwrap();
            assert!(tried.insert(entry.identifier.clone()));
        }
        assert_eq!(
            index.random_excluding(1850, &tried).unwrap_err(),
            SampleError::Exhausted { year: 1850, tried: 5 }
        );
    }

    #[test]
    fn random_excluding_finds_last_untried() {
        let entries = (0..200).map(|i| IdentifierEntry::new(format!("d{i:03}"), 1850));
        let index = IdentifierIndex::from_entries(entries, "q").unwrap();
        let tried: FxHashSet<String> = (0..200)
            .filter(|i| *i != 137)
            .map(|i| format!("d{i:03}"))
            .collect();
        let entry = index.random_excluding(1850, &tried).unwrap();
        assert_eq!(entry.identifier, "d137");
    }

    #[tokio::test]
    async fn build_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identifiers.json");
        let catalog = FakeCatalog::new(sample_entries());

        let built = IdentifierIndex::build(&catalog, &path).await.unwrap();
        let loaded = IdentifierIndex::load(&path).await.unwrap();

        assert_eq!(built.snapshot(), loaded.snapshot());
        assert_eq!(loaded.years(), vec![1850, 1860, 1900]);
        assert_eq!(loaded.total_len(), 41);
        assert_eq!(loaded.query(), "fake");
    }

    #[tokio::test]
    async fn loaded_index_never_queries_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identifiers.json");
        let catalog = FakeCatalog::new(sample_entries());

        IdentifierIndex::open_or_build(&path, &catalog).await.unwrap();
        assert_eq!(catalog.calls(), 1);

        let index = IdentifierIndex::open_or_build(&path, &catalog).await.unwrap();
        for _ in 0..100 {
            let entry = index.random(1860).unwrap();
            assert!(entry.identifier.starts_with("doc1860_"));
        }
        assert_eq!(catalog.calls(), 1);
    }

    #[tokio::test]
    async fn snapshot_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identifiers.json");
        let entries = vec![
            IdentifierEntry::new("zeta", 1860),
            IdentifierEntry::new("alpha", 1860),
            IdentifierEntry::new("mid", 1850),
        ];
        IdentifierIndex::build(&FakeCatalog::new(entries), &path)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["query"], "fake");
        assert_eq!(json["years"]["1850"], serde_json::json!(["mid"]));
        assert_eq!(json["years"]["1860"], serde_json::json!(["alpha", "zeta"]));
        assert!(json["created_at"].is_string());
    }

    #[tokio::test]
    async fn catalog_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identifiers.json");
        let err = IdentifierIndex::build(&FailingCatalog, &path).await.unwrap_err();
        assert!(matches!(err, IndexError::Catalog(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn corrupt_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identifiers.json");
        std::fs::write(&path, b"{\"years\": [").unwrap();
        let err = IdentifierIndex::load(&path).await.unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn load_drops_identifiers_unusable_as_file_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identifiers.json");
        let snapshot = serde_json::json!({
            "created_at": "1999-01-02T03:04:05Z",
            "query": "edited by hand",
            "years": {
                "1850": ["../escaped", "zeta", "alpha", "zeta", ".hidden"],
                "1860": ["a/b"]
            }
        });
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let index = IdentifierIndex::load(&path).await.unwrap();
        assert_eq!(index.years(), vec![1850]);
        assert_eq!(index.len(1850), 2);
        assert!(!index.contains(1850, "../escaped"));
        assert!(index.contains(1850, "alpha"));
        assert_eq!(index.query(), "edited by hand");
        assert_eq!(index.created_at().to_rfc3339(), "1999-01-02T03:04:05+00:00");
        for _ in 0..50 {
            assert_ne!(index.random(1850).unwrap().identifier, "../escaped");
        }
    }

    #[tokio::test]
    async fn load_with_only_unusable_identifiers_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identifiers.json");
        std::fs::write(
            &path,
            br#"{"created_at": "1999-01-02T03:04:05Z", "query": "q", "years": {"1850": ["../x"]}}"#,
        )
        .unwrap();
        let err = IdentifierIndex::load(&path).await.unwrap_err();
        assert!(matches!(err, IndexError::Empty));
    }
}
