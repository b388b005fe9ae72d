//! Cache root resolution and year directory listing

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::RootError;

/// Environment variable overriding the cache root
pub const CACHE_ENV: &str = "ARCHISCRIBE_CACHE";

/// Cache root used when neither the environment nor the config names one
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Identifier index snapshot, directly under the root
pub const INDEX_FILE: &str = "identifiers.json";

/// Validated, absolute cache root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoot {
    path: PathBuf,
}

impl CacheRoot {
    /// Resolve the root: `ARCHISCRIBE_CACHE`, then `configured`, then `./cache`.
    pub fn resolve(configured: Option<&Path>) -> Result<Self, RootError> {
        let from_env = std::env::var_os(CACHE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let path = from_env
            .or_else(|| configured.map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        Self::prepare(path)
    }

    /// Make `path` absolute, create it if missing, reject non-directories.
    pub fn prepare(path: impl Into<PathBuf>) -> Result<Self, RootError> {
        let path = path.into();
        let path = std::path::absolute(&path).map_err(|source| RootError::Io {
            path: path.clone(),
            source,
        })?;

        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(RootError::NotADirectory(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                std::fs::create_dir_all(&path).map_err(|source| RootError::Io {
                    path: path.clone(),
                    source,
                })?;
                log::info!("Created cache directory {}", path.display());
            }
            Err(source) => return Err(RootError::Io { path, source }),
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index_path(&self) -> PathBuf {
        self.path.join(INDEX_FILE)
    }

    pub fn year_dir(&self, year: i32) -> PathBuf {
        self.path.join(year.to_string())
    }

    /// Years that already have a directory under the root, ascending.
    pub fn existing_years(&self) -> io::Result<Vec<i32>> {
        let mut years = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            if let Some(year) = entry.file_name().to_str().and_then(parse_year) {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }
}

fn parse_year(name: &str) -> Option<i32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Cached `*.json` files in a year directory, sorted.
///
/// A missing directory is an empty stock; entries that vanish while
/// listing are skipped.
pub async fn list_cached(dir: &Path) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("Cannot list {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Listing {} stopped early: {e}", dir.display());
                break;
            }
        };
        let path = entry.path();
        if path.extension() != Some(OsStr::new("json")) {
            continue;
        }
        match entry.file_type().await {
            Ok(t) if t.is_file() => files.push(path),
            _ => {}
        }
    }
    files.sort();
    files
}

/// Number of cached documents for a year.
pub async fn count_cached(dir: &Path) -> usize {
    list_cached(dir).await.len()
}

/// Identifiers (file stems) already cached in a year directory.
pub async fn cached_identifiers(dir: &Path) -> Vec<String> {
    list_cached(dir)
        .await
        .iter()
        .filter_map(|p| p.file_stem()?.to_str().map(String::from))
        .collect()
}

/// Write `bytes` to `<path>.tmp`, then rename over `path`.
///
/// Readers see either the previous file or the complete new one.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = match tokio::fs::write(&tmp, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    written
}

/// Remove stale `.tmp` files left behind by an interrupted write.
pub async fn cleanup_tmp_files(dir: &Path) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") && remove_stale(&path).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove one leftover tmp file. A file that is already gone (another
/// process cleaned it up) is not an error; returns whether we removed it.
async fn remove_stale(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::warn!("Removed stale tmp file: {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
