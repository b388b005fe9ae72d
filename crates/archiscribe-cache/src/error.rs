//! Error types for the line cache

use std::io;
use std::path::PathBuf;

use archiscribe_core::FetchError;

/// The cache root cannot be used. Fatal at startup.
#[derive(Debug)]
pub enum RootError {
    NotADirectory(PathBuf),
    Io { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for RootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotADirectory(p) => write!(f, "cache path {} is not a directory", p.display()),
            Self::Io { path, source } => {
                write!(f, "cannot set up cache directory {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for RootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::NotADirectory(_) => None,
        }
    }
}

/// Building or loading the identifier index failed. Fatal at startup.
#[derive(Debug)]
pub enum IndexError {
    /// Catalog query failed
    Catalog(anyhow::Error),
    /// Catalog answered but yielded no usable identifiers
    Empty,
    Io { path: PathBuf, source: io::Error },
    /// Snapshot exists but cannot be decoded
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Catalog(e) => write!(f, "catalog query failed: {e:#}"),
            Self::Empty => write!(f, "catalog returned no identifiers"),
            Self::Io { path, source } => write!(f, "IO on {}: {source}", path.display()),
            Self::Corrupt { path, source } => {
                write!(f, "corrupt index snapshot {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Catalog(e) => Some(&**e),
            Self::Io { source, .. } => Some(source),
            Self::Corrupt { source, .. } => Some(source),
            Self::Empty => None,
        }
    }
}

/// No entry can be drawn for a year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    NoCandidates { year: i32 },
    /// Every entry of the year is in the exclusion set
    Exhausted { year: i32, tried: usize },
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCandidates { year } => write!(f, "no candidates indexed for {year}"),
            Self::Exhausted { year, tried } => {
                write!(f, "all {tried} candidates for {year} already tried")
            }
        }
    }
}

impl std::error::Error for SampleError {}

/// A single-year fill gave up.
#[derive(Debug)]
pub enum FillError {
    NoCandidates { year: i32 },
    Exhausted { year: i32, tried: usize },
    /// Consecutive fetch failures went past the retry budget
    RetriesExhausted {
        year: i32,
        failures: u32,
        last: FetchError,
    },
    /// Too many candidates examined (mostly classifier rejections)
    TooManyCandidates { year: i32, examined: u32 },
    /// Year directory could not be created
    YearDir {
        year: i32,
        path: PathBuf,
        source: io::Error,
    },
    /// The fill task panicked
    Panicked { year: i32 },
}

impl FillError {
    pub fn year(&self) -> i32 {
        match self {
            Self::NoCandidates { year }
            | Self::Exhausted { year, .. }
            | Self::RetriesExhausted { year, .. }
            | Self::TooManyCandidates { year, .. }
            | Self::YearDir { year, .. }
            | Self::Panicked { year } => *year,
        }
    }
}

impl std::fmt::Display for FillError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCandidates { year } => write!(f, "{year}: no candidates in index"),
            Self::Exhausted { year, tried } => {
                write!(f, "{year}: all {tried} candidates tried")
            }
            Self::RetriesExhausted {
                year,
                failures,
                last,
            } => write!(f, "{year}: {failures} consecutive fetch failures, last: {last}"),
            Self::TooManyCandidates { year, examined } => {
                write!(f, "{year}: gave up after examining {examined} candidates")
            }
            Self::YearDir { year, path, source } => {
                write!(f, "{year}: cannot create {}: {source}", path.display())
            }
            Self::Panicked { year } => write!(f, "{year}: fill task panicked"),
        }
    }
}

impl std::error::Error for FillError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::YearDir { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SampleError> for FillError {
    fn from(e: SampleError) -> Self {
        match e {
            SampleError::NoCandidates { year } => Self::NoCandidates { year },
            SampleError::Exhausted { year, tried } => Self::Exhausted { year, tried },
        }
    }
}
