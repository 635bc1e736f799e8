//! Age-based pruning of the on-disk weather data cache.
//!
//! Each data granularity keeps its cached files in its own subdirectory of
//! the cache directory. Files older than the retention window are deleted.
//! A failure in one granularity is recorded and the remaining ones are still
//! processed.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Cache directory used when `METEOSTAT_CACHE_DIR` is not set.
pub const DEFAULT_CACHE_DIR: &str = "/app/.meteostat/cache";

/// Artifacts older than this are removed (30 days).
pub const RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Weather data aggregation period, each with its own cache subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Hourly,
    Daily,
    Monthly,
    Normals,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [Self::Hourly, Self::Daily, Self::Monthly, Self::Normals];

    /// Subdirectory of the cache directory holding this granularity's files.
    pub fn subdir(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Normals => "normals",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subdir())
    }
}

/// Cache pruning failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Listing, inspecting or deleting a file failed.
    #[error("failed to clear {path}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-granularity cache of downloaded data.
pub trait CacheStore {
    /// Point the store at a cache directory.
    fn set_cache_dir(&mut self, dir: &Path);

    /// Remove artifacts older than `max_age`, returning the removed paths.
    fn clear_cache(&self, max_age: Duration) -> Result<Vec<PathBuf>, CacheError>;
}

/// File-system cache store for one granularity.
#[derive(Debug, Clone)]
pub struct FileCache {
    granularity: Granularity,
    cache_dir: PathBuf,
    dry_run: bool,
}

impl FileCache {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            dry_run: false,
        }
    }

    /// Report what would be removed without deleting anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Directory holding this granularity's artifacts.
    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(self.granularity.subdir())
    }
}

impl CacheStore for FileCache {
    fn set_cache_dir(&mut self, dir: &Path) {
        self.cache_dir = dir.to_path_buf();
    }

    fn clear_cache(&self, max_age: Duration) -> Result<Vec<PathBuf>, CacheError> {
        let dir = self.path();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let clear_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| CacheError::Clear { path, source }
        };

        let now = SystemTime::now();
        let mut removed = Vec::new();

        for entry in fs::read_dir(&dir).map_err(clear_err(&dir))? {
            let entry = entry.map_err(clear_err(&dir))?;
            let path = entry.path();
            let metadata = entry.metadata().map_err(clear_err(&path))?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().map_err(clear_err(&path))?;
            // Future mtimes are never stale.
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }

            if !self.dry_run {
                fs::remove_file(&path).map_err(clear_err(&path))?;
            }
            removed.push(path);
        }

        Ok(removed)
    }
}

/// Outcome of a purge run.
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// Removed (or, in dry-run mode, removable) artifacts per granularity.
    pub removed: Vec<(Granularity, Vec<PathBuf>)>,
    /// Granularities whose purge failed.
    pub failures: Vec<(Granularity, CacheError)>,
}

impl PurgeReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.iter().map(|(_, paths)| paths.len()).sum()
    }
}

/// Prunes every granularity's cache under one directory.
#[derive(Debug, Clone)]
pub struct CacheJanitor {
    cache_dir: PathBuf,
    dry_run: bool,
}

impl CacheJanitor {
    /// Janitor for `cache_dir`, creating the directory if absent.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|source| CacheError::CreateDir {
            path: cache_dir.clone(),
            source,
        })?;
        Ok(Self {
            cache_dir,
            dry_run: false,
        })
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Purge the file-system caches of `granularities`.
    pub fn purge(&self, granularities: &[Granularity], max_age: Duration) -> PurgeReport {
        let dry_run = self.dry_run;
        self.purge_with(granularities, max_age, |g| FileCache::new(g).dry_run(dry_run))
    }

    /// Purge using stores produced by `store_for`.
    pub fn purge_with<S, F>(
        &self,
        granularities: &[Granularity],
        max_age: Duration,
        mut store_for: F,
    ) -> PurgeReport
    where
        S: CacheStore,
        F: FnMut(Granularity) -> S,
    {
        let mut report = PurgeReport::default();

        for &granularity in granularities {
            let mut store = store_for(granularity);
            store.set_cache_dir(&self.cache_dir);

            match store.clear_cache(max_age) {
                Ok(paths) => {
                    tracing::info!(
                        granularity = %granularity,
                        removed = paths.len(),
                        dry_run = self.dry_run,
                        "cache cleared"
                    );
                    report.removed.push((granularity, paths));
                }
                Err(e) => {
                    tracing::warn!(granularity = %granularity, error = %e, "cache clear failed");
                    report.failures.push((granularity, e));
                }
            }
        }

        report
    }
}
