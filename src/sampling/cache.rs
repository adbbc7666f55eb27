//! Memoization of per-location RBF weights.
//!
//! For a fixed problem the weights depend only on the sampling structure and
//! the sample location, so they are keyed by a structure fingerprint and the
//! exact bit pattern of the coordinates. [`FileCache`] keeps the map in memory
//! and persists it with bincode on [`WeightCache::flush`].

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{Error, Result};

/// FNV-1a over a sequence of words
///
/// Stable across builds, unlike the std hasher, so it can name persisted entries.
pub fn fingerprint(words: impl IntoIterator<Item = u64>) -> u64 {
    words.into_iter().fold(0xcbf2_9ce4_8422_2325, |hash, word| {
        word.to_le_bytes()
            .iter()
            .fold(hash, |h, &byte| (h ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3))
    })
}

/// Sampling structure and exact location of a sample point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    scope: u64,
    x: u64,
    y: u64,
}

impl CacheKey {
    pub fn new(scope: u64, x: f64, y: f64) -> Self {
        // -0.0 and 0.0 name the same location
        let canonical = |v: f64| if v == 0.0 { 0.0_f64 } else { v };
        CacheKey {
            scope,
            x: canonical(x).to_bits(),
            y: canonical(y).to_bits(),
        }
    }

    pub fn scope(&self) -> u64 {
        self.scope
    }

    pub fn location(&self) -> (f64, f64) {
        (f64::from_bits(self.x), f64::from_bits(self.y))
    }
}

/// Key-value store of weight vectors
pub trait WeightCache {
    fn get(&self, key: &CacheKey) -> Option<&[f64]>;

    fn put(&mut self, key: CacheKey, weights: Vec<f64>);

    /// Persist pending writes
    fn flush(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache living for the duration of the process
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<CacheKey, Vec<f64>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WeightCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<&[f64]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    fn put(&mut self, key: CacheKey, weights: Vec<f64>) {
        self.entries.insert(key, weights);
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cache backed by a bincode file
///
/// The file is read once on [`FileCache::open`] and rewritten by `flush`
/// whenever something was added since the last write. A flush writes a
/// sibling `.tmp` file and renames it over the cache, so a failed write
/// leaves the previous file in place and the entries pending.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: HashMap<CacheKey, Vec<f64>>,
    dirty: bool,
}

impl FileCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: HashMap<CacheKey, Vec<f64>> = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            bincode::deserialize_from(reader)?
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened weight cache");
        Ok(FileCache {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Serialize the entries and surface every write error, including the final flush
fn write_entries<W: Write>(sink: W, entries: &HashMap<CacheKey, Vec<f64>>) -> Result<W> {
    let mut writer = BufWriter::new(sink);
    bincode::serialize_into(&mut writer, entries)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|err| Error::Io(err.into_error()))
}

impl WeightCache for FileCache {
    fn get(&self, key: &CacheKey) -> Option<&[f64]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    fn put(&mut self, key: CacheKey, weights: Vec<f64>) {
        self.entries.insert(key, weights);
        self.dirty = true;
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let staging = self.staging_path();
        let file = write_entries(File::create(&staging)?, &self.entries)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&staging, &self.path)?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "flushed weight cache");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
