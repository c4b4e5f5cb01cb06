//! Shared read-only file mappings with reference counting
//!
//! Every server pipeline reads the same input files; instead of each pipeline
//! opening its own copy, the first acquire maps the file once and later
//! acquires share the view. The cache tracks how many readers still intend to
//! use each mapping and removes the entry when the last one releases it, so a
//! file is unmapped exactly once and never twice.

use crate::error::Result;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

struct CacheEntry {
    data: Arc<Mmap>,
    /// Readers that have not released yet. Seeded with the full expected
    /// readership on first map so an acquire/release/acquire interleaving
    /// cannot drop the count to zero early.
    remaining: usize,
}

/// A shared read-only view of one input file
pub struct MappedFile {
    data: Arc<Mmap>,
    path: PathBuf,
}

impl MappedFile {
    /// The mapped bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Path this mapping was created from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Path-keyed arena of refcounted mappings
#[derive(Default)]
pub struct MmapCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl MmapCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `path` on first request and return a shared handle.
    ///
    /// `expected_readers` is the total number of acquire calls this path will
    /// receive (one per server pipeline); the remaining-reader count is seeded
    /// with it once, on first map. Open or mmap failure is fatal to the run.
    pub fn acquire(&self, path: &Path, expected_readers: usize) -> Result<MappedFile> {
        let mut entries = self.entries.lock().expect("mmap cache poisoned");
        if let Some(entry) = entries.get(path) {
            return Ok(MappedFile {
                data: Arc::clone(&entry.data),
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        // SAFETY: Mmap::map is unsafe because the underlying file could be
        // modified externally while mapped. Input files are treated as
        // read-only for the duration of the run, the mapping itself is
        // read-only, and all access goes through range-checked slices.
        let mmap = unsafe { Mmap::map(&file)? };
        let data = Arc::new(mmap);
        entries.insert(
            path.to_path_buf(),
            CacheEntry {
                data: Arc::clone(&data),
                remaining: expected_readers.max(1),
            },
        );
        Ok(MappedFile {
            data,
            path: path.to_path_buf(),
        })
    }

    /// Release one reader's claim on a mapping.
    ///
    /// Returns true exactly when this was the last outstanding reader; the
    /// entry is removed and the file is unmapped once the final handle drops.
    pub fn release(&self, handle: MappedFile) -> bool {
        let mut entries = self.entries.lock().expect("mmap cache poisoned");
        let Some(entry) = entries.get_mut(handle.path()) else {
            return false;
        };
        entry.remaining -= 1;
        if entry.remaining == 0 {
            entries.remove(handle.path());
            return true;
        }
        false
    }
}
