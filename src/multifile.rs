//! Split file reassembly and file mapping cache
//!
//! Unity can emit large files as numbered parts (`data.split0`, `data.split1`,
//! ...). Opening either the logical base path or any part path reassembles
//! the whole sequence. Single files are memory-mapped and cached by path so
//! that repeated opens of the same file share one mapping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::{FilesError, Result};
use crate::memory::{FileMapping, MemoryView};

static SPLIT_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.split(\d+)$").unwrap_or_else(|e| panic!("{e}")));

/// Whether `path` names one part of a split file set.
pub fn is_split_part<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .to_str()
        .is_some_and(|s| SPLIT_PART.is_match(s))
}

/// Strip a `.splitN` suffix, yielding the logical base path.
pub fn split_base<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let s = path.as_ref().to_str()?;
    let m = SPLIT_PART.find(s)?;
    Some(PathBuf::from(&s[..m.start()]))
}

/// Cache of open file mappings, keyed by path.
///
/// Entries live until explicitly closed or cleared; there is no eviction.
/// Closing a path drops the cache's reference, but views already handed out
/// keep their mapping alive through their own `Arc`.
#[derive(Debug, Default)]
pub struct FileCache {
    mappings: HashMap<PathBuf, Arc<FileMapping>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` as a view over its contents.
    ///
    /// A `.splitN` part path, or a base path whose `.split0` part exists on
    /// disk, is reassembled from all of its parts into one owned buffer.
    /// Anything else is memory-mapped through the cache.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<MemoryView> {
        let path = path.as_ref();
        if let Some(base) = split_base(path) {
            return read_split_set(&base);
        }
        if path_with_split_index(path, 0).exists() {
            return read_split_set(path);
        }
        Ok(MemoryView::from_mapping(self.mapping(path)?))
    }

    /// Open `path` as a single file, ignoring split conventions.
    pub fn open_single<P: AsRef<Path>>(&mut self, path: P) -> Result<MemoryView> {
        Ok(MemoryView::from_mapping(self.mapping(path.as_ref())?))
    }

    fn mapping(&mut self, path: &Path) -> Result<Arc<FileMapping>> {
        if let Some(mapping) = self.mappings.get(path) {
            return Ok(mapping.clone());
        }
        let mapping = Arc::new(FileMapping::open(path)?);
        self.mappings.insert(path.to_path_buf(), mapping.clone());
        Ok(mapping)
    }

    /// Drop the cached mapping for `path`, if any.
    pub fn close<P: AsRef<Path>>(&mut self, path: P) {
        self.mappings.remove(path.as_ref());
    }

    /// Drop all cached mappings.
    pub fn clear(&mut self) {
        self.mappings.clear();
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

fn path_with_split_index(base: &Path, index: usize) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".split{index}"));
    PathBuf::from(name)
}

/// Concatenate every part of a split set into one owned buffer.
///
/// Part indices must form a contiguous run starting at zero; a part numbered
/// past a gap means the set is incomplete.
fn read_split_set(base: &Path) -> Result<MemoryView> {
    let parent = base.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = parent.unwrap_or_else(|| Path::new("."));
    let Some(prefix) = base.file_name().and_then(|n| n.to_str()) else {
        return Err(FilesError::not_found(format!(
            "split file base {}",
            base.display()
        )));
    };

    let mut indices = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        if let Some(caps) = SPLIT_PART.captures(rest) {
            // the suffix must be the entire remainder of the name
            if caps.get(0).is_some_and(|m| m.start() == 0) {
                if let Ok(index) = caps[1].parse::<usize>() {
                    indices.push(index);
                }
            }
        }
    }
    if indices.is_empty() {
        return Err(FilesError::not_found(format!(
            "split parts for {}",
            base.display()
        )));
    }

    indices.sort_unstable();
    indices.dedup();
    for (expected, &actual) in indices.iter().enumerate() {
        if expected != actual {
            return Err(FilesError::invalid_data(format!(
                "split set {} is missing part {expected}",
                base.display()
            )));
        }
    }

    tracing::debug!(base = %base.display(), parts = indices.len(), "reassembling split file");

    let mut data = Vec::new();
    for &index in &indices {
        let part = path_with_split_index(base, index);
        data.extend_from_slice(&std::fs::read(part)?);
    }
    Ok(MemoryView::from_vec(data))
}
