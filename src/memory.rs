//! Zero-copy views over file data
//!
//! All parsing in this crate happens against [`MemoryView`], a cheap cursor
//! over shared immutable bytes. A view can be backed by an owned heap buffer
//! or by a memory-mapped file, and sub-views created with [`MemoryView::slice`]
//! share the backing storage instead of copying it. Extracted bundle entries
//! and serialized object payloads are all sub-views into their parent's data.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{FilesError, Result};

/// A read-only memory mapping of a file on disk.
///
/// Kept alive by `Arc` references from every view carved out of it, so the
/// mapping cannot be unmapped while any slice of it is still reachable.
pub struct FileMapping {
    map: Mmap,
}

impl FileMapping {
    /// Map the file at `path` into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and we never hand out mutable
        // access to it. Truncation of the underlying file by another process
        // is outside this crate's contract.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    fn bytes(&self) -> &[u8] {
        &self.map
    }
}

impl std::fmt::Debug for FileMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMapping").field("len", &self.len()).finish()
    }
}

/// Backing storage for a [`MemoryView`].
#[derive(Debug, Clone)]
enum Backing {
    Heap(Arc<Vec<u8>>),
    Mapped(Arc<FileMapping>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Heap(buf) => buf,
            Backing::Mapped(map) => map.bytes(),
        }
    }

    fn len(&self) -> usize {
        self.bytes().len()
    }
}

/// A cursor over a window of shared bytes.
///
/// The view covers `len` bytes starting at `offset` within its backing
/// storage and carries its own read position, which always stays within
/// `0..=len`. Cloning a view is cheap and yields an independent cursor over
/// the same bytes; probes rely on this to inspect data without disturbing
/// the caller's position.
#[derive(Debug, Clone)]
pub struct MemoryView {
    backing: Backing,
    offset: usize,
    len: usize,
    position: usize,
}

impl MemoryView {
    /// Create a view over a freshly allocated zeroed buffer.
    ///
    /// Used as the destination when reconstructing bundle entries from
    /// compressed blocks. The buffer is writable until the first time the
    /// view (or a slice of it) is cloned.
    pub fn allocate(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    /// Create a view owning the given bytes.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            backing: Backing::Heap(Arc::new(data)),
            offset: 0,
            len,
            position: 0,
        }
    }

    /// Create a view over an entire memory-mapped file.
    pub fn from_mapping(mapping: Arc<FileMapping>) -> Self {
        let len = mapping.len();
        Self {
            backing: Backing::Mapped(mapping),
            offset: 0,
            len,
            position: 0,
        }
    }

    /// Total length of this view in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current read position, relative to the start of this view.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes remaining between the position and the end of the view.
    pub fn remaining(&self) -> usize {
        self.len - self.position
    }

    /// Move the read position. Positions up to and including `len` are valid;
    /// a position equal to `len` means the view is exhausted.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.len {
            return Err(FilesError::out_of_range(position as u64, self.len as u64));
        }
        self.position = position;
        Ok(())
    }

    /// Advance the read position by `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        let new_pos = self
            .position
            .checked_add(count)
            .ok_or_else(|| FilesError::out_of_range(u64::MAX, self.len as u64))?;
        self.set_position(new_pos)
    }

    /// Round the position up to the next multiple of `alignment`.
    ///
    /// The aligned position must still lie within the view.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        debug_assert!(alignment.is_power_of_two());
        let aligned = (self.position + alignment - 1) & !(alignment - 1);
        self.set_position(aligned)
    }

    /// The full contents of the view, ignoring the position.
    pub fn as_slice(&self) -> &[u8] {
        &self.backing.bytes()[self.offset..self.offset + self.len]
    }

    /// Borrow `count` bytes at the current position and advance past them.
    pub fn read_bytes(&mut self, count: usize) -> Result<&[u8]> {
        if count > self.remaining() {
            return Err(FilesError::out_of_range(
                count as u64,
                self.remaining() as u64,
            ));
        }
        let start = self.offset + self.position;
        self.position += count;
        Ok(&self.backing.bytes()[start..start + count])
    }

    /// Borrow a fixed-size array at the current position and advance past it.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Create a sub-view over `[start, start + len)` of this view.
    ///
    /// The sub-view shares backing storage with `self` and starts with its
    /// position at zero. No bytes are copied.
    pub fn slice(&self, start: usize, len: usize) -> Result<MemoryView> {
        let end = start
            .checked_add(len)
            .ok_or_else(|| FilesError::out_of_range(u64::MAX, self.len as u64))?;
        if end > self.len {
            return Err(FilesError::out_of_range(end as u64, self.len as u64));
        }
        Ok(MemoryView {
            backing: self.backing.clone(),
            offset: self.offset + start,
            len,
            position: 0,
        })
    }

    /// Create a sub-view of `len` bytes starting at the current position,
    /// advancing the position past it.
    pub fn sub_view(&mut self, len: usize) -> Result<MemoryView> {
        let view = self.slice(self.position, len)?;
        self.position += len;
        Ok(view)
    }

    /// Create a sub-view from the current position to the end of the view.
    pub fn slice_to_end(&self) -> MemoryView {
        // position <= len always holds, so this cannot fail
        MemoryView {
            backing: self.backing.clone(),
            offset: self.offset + self.position,
            len: self.remaining(),
            position: 0,
        }
    }

    /// A copy of this view with the position reset to zero.
    pub fn clone_clean(&self) -> MemoryView {
        let mut view = self.clone();
        view.position = 0;
        view
    }

    /// Write bytes at the current position and advance past them.
    ///
    /// Only valid on a heap-backed view whose storage is not shared with any
    /// other view. Violating that is a bug in the caller, so this panics
    /// rather than returning an error; out-of-bounds writes still report
    /// [`FilesError::OutOfRange`].
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            return Err(FilesError::out_of_range(
                data.len() as u64,
                self.remaining() as u64,
            ));
        }
        let start = self.offset + self.position;
        let buf = match &mut self.backing {
            Backing::Heap(buf) => {
                Arc::get_mut(buf).unwrap_or_else(|| panic!("write to a shared MemoryView"))
            }
            Backing::Mapped(_) => panic!("write to a memory-mapped MemoryView"),
        };
        buf[start..start + data.len()].copy_from_slice(data);
        self.position += data.len();
        Ok(())
    }

    /// Copy `count` bytes from `src`'s position into this view's position,
    /// advancing both cursors.
    pub fn copy_from(&mut self, src: &mut MemoryView, count: usize) -> Result<()> {
        let bytes = src.read_bytes(count)?.to_vec();
        self.write(&bytes)
    }
}

/// Views compare equal when their contents are byte-for-byte equal,
/// regardless of position or backing storage.
impl PartialEq for MemoryView {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for MemoryView {}
