//! "UnityArchive" bundles
//!
//! The signature is recognized so dispatch ordering stays observable, but
//! no readable specimen of this layout exists; committing to the parse
//! reports it as unsupported.

use crate::bundle::header::{BundleSignature, peek_signature};
use crate::error::{FilesError, Result};
use crate::memory::MemoryView;

pub struct ArchiveBundle;

impl ArchiveBundle {
    /// Whether the view starts with the "UnityArchive" signature.
    pub fn probe(view: &MemoryView) -> bool {
        peek_signature(view) == Some(BundleSignature::UnityArchive)
    }

    pub fn read(_view: MemoryView) -> Result<Self> {
        Err(FilesError::unsupported("UnityArchive bundle"))
    }
}
