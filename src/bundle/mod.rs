//! Unity asset bundle containers
//!
//! Three generations of bundle exist: the modern block-compressed "UnityFS"
//! layout, the legacy "UnityRaw"/"UnityWeb" layout, and the "UnityArchive"
//! layout that never shipped in a readable form. All share a common header
//! prefix; everything after it differs per generation.

pub mod archive;
pub mod block_reader;
pub mod blocks;
pub mod filestream;
pub mod header;
pub mod rawweb;

pub use archive::ArchiveBundle;
pub use block_reader::BundleBlockReader;
pub use blocks::{BlocksInfo, FileStreamNode, RawWebNode, StorageBlock};
pub use filestream::{FileStreamBundle, FileStreamBundleWriter};
pub use header::{BundleHeader, BundleSignature};
pub use rawweb::{RawWebBundle, RawWebKind};
