//! Unity asset container parsing
//!
//! This crate reads the container formats Unity ships game data in:
//! block-compressed bundles ("UnityFS"), the legacy raw and web bundles,
//! web player containers ("UnityWebData1.0"), gzip/brotli wrapped files,
//! and serialized files. Containers yield named entries as zero-copy views;
//! serialized files yield their full metadata and per-object byte ranges.
//! Interpreting the object bytes themselves is out of scope.
//!
//! # Example
//!
//! ```no_run
//! use unity_asset_files::{FileCache, ParsedFile, load_file};
//!
//! # fn main() -> unity_asset_files::Result<()> {
//! let mut cache = FileCache::new();
//! match load_file(&mut cache, "bundle.unity3d")? {
//!     ParsedFile::Bundle(bundle) => {
//!         for entry in bundle.entries() {
//!             println!("{}: {} bytes", entry.name(), entry.len());
//!         }
//!     }
//!     other => println!("parsed {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod compressed;
pub mod compression;
pub mod error;
pub mod memory;
pub mod multifile;
pub mod reader;
pub mod resource;
pub mod scheme;
pub mod serialized;
pub mod webfile;

pub use bundle::{
    ArchiveBundle, BlocksInfo, BundleBlockReader, BundleHeader, BundleSignature,
    FileStreamBundle, FileStreamBundleWriter, FileStreamNode, RawWebBundle, RawWebKind,
    RawWebNode, StorageBlock,
};
pub use compressed::{BrotliFile, GZipFile};
pub use compression::CompressionType;
pub use error::{FilesError, Result};
pub use memory::{FileMapping, MemoryView};
pub use multifile::FileCache;
pub use reader::{ByteOrder, EndianReader};
pub use resource::ResourceFile;
pub use scheme::{ParsedFile, SchemeKind, identify, is_readable, load_file, read_file};
pub use serialized::{
    FileIdentifier, ObjectInfo, SerializedFile, SerializedFileHeader, SerializedFileMetadata,
    SerializedType, TypeTree, TypeTreeNode,
};
pub use webfile::{WebFile, WebFileEntry};
