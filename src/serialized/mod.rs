//! Serialized files
//!
//! Serialized files hold binary object payloads plus a metadata section
//! describing their types and locations. They carry extensions like
//! `.assets` or `.sharedAssets`, or none at all; detection is structural
//! since there is no signature.

pub mod header;
pub mod metadata;
pub mod typetree;

use std::collections::HashMap;

pub use header::SerializedFileHeader;
pub use metadata::{
    FileIdentifier, ObjectInfo, ScriptIdentifier, SerializedFileMetadata, SerializedType,
};
pub use typetree::{TypeTree, TypeTreeNode};

use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::reader::{ByteOrder, EndianReader};

/// A parsed serialized file.
///
/// Object payloads stay in the original view; [`SerializedFile::object_data`]
/// hands out sub-views without copying.
#[derive(Debug)]
pub struct SerializedFile {
    pub header: SerializedFileHeader,
    pub metadata: SerializedFileMetadata,
    lookup: HashMap<i64, usize>,
    data: MemoryView,
}

impl SerializedFile {
    /// Whether the view plausibly holds a serialized file.
    pub fn probe(view: &MemoryView) -> bool {
        header::is_serialized_file(view)
    }

    /// Parse the header and metadata and index the object table.
    pub fn read(view: MemoryView) -> Result<Self> {
        let mut view = view.clone_clean();
        let header = {
            let mut reader = EndianReader::new(&mut view, ByteOrder::Big);
            SerializedFileHeader::read(&mut reader)?
        };
        if header.metadata_at_end() {
            let metadata_start = header
                .file_size
                .checked_sub(header.metadata_size)
                .ok_or_else(|| {
                    FilesError::out_of_range(header.metadata_size, header.file_size)
                })?;
            view.set_position(metadata_start as usize)?;
        }
        let metadata = {
            let mut reader = EndianReader::new(&mut view, ByteOrder::Big);
            SerializedFileMetadata::read(&mut reader, &header)?
        };

        tracing::debug!(
            version = header.version,
            unity_version = %metadata.unity_version,
            objects = metadata.objects.len(),
            "read serialized file"
        );

        let mut lookup = HashMap::with_capacity(metadata.objects.len());
        for (index, object) in metadata.objects.iter().enumerate() {
            let start = header.data_offset + object.byte_start;
            let end = start + object.byte_size as u64;
            if end > header.file_size {
                return Err(FilesError::out_of_range(end, header.file_size));
            }
            if lookup.insert(object.file_id, index).is_some() {
                return Err(FilesError::invalid_data(format!(
                    "duplicate object id {}",
                    object.file_id
                )));
            }
        }

        Ok(Self {
            header,
            metadata,
            lookup,
            data: view.clone_clean(),
        })
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn unity_version(&self) -> &str {
        &self.metadata.unity_version
    }

    pub fn target_platform(&self) -> i32 {
        self.metadata.target_platform
    }

    /// Endianness of the metadata and object payloads.
    pub fn endianness(&self) -> ByteOrder {
        self.metadata.endianness
    }

    /// The object table, in file order.
    pub fn objects(&self) -> &[ObjectInfo] {
        &self.metadata.objects
    }

    /// Files this one depends on, in reference order.
    pub fn dependencies(&self) -> &[FileIdentifier] {
        &self.metadata.externals
    }

    /// Look up an object by its file-local identifier.
    pub fn object(&self, file_id: i64) -> Result<&ObjectInfo> {
        self.lookup
            .get(&file_id)
            .map(|&index| &self.metadata.objects[index])
            .ok_or_else(|| FilesError::not_found(format!("object {file_id}")))
    }

    /// Absolute byte range of an object's payload within the file.
    pub fn object_range(&self, file_id: i64) -> Result<(u64, u64)> {
        let object = self.object(file_id)?;
        Ok((
            self.header.data_offset + object.byte_start,
            object.byte_size as u64,
        ))
    }

    /// The object's payload as a sub-view; no bytes are copied.
    pub fn object_data(&self, file_id: i64) -> Result<MemoryView> {
        let (start, size) = self.object_range(file_id)?;
        self.data.slice(start as usize, size as usize)
    }
}
