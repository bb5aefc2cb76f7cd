//! Block-compressed "UnityFS" bundles

use byteorder::{BigEndian, WriteBytesExt};

use crate::bundle::block_reader::BundleBlockReader;
use crate::bundle::blocks::{BlocksInfo, FileStreamNode, StorageBlock};
use crate::bundle::header::{
    BundleHeader, BundleSignature, VERSION_LARGE_FILES_SUPPORT, peek_signature,
};
use crate::compression::{self, CompressionType};
use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::reader::{ByteOrder, EndianReader};
use crate::resource::ResourceFile;

/// Bundle flag bits, shared by the header and per-block flags.
pub mod bundle_flags {
    /// Low bits select the compression codec
    pub const COMPRESSION_MASK: u32 = 0x3F;
    /// Directory listing is stored together with the blocks info
    pub const BLOCKS_AND_DIRECTORY_COMBINED: u32 = 0x40;
    /// Blocks info lives at the end of the file instead of after the header
    pub const BLOCKS_INFO_AT_END: u32 = 0x80;
    /// Bundle was produced for the old web plugin
    pub const OLD_WEB_PLUGIN_COMPATIBILITY: u32 = 0x100;
    /// Payload is 16-byte aligned after the blocks info
    pub const BLOCK_INFO_NEEDS_PADDING_AT_START: u32 = 0x200;
}

/// A parsed block-compressed bundle.
#[derive(Debug)]
pub struct FileStreamBundle {
    pub header: BundleHeader,
    /// Declared size of the whole bundle file
    pub size: i64,
    pub compressed_blocks_info_size: u32,
    pub uncompressed_blocks_info_size: u32,
    pub flags: u32,
    pub blocks_info: BlocksInfo,
    pub directory: Vec<FileStreamNode>,
    entries: Vec<ResourceFile>,
}

impl FileStreamBundle {
    /// Whether the view starts with the "UnityFS" signature.
    pub fn probe(view: &MemoryView) -> bool {
        peek_signature(view) == Some(BundleSignature::UnityFs)
    }

    /// Parse a bundle and extract every directory entry.
    pub fn read(mut view: MemoryView) -> Result<Self> {
        let (header, size, compressed_bis, uncompressed_bis, flags) = {
            let mut reader = EndianReader::new(&mut view, ByteOrder::Big);
            let header = BundleHeader::read(&mut reader, BundleSignature::UnityFs)?;
            let size = reader.read_i64()?;
            let compressed_bis = reader.read_u32()?;
            let uncompressed_bis = reader.read_u32()?;
            let flags = reader.read_u32()?;
            (header, size, compressed_bis, uncompressed_bis, flags)
        };
        let header_end = view.position();

        tracing::debug!(
            version = header.version,
            size,
            flags = format_args!("{flags:#x}"),
            "reading UnityFS bundle"
        );

        if header.version >= VERSION_LARGE_FILES_SUPPORT {
            view.align(16)?;
        }
        let at_end = flags & bundle_flags::BLOCKS_INFO_AT_END != 0;
        if at_end {
            let info_start = (size as u64)
                .checked_sub(compressed_bis as u64)
                .ok_or_else(|| FilesError::out_of_range(compressed_bis as u64, size as u64))?;
            view.set_position(info_start as usize)?;
        }

        let compression = CompressionType::from_flags(flags)?;
        if compression == CompressionType::Lzham {
            return Err(FilesError::unsupported("LZHAM blocks info"));
        }
        let metadata = compression::decompress_block(
            compression,
            &mut view,
            compressed_bis as usize,
            uncompressed_bis as usize,
        )?;

        let (blocks_info, directory) = parse_metadata(metadata, uncompressed_bis, flags)?;

        // position the view at the start of the payload blocks
        if at_end {
            view.set_position(header_end)?;
            if header.version >= VERSION_LARGE_FILES_SUPPORT {
                view.align(16)?;
            }
        }
        if flags & bundle_flags::BLOCK_INFO_NEEDS_PADDING_AT_START != 0 {
            view.align(16)?;
        }

        let mut block_reader = BundleBlockReader::new(view, blocks_info.clone());
        let mut entries = Vec::with_capacity(directory.len());
        for node in &directory {
            entries.push(block_reader.read_entry(node)?);
        }

        Ok(Self {
            header,
            size,
            compressed_blocks_info_size: compressed_bis,
            uncompressed_blocks_info_size: uncompressed_bis,
            flags,
            blocks_info,
            directory,
            entries,
        })
    }

    /// Codec used for the blocks info section.
    pub fn compression(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags)
    }

    /// Extracted entries, in directory order.
    pub fn entries(&self) -> &[ResourceFile] {
        &self.entries
    }

    /// Find an entry by its directory path.
    pub fn entry(&self, path: &str) -> Option<&ResourceFile> {
        self.entries.iter().find(|e| e.name() == path)
    }
}

fn parse_metadata(
    metadata: Vec<u8>,
    declared_size: u32,
    flags: u32,
) -> Result<(BlocksInfo, Vec<FileStreamNode>)> {
    let mut meta_view = MemoryView::from_vec(metadata);
    let mut reader = EndianReader::new(&mut meta_view, ByteOrder::Big);
    let blocks_info = BlocksInfo::read(&mut reader)?;
    let directory = if flags & bundle_flags::BLOCKS_AND_DIRECTORY_COMBINED != 0 {
        FileStreamNode::read_directory(&mut reader)?
    } else {
        Vec::new()
    };
    let consumed = reader.position() as u64;
    if declared_size > 0 && consumed != declared_size as u64 {
        return Err(FilesError::format_mismatch(
            "bundle metadata",
            declared_size as u64,
            consumed,
        ));
    }
    Ok((blocks_info, directory))
}

/// Produces bundles the reader can load back byte-for-byte.
///
/// The whole payload goes into a single storage block, compressed with
/// either no codec or LZ4. LZMA output is not implemented, matching the
/// original tooling this mirrors.
#[derive(Debug, Clone)]
pub struct FileStreamBundleWriter {
    pub version: u32,
    pub unity_web_bundle_version: String,
    pub unity_web_minimum_revision: String,
    pub compression: CompressionType,
}

impl Default for FileStreamBundleWriter {
    fn default() -> Self {
        Self {
            version: 6,
            unity_web_bundle_version: "5.x.x".into(),
            unity_web_minimum_revision: "2019.4.0f1".into(),
            compression: CompressionType::None,
        }
    }
}

impl FileStreamBundleWriter {
    /// Serialize named payloads into a bundle.
    pub fn write(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
        match self.compression {
            CompressionType::None | CompressionType::Lz4 => {}
            other => {
                return Err(FilesError::unsupported(format!(
                    "{other} bundle compression for writing"
                )));
            }
        }

        let mut payload = Vec::new();
        let mut directory = Vec::with_capacity(files.len());
        for (path, data) in files {
            directory.push(FileStreamNode {
                offset: payload.len() as i64,
                size: data.len() as i64,
                flags: 4,
                path: path.clone(),
            });
            payload.extend_from_slice(data);
        }

        let stored_payload = match self.compression {
            CompressionType::None => payload.clone(),
            _ => compression::compress_lz4(&payload),
        };
        let block = StorageBlock {
            uncompressed_size: payload.len() as u32,
            compressed_size: stored_payload.len() as u32,
            flags: self.compression.to_flags() as u16,
        };
        let blocks_info = BlocksInfo {
            uncompressed_data_hash: [0; 16],
            blocks: vec![block],
        };

        let mut metadata = Vec::new();
        blocks_info.write(&mut metadata)?;
        FileStreamNode::write_directory(&directory, &mut metadata)?;
        let uncompressed_bis = metadata.len() as u32;
        let stored_metadata = match self.compression {
            CompressionType::None => metadata,
            _ => compression::compress_lz4(&metadata),
        };
        let compressed_bis = stored_metadata.len() as u32;

        let flags = self.compression.to_flags() | bundle_flags::BLOCKS_AND_DIRECTORY_COMBINED;

        let header = BundleHeader {
            signature: BundleSignature::UnityFs,
            version: self.version,
            unity_web_bundle_version: self.unity_web_bundle_version.clone(),
            unity_web_minimum_revision: self.unity_web_minimum_revision.clone(),
        };
        let mut out = Vec::new();
        header.write(&mut out)?;
        // size is the total file length; everything after this point has a
        // known length, so compute it up front
        let header_len = out.len() + 8 + 4 + 4 + 4;
        let padding = if self.version >= VERSION_LARGE_FILES_SUPPORT {
            header_len.next_multiple_of(16) - header_len
        } else {
            0
        };
        let total =
            header_len + padding + stored_metadata.len() + stored_payload.len();
        out.write_i64::<BigEndian>(total as i64)?;
        out.write_u32::<BigEndian>(compressed_bis)?;
        out.write_u32::<BigEndian>(uncompressed_bis)?;
        out.write_u32::<BigEndian>(flags)?;
        out.extend(std::iter::repeat_n(0u8, padding));
        out.extend_from_slice(&stored_metadata);
        out.extend_from_slice(&stored_payload);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> Vec<(String, Vec<u8>)> {
        vec![
            ("CAB-first".to_string(), (0u8..100).collect()),
            ("CAB-first.resS".to_string(), vec![0xAB; 37]),
        ]
    }

    #[test]
    fn test_write_read_uncompressed() {
        let writer = FileStreamBundleWriter::default();
        let bytes = writer.write(&sample_files()).unwrap();
        assert!(FileStreamBundle::probe(&MemoryView::from_vec(bytes.clone())));

        let bundle = FileStreamBundle::read(MemoryView::from_vec(bytes)).unwrap();
        assert_eq!(bundle.directory.len(), 2);
        let first = bundle.entry("CAB-first").unwrap();
        assert_eq!(first.data().as_slice(), &(0u8..100).collect::<Vec<_>>()[..]);
        let ress = bundle.entry("CAB-first.resS").unwrap();
        assert_eq!(ress.len(), 37);
    }

    #[test]
    fn test_write_read_lz4() {
        let writer = FileStreamBundleWriter {
            compression: CompressionType::Lz4,
            ..Default::default()
        };
        let bytes = writer.write(&sample_files()).unwrap();
        let bundle = FileStreamBundle::read(MemoryView::from_vec(bytes)).unwrap();
        assert_eq!(bundle.compression().unwrap(), CompressionType::Lz4);
        assert_eq!(
            bundle.entry("CAB-first.resS").unwrap().data().as_slice(),
            &[0xAB; 37][..]
        );
    }

    #[test]
    fn test_write_version_seven_aligns_payload() {
        let writer = FileStreamBundleWriter {
            version: 7,
            ..Default::default()
        };
        let bytes = writer.write(&sample_files()).unwrap();
        let bundle = FileStreamBundle::read(MemoryView::from_vec(bytes)).unwrap();
        assert_eq!(bundle.entries().len(), 2);
    }

    #[test]
    fn test_lzma_writing_unsupported() {
        let writer = FileStreamBundleWriter {
            compression: CompressionType::Lzma,
            ..Default::default()
        };
        assert!(matches!(
            writer.write(&sample_files()),
            Err(FilesError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_truncated_metadata_is_format_mismatch() {
        let writer = FileStreamBundleWriter::default();
        let mut bytes = writer.write(&sample_files()).unwrap();
        // inflate the declared uncompressed blocks-info size
        // (it sits 12 bytes before the end of the fixed header)
        let header_len = "UnityFS".len() + 1 + 4 + "5.x.x".len() + 1 + "2019.4.0f1".len() + 1;
        let ubis_at = header_len + 8 + 4;
        bytes[ubis_at..ubis_at + 4].copy_from_slice(&(10_000u32).to_be_bytes());
        assert!(FileStreamBundle::read(MemoryView::from_vec(bytes)).is_err());
    }
}
