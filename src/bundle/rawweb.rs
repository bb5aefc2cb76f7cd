//! Legacy "UnityRaw" and "UnityWeb" bundles
//!
//! Both share one header layout; they differ only in how the payload is
//! stored. Raw bundles keep the directory and entry data in place, web
//! bundles wrap them in a size-prefixed LZMA stream split into scene
//! chunks, with the directory living inside the last chunk.

use serde::{Deserialize, Serialize};

use crate::bundle::blocks::RawWebNode;
use crate::bundle::header::{BundleHeader, BundleSignature, peek_signature};
use crate::compression;
use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::reader::{ByteOrder, EndianReader};
use crate::resource::ResourceFile;

const VERSION_HAS_COMPLETE_FILE_SIZE: u32 = 2;
const VERSION_HAS_BLOCKS_INFO_SIZE: u32 = 3;
const VERSION_HAS_HASH: u32 = 4;

/// Which legacy layout a bundle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawWebKind {
    Raw,
    Web,
}

impl RawWebKind {
    fn signature(self) -> BundleSignature {
        match self {
            Self::Raw => BundleSignature::UnityRaw,
            Self::Web => BundleSignature::UnityWeb,
        }
    }
}

/// One LZMA scene chunk of a web bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneChunk {
    pub compressed_size: u32,
    pub decompressed_size: u32,
}

/// A parsed legacy bundle.
#[derive(Debug)]
pub struct RawWebBundle {
    pub header: BundleHeader,
    pub kind: RawWebKind,
    /// Data hash and CRC, present from header version 4
    pub hash: Option<[u8; 16]>,
    pub crc: Option<u32>,
    pub minimum_streamed_bytes: u32,
    pub header_size: u32,
    pub number_of_scenes_to_download: u32,
    pub scenes: Vec<SceneChunk>,
    pub complete_file_size: Option<u32>,
    pub uncompressed_blocks_info_size: Option<u32>,
    pub directory: Vec<RawWebNode>,
    entries: Vec<ResourceFile>,
}

impl RawWebBundle {
    /// Whether the view starts with a legacy bundle signature.
    pub fn probe(view: &MemoryView, kind: RawWebKind) -> bool {
        peek_signature(view) == Some(kind.signature())
    }

    /// Parse a legacy bundle and expose its directory entries.
    pub fn read(mut view: MemoryView, kind: RawWebKind) -> Result<Self> {
        let mut reader = EndianReader::new(&mut view, ByteOrder::Big);
        let header = BundleHeader::read(&mut reader, kind.signature())?;

        let (hash, crc) = if header.version >= VERSION_HAS_HASH {
            (Some(reader.read_byte_array::<16>()?), Some(reader.read_u32()?))
        } else {
            (None, None)
        };
        let minimum_streamed_bytes = reader.read_u32()?;
        let header_size = reader.read_u32()?;
        let number_of_scenes_to_download = reader.read_u32()?;
        let scene_count = reader.read_i32()?;
        if scene_count < 0 {
            return Err(FilesError::invalid_data(format!(
                "negative scene count {scene_count}"
            )));
        }
        let mut scenes = Vec::with_capacity(scene_count as usize);
        for _ in 0..scene_count {
            scenes.push(SceneChunk {
                compressed_size: reader.read_u32()?,
                decompressed_size: reader.read_u32()?,
            });
        }
        let complete_file_size = (header.version >= VERSION_HAS_COMPLETE_FILE_SIZE)
            .then(|| reader.read_u32())
            .transpose()?;
        let uncompressed_blocks_info_size = (header.version >= VERSION_HAS_BLOCKS_INFO_SIZE)
            .then(|| reader.read_u32())
            .transpose()?;

        let read_size = reader.position() as u64;
        if read_size != header_size as u64 {
            return Err(FilesError::format_mismatch(
                "legacy bundle header",
                header_size as u64,
                read_size,
            ));
        }
        drop(reader);

        tracing::debug!(
            kind = ?kind,
            version = header.version,
            scenes = scenes.len(),
            "reading legacy bundle"
        );

        let metadata_size = uncompressed_blocks_info_size.unwrap_or(0);
        let (mut data_view, data_offset) = match kind {
            RawWebKind::Raw => {
                let offset = view.position();
                (view, offset)
            }
            RawWebKind::Web => {
                let Some((last, earlier)) = scenes.split_last() else {
                    return Err(FilesError::invalid_data("web bundle has no scene chunks"));
                };
                // earlier chunks hold streamed scene data the directory
                // never references
                for chunk in earlier {
                    view.skip(chunk.compressed_size as usize)?;
                }
                let decoded =
                    compression::decompress_lzma_sized(&mut view, last.compressed_size as usize)?;
                if decoded.len() != last.decompressed_size as usize {
                    return Err(FilesError::decompression_mismatch(
                        last.decompressed_size as u64,
                        decoded.len() as u64,
                    ));
                }
                (MemoryView::from_vec(decoded), 0)
            }
        };

        data_view.set_position(data_offset)?;
        let directory = {
            let metadata_start = data_view.position();
            let mut reader = EndianReader::new(&mut data_view, ByteOrder::Big);
            let directory = RawWebNode::read_directory(&mut reader)?;
            reader.align()?;
            let consumed = (reader.position() - metadata_start) as u64;
            if metadata_size > 0 && consumed != metadata_size as u64 {
                return Err(FilesError::format_mismatch(
                    "legacy bundle metadata",
                    metadata_size as u64,
                    consumed,
                ));
            }
            directory
        };

        let mut entries = Vec::with_capacity(directory.len());
        for node in &directory {
            let data = data_view.slice(data_offset + node.offset as usize, node.size as usize)?;
            entries.push(ResourceFile::new(node.path.clone(), data));
        }

        Ok(Self {
            header,
            kind,
            hash,
            crc,
            minimum_streamed_bytes,
            header_size,
            number_of_scenes_to_download,
            scenes,
            complete_file_size,
            uncompressed_blocks_info_size,
            directory,
            entries,
        })
    }

    pub fn entries(&self) -> &[ResourceFile] {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> Option<&ResourceFile> {
        self.entries.iter().find(|e| e.name() == path)
    }
}
