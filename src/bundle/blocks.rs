//! Bundle metadata structures: storage blocks and directory nodes

use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::bundle::header::write_cstring;
use crate::compression::CompressionType;
use crate::error::Result;
use crate::reader::EndianReader;

/// Paths inside bundle directories are bounded; used for cstring scans.
const MAX_NODE_PATH: usize = 4096;

/// One compressed block of the bundle payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBlock {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: u16,
}

impl StorageBlock {
    pub fn read(reader: &mut EndianReader<'_>) -> Result<Self> {
        Ok(Self {
            uncompressed_size: reader.read_u32()?,
            compressed_size: reader.read_u32()?,
            flags: reader.read_u16()?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<BigEndian>(self.uncompressed_size)?;
        out.write_u32::<BigEndian>(self.compressed_size)?;
        out.write_u16::<BigEndian>(self.flags)?;
        Ok(())
    }

    /// Per-block compression, decoded from the low flag bits.
    pub fn compression(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags as u32)
    }
}

/// The blocks-info section of a block-compressed bundle: an uncompressed
/// data hash followed by the block list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlocksInfo {
    pub uncompressed_data_hash: [u8; 16],
    pub blocks: Vec<StorageBlock>,
}

impl BlocksInfo {
    pub fn read(reader: &mut EndianReader<'_>) -> Result<Self> {
        let uncompressed_data_hash = reader.read_byte_array::<16>()?;
        let count = read_count(reader)?;
        let mut blocks = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            blocks.push(StorageBlock::read(reader)?);
        }
        Ok(Self {
            uncompressed_data_hash,
            blocks,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.uncompressed_data_hash);
        out.write_i32::<BigEndian>(self.blocks.len() as i32)?;
        for block in &self.blocks {
            block.write(out)?;
        }
        Ok(())
    }

    /// Total uncompressed payload size across all blocks.
    pub fn total_uncompressed(&self) -> u64 {
        self.blocks.iter().map(|b| b.uncompressed_size as u64).sum()
    }
}

/// Directory entry of a block-compressed bundle. Offsets address the
/// logical (uncompressed) payload, not the stored bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStreamNode {
    pub offset: i64,
    pub size: i64,
    pub flags: u32,
    pub path: String,
}

impl FileStreamNode {
    pub fn read(reader: &mut EndianReader<'_>) -> Result<Self> {
        Ok(Self {
            offset: reader.read_i64()?,
            size: reader.read_i64()?,
            flags: reader.read_u32()?,
            path: reader.read_cstring(MAX_NODE_PATH)?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_i64::<BigEndian>(self.offset)?;
        out.write_i64::<BigEndian>(self.size)?;
        out.write_u32::<BigEndian>(self.flags)?;
        write_cstring(out, &self.path);
        Ok(())
    }

    pub fn read_directory(reader: &mut EndianReader<'_>) -> Result<Vec<Self>> {
        let count = read_count(reader)?;
        let mut nodes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            nodes.push(Self::read(reader)?);
        }
        Ok(nodes)
    }

    pub fn write_directory(nodes: &[Self], out: &mut Vec<u8>) -> Result<()> {
        out.write_i32::<BigEndian>(nodes.len() as i32)?;
        for node in nodes {
            node.write(out)?;
        }
        Ok(())
    }
}

/// Directory entry of a legacy raw/web bundle. Offsets address the data
/// region directly; note the path comes before the numbers here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWebNode {
    pub path: String,
    pub offset: u32,
    pub size: u32,
}

impl RawWebNode {
    pub fn read(reader: &mut EndianReader<'_>) -> Result<Self> {
        Ok(Self {
            path: reader.read_cstring(MAX_NODE_PATH)?,
            offset: reader.read_u32()?,
            size: reader.read_u32()?,
        })
    }

    pub fn read_directory(reader: &mut EndianReader<'_>) -> Result<Vec<Self>> {
        let count = read_count(reader)?;
        let mut nodes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            nodes.push(Self::read(reader)?);
        }
        Ok(nodes)
    }
}

fn read_count(reader: &mut EndianReader<'_>) -> Result<usize> {
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(crate::error::FilesError::invalid_data(format!(
            "negative entry count {count}"
        )));
    }
    Ok(count as usize)
}
