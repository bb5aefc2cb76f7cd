//! Entry extraction from a block-compressed payload

use crate::bundle::blocks::{BlocksInfo, FileStreamNode};
use crate::compression::{self, CompressionType};
use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::resource::ResourceFile;

/// Reassembles directory entries from the compressed block sequence.
///
/// Entry offsets address the logical uncompressed payload, so an entry can
/// start in the middle of one block and run across several. The most
/// recently decompressed block is kept around; consecutive entries usually
/// live in the same block, so this one-slot cache avoids re-decompressing
/// it for each of them.
pub struct BundleBlockReader {
    data: MemoryView,
    blocks_info: BlocksInfo,
    data_offset: usize,
    cached: Option<CachedBlock>,
}

struct CachedBlock {
    index: usize,
    data: Vec<u8>,
}

impl BundleBlockReader {
    /// Create a reader over the payload region starting at `data`'s current
    /// position.
    pub fn new(data: MemoryView, blocks_info: BlocksInfo) -> Self {
        let data_offset = data.position();
        Self {
            data,
            blocks_info,
            data_offset,
            cached: None,
        }
    }

    /// Extract one directory entry into a freshly allocated buffer.
    pub fn read_entry(&mut self, entry: &FileStreamNode) -> Result<ResourceFile> {
        if entry.offset < 0 || entry.size < 0 {
            return Err(FilesError::invalid_data(format!(
                "entry {} has negative offset or size",
                entry.path
            )));
        }
        let entry_offset = entry.offset as u64;
        let entry_size = entry.size as usize;

        // find the block containing the entry's first byte
        let blocks = &self.blocks_info.blocks;
        let mut block_index = 0;
        let mut compressed_offset = 0u64;
        let mut decompressed_offset = 0u64;
        loop {
            let Some(block) = blocks.get(block_index) else {
                return Err(FilesError::out_of_range(
                    entry_offset,
                    decompressed_offset,
                ));
            };
            if decompressed_offset + block.uncompressed_size as u64 > entry_offset {
                break;
            }
            compressed_offset += block.compressed_size as u64;
            decompressed_offset += block.uncompressed_size as u64;
            block_index += 1;
        }
        let mut offset_inside_block = (entry_offset - decompressed_offset) as usize;

        let mut out = MemoryView::allocate(entry_size);
        let mut left = entry_size;
        self.data
            .set_position(self.data_offset + compressed_offset as usize)?;

        while left > 0 {
            let Some(block) = blocks.get(block_index).copied() else {
                return Err(FilesError::decompression_mismatch(
                    entry_size as u64,
                    (entry_size - left) as u64,
                ));
            };
            let block_remaining = (block.uncompressed_size as usize)
                .checked_sub(offset_inside_block)
                .ok_or_else(|| {
                    FilesError::out_of_range(
                        offset_inside_block as u64,
                        block.uncompressed_size as u64,
                    )
                })?;
            let take = block_remaining.min(left);

            if let Some(cached) = self.cached.as_ref().filter(|c| c.index == block_index) {
                // previous entry already decompressed this block
                out.write(&cached.data[offset_inside_block..offset_inside_block + take])?;
                self.data.skip(block.compressed_size as usize)?;
            } else {
                match block.compression()? {
                    CompressionType::None => {
                        self.data.skip(offset_inside_block)?;
                        out.copy_from(&mut self.data, take)?;
                        // land at the start of the next block regardless of
                        // how much of this one the entry used
                        let rest = (block.compressed_size as usize)
                            .checked_sub(offset_inside_block + take)
                            .ok_or_else(|| {
                                FilesError::invalid_data(format!(
                                    "stored block {block_index} shorter than its declared span"
                                ))
                            })?;
                        self.data.skip(rest)?;
                    }
                    compression => {
                        tracing::trace!(
                            block = block_index,
                            %compression,
                            compressed = block.compressed_size,
                            uncompressed = block.uncompressed_size,
                            "decompressing bundle block"
                        );
                        let decoded = compression::decompress_block(
                            compression,
                            &mut self.data,
                            block.compressed_size as usize,
                            block.uncompressed_size as usize,
                        )?;
                        out.write(&decoded[offset_inside_block..offset_inside_block + take])?;
                        self.cached = Some(CachedBlock {
                            index: block_index,
                            data: decoded,
                        });
                    }
                }
            }

            offset_inside_block = 0;
            left -= take;
            block_index += 1;
        }

        Ok(ResourceFile::new(entry.path.clone(), out.clone_clean()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::blocks::StorageBlock;
    use crate::compression::compress_lz4;

    fn node(path: &str, offset: i64, size: i64) -> FileStreamNode {
        FileStreamNode {
            offset,
            size,
            flags: 0,
            path: path.into(),
        }
    }

    fn blocks_info(blocks: Vec<StorageBlock>) -> BlocksInfo {
        BlocksInfo {
            uncompressed_data_hash: [0; 16],
            blocks,
        }
    }

    #[test]
    fn test_entry_spanning_uncompressed_blocks() {
        // three 10-byte uncompressed blocks holding bytes 0..30
        let payload: Vec<u8> = (0u8..30).collect();
        let blocks = (0..3)
            .map(|_| StorageBlock {
                uncompressed_size: 10,
                compressed_size: 10,
                flags: 0,
            })
            .collect();
        let data = MemoryView::from_vec(payload);
        let mut reader = BundleBlockReader::new(data, blocks_info(blocks));

        // offset 5 size 20 crosses all three blocks
        let entry = reader.read_entry(&node("a", 5, 20)).unwrap();
        assert_eq!(entry.data().as_slice(), &(5u8..25).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_entry_spanning_lz4_blocks() {
        let first: Vec<u8> = std::iter::repeat_n([1u8, 2, 3, 4], 8).flatten().collect();
        let second: Vec<u8> = std::iter::repeat_n([9u8, 8], 16).flatten().collect();
        let c1 = compress_lz4(&first);
        let c2 = compress_lz4(&second);
        let blocks = vec![
            StorageBlock {
                uncompressed_size: first.len() as u32,
                compressed_size: c1.len() as u32,
                flags: 2,
            },
            StorageBlock {
                uncompressed_size: second.len() as u32,
                compressed_size: c2.len() as u32,
                flags: 2,
            },
        ];
        let mut payload = c1;
        payload.extend_from_slice(&c2);
        let mut reader =
            BundleBlockReader::new(MemoryView::from_vec(payload), blocks_info(blocks));

        let entry = reader
            .read_entry(&node("x", 4, (first.len() + second.len() - 4) as i64))
            .unwrap();
        let mut expected = first[4..].to_vec();
        expected.extend_from_slice(&second);
        assert_eq!(entry.data().as_slice(), &expected[..]);

        // second extraction from the tail block hits the cache
        let entry2 = reader
            .read_entry(&node("y", first.len() as i64, second.len() as i64))
            .unwrap();
        assert_eq!(entry2.data().as_slice(), &second[..]);
    }

    #[test]
    fn test_understated_stored_block_rejected() {
        // the block table claims 10 uncompressed bytes but only 4 stored
        // ones; a corrupt table must surface as an error, not a panic
        let blocks = vec![StorageBlock {
            uncompressed_size: 10,
            compressed_size: 4,
            flags: 0,
        }];
        let mut reader =
            BundleBlockReader::new(MemoryView::from_vec(vec![0; 10]), blocks_info(blocks));
        assert!(matches!(
            reader.read_entry(&node("a", 5, 5)),
            Err(FilesError::InvalidData(_))
        ));
    }

    #[test]
    fn test_entry_past_payload() {
        let blocks = vec![StorageBlock {
            uncompressed_size: 10,
            compressed_size: 10,
            flags: 0,
        }];
        let mut reader =
            BundleBlockReader::new(MemoryView::from_vec(vec![0; 10]), blocks_info(blocks));
        // size runs past the final block
        assert!(reader.read_entry(&node("a", 5, 10)).is_err());
    }
}
