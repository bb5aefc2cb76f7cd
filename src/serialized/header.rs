//! Serialized file header

use serde::{Deserialize, Serialize};

use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::reader::{ByteOrder, EndianReader};

/// Format version that moved the header to 64-bit sizes.
pub const VERSION_LARGE_FILES: u32 = 22;
/// Format version that put the endianness byte into the header.
pub const VERSION_HEADER_ENDIANNESS: u32 = 9;

/// Versions outside this range cannot be a serialized file; used by the
/// probe to reject arbitrary binary data quickly.
const MIN_VERSION: u32 = 1;
const MAX_VERSION: u32 = 30;

const HEADER_MIN_SIZE: usize = 16;
const HEADER_LARGE_SIZE: usize = 48;

/// Fixed header of a serialized file. Always big-endian, regardless of the
/// endianness the metadata and object data use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedFileHeader {
    pub metadata_size: u64,
    pub file_size: u64,
    pub version: u32,
    pub data_offset: u64,
    /// Present in the header from version 9; earlier formats store the
    /// byte as the first thing in the metadata section instead.
    pub endianness: Option<ByteOrder>,
}

impl SerializedFileHeader {
    pub fn read(reader: &mut EndianReader<'_>) -> Result<Self> {
        let mut metadata_size = reader.read_u32()? as u64;
        let mut file_size = reader.read_u32()? as u64;
        let version = reader.read_u32()?;
        let mut data_offset = reader.read_u32()? as u64;

        let mut endianness = None;
        if version >= VERSION_HEADER_ENDIANNESS {
            let endian_byte = reader.read_u8()?;
            endianness = Some(decode_endianness(endian_byte));
            reader.skip(3)?; // reserved
        }
        if version >= VERSION_LARGE_FILES {
            metadata_size = reader.read_u32()? as u64;
            let large_file_size = reader.read_i64()?;
            let large_data_offset = reader.read_i64()?;
            if large_file_size < 0 || large_data_offset < 0 {
                return Err(FilesError::invalid_data(
                    "negative size in serialized file header",
                ));
            }
            file_size = large_file_size as u64;
            data_offset = large_data_offset as u64;
            reader.skip(8)?; // unknown
        }

        Ok(Self {
            metadata_size,
            file_size,
            version,
            data_offset,
            endianness,
        })
    }

    /// Whether the metadata section sits at the end of the file rather
    /// than right after the header.
    pub fn metadata_at_end(&self) -> bool {
        self.version < VERSION_HEADER_ENDIANNESS
    }
}

fn decode_endianness(byte: u8) -> ByteOrder {
    if byte == 0 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    }
}

/// Cheap structural check that a view plausibly holds a serialized file.
///
/// Serialized files carry no signature, so several header fields are
/// validated together: version range, declared file size against the actual
/// stream length, and both offsets within the file. The view's position is
/// untouched.
pub fn is_serialized_file(view: &MemoryView) -> bool {
    let mut probe = view.clone_clean();
    if probe.len() < HEADER_MIN_SIZE {
        return false;
    }
    let mut reader = EndianReader::new(&mut probe, ByteOrder::Big);
    let Ok(header) = read_probe_header(&mut reader) else {
        return false;
    };
    if header.version < MIN_VERSION || header.version > MAX_VERSION {
        return false;
    }
    if header.version >= VERSION_LARGE_FILES && view.len() < HEADER_LARGE_SIZE {
        return false;
    }
    header.file_size == view.len() as u64
        && header.metadata_size > 0
        && header.metadata_size <= header.file_size
        && header.data_offset <= header.file_size
}

fn read_probe_header(reader: &mut EndianReader<'_>) -> Result<SerializedFileHeader> {
    // version gates need the version before the full read can branch; peek
    // it from the fixed offset first
    let saved = reader.position();
    reader.skip(8)?;
    let version = reader.read_u32()?;
    reader.set_position(saved)?;
    if version > MAX_VERSION {
        // avoid mis-reading the large layout out of garbage
        return Err(FilesError::invalid_data("implausible version"));
    }
    SerializedFileHeader::read(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    fn header_v17(metadata_size: u32, file_size: u32, data_offset: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<BigEndian>(metadata_size).unwrap();
        out.write_u32::<BigEndian>(file_size).unwrap();
        out.write_u32::<BigEndian>(17).unwrap();
        out.write_u32::<BigEndian>(data_offset).unwrap();
        out.push(0); // little endian
        out.extend_from_slice(&[0; 3]);
        out
    }

    #[test]
    fn test_read_v17_header() {
        let bytes = header_v17(64, 256, 128);
        let mut view = MemoryView::from_vec(bytes);
        let mut reader = EndianReader::new(&mut view, ByteOrder::Big);
        let header = SerializedFileHeader::read(&mut reader).unwrap();
        assert_eq!(header.version, 17);
        assert_eq!(header.metadata_size, 64);
        assert_eq!(header.file_size, 256);
        assert_eq!(header.data_offset, 128);
        assert_eq!(header.endianness, Some(ByteOrder::Little));
        assert!(!header.metadata_at_end());
    }

    #[test]
    fn test_header_serde_round_trip() {
        let bytes = header_v17(64, 256, 128);
        let mut view = MemoryView::from_vec(bytes);
        let mut reader = EndianReader::new(&mut view, ByteOrder::Big);
        let header = SerializedFileHeader::read(&mut reader).unwrap();

        let json = serde_json::to_string(&header).unwrap();
        let back: SerializedFileHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(back, header);
        assert_eq!(back.endianness, Some(ByteOrder::Little));
    }

    #[test]
    fn test_read_v22_header() {
        let mut bytes = header_v17(0, 0, 0);
        bytes[8..12].copy_from_slice(&22u32.to_be_bytes());
        bytes.write_u32::<BigEndian>(80).unwrap(); // metadata size
        bytes.write_i64::<BigEndian>(4096).unwrap(); // file size
        bytes.write_i64::<BigEndian>(512).unwrap(); // data offset
        bytes.write_i64::<BigEndian>(0).unwrap(); // unknown

        let mut view = MemoryView::from_vec(bytes);
        let mut reader = EndianReader::new(&mut view, ByteOrder::Big);
        let header = SerializedFileHeader::read(&mut reader).unwrap();
        assert_eq!(header.metadata_size, 80);
        assert_eq!(header.file_size, 4096);
        assert_eq!(header.data_offset, 512);
    }

    #[test]
    fn test_probe_accepts_consistent_header() {
        let mut bytes = header_v17(32, 0, 64);
        bytes.resize(256, 0);
        let file_size = bytes.len() as u32;
        bytes[4..8].copy_from_slice(&file_size.to_be_bytes());
        let view = MemoryView::from_vec(bytes);
        assert!(is_serialized_file(&view));
        assert_eq!(view.position(), 0);
    }

    #[test]
    fn test_probe_rejects_near_misses() {
        // declared file size disagrees with the stream length
        let mut bytes = header_v17(32, 999, 64);
        bytes.resize(256, 0);
        assert!(!is_serialized_file(&MemoryView::from_vec(bytes.clone())));

        // implausible version
        let mut bytes = header_v17(32, 256, 64);
        bytes.resize(256, 0);
        bytes[8..12].copy_from_slice(&4000u32.to_be_bytes());
        assert!(!is_serialized_file(&MemoryView::from_vec(bytes)));

        // data offset past the file
        let mut bytes = header_v17(32, 256, 300);
        bytes.resize(256, 0);
        assert!(!is_serialized_file(&MemoryView::from_vec(bytes)));

        // bundle signatures decode to absurd sizes
        let mut bundle = b"UnityFS\0".to_vec();
        bundle.resize(64, 0);
        assert!(!is_serialized_file(&MemoryView::from_vec(bundle)));
    }
}
