//! "UnityWebData1.0" web player containers
//!
//! A flat little-endian archive: signature, total header length, then a
//! packed entry table of (offset, size, name) triples. Entry data follows
//! the header at the recorded absolute offsets.

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::reader::{ByteOrder, EndianReader};
use crate::resource::ResourceFile;

const SIGNATURE: &str = "UnityWebData1.0";

/// One entry of the header table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebFileEntry {
    pub offset: i32,
    pub size: i32,
    pub name: String,
}

impl WebFileEntry {
    fn read(reader: &mut EndianReader<'_>) -> Result<Self> {
        Ok(Self {
            offset: reader.read_i32()?,
            size: reader.read_i32()?,
            name: reader.read_string()?,
        })
    }
}

/// A parsed web player container.
#[derive(Debug)]
pub struct WebFile {
    pub header_length: i32,
    pub table: Vec<WebFileEntry>,
    entries: Vec<ResourceFile>,
}

impl WebFile {
    /// Whether the view starts with the web container signature.
    pub fn probe(view: &MemoryView) -> bool {
        let mut probe = view.clone();
        let mut reader = EndianReader::new(&mut probe, ByteOrder::Little);
        matches!(
            reader.read_cstring(SIGNATURE.len() + 1),
            Ok(ref s) if s == SIGNATURE
        )
    }

    /// Parse the container and expose each entry as a sub-view.
    pub fn read(mut view: MemoryView) -> Result<Self> {
        let (header_length, table) = {
            let mut reader = EndianReader::new(&mut view, ByteOrder::Little);
            let signature = reader.read_cstring(SIGNATURE.len() + 1)?;
            if signature != SIGNATURE {
                return Err(FilesError::invalid_signature(
                    SIGNATURE.to_string(),
                    signature,
                ));
            }
            let header_length = reader.read_i32()?;
            if header_length < 0 {
                return Err(FilesError::invalid_data(format!(
                    "negative web container header length {header_length}"
                )));
            }
            let mut table = Vec::new();
            while reader.position() < header_length as usize {
                table.push(WebFileEntry::read(&mut reader)?);
            }
            (header_length, table)
        };

        tracing::debug!(entries = table.len(), "reading web container");

        let mut entries = Vec::with_capacity(table.len());
        for entry in &table {
            if entry.offset < 0 || entry.size < 0 {
                return Err(FilesError::invalid_data(format!(
                    "entry {} has negative offset or size",
                    entry.name
                )));
            }
            let data = view.slice(entry.offset as usize, entry.size as usize)?;
            entries.push(ResourceFile::new(entry.name.clone(), data));
        }

        Ok(Self {
            header_length,
            table,
            entries,
        })
    }

    pub fn entries(&self) -> &[ResourceFile] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&ResourceFile> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// Serialize named payloads into a container the reader round-trips.
    ///
    /// Entry data is 4-aligned, which the format permits and real packers
    /// do.
    pub fn write(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
        let mut header_length = SIGNATURE.len() + 1 + 4;
        for (name, _) in files {
            header_length += 4 + 4 + 4 + name.len();
        }

        let mut offsets = Vec::with_capacity(files.len());
        let mut cursor = header_length;
        for (_, data) in files {
            cursor = cursor.next_multiple_of(4);
            offsets.push(cursor);
            cursor += data.len();
        }

        let mut out = Vec::with_capacity(cursor);
        out.extend_from_slice(SIGNATURE.as_bytes());
        out.push(0);
        out.write_i32::<LittleEndian>(header_length as i32)?;
        for ((name, data), offset) in files.iter().zip(&offsets) {
            out.write_i32::<LittleEndian>(*offset as i32)?;
            out.write_i32::<LittleEndian>(data.len() as i32)?;
            out.write_i32::<LittleEndian>(name.len() as i32)?;
            out.extend_from_slice(name.as_bytes());
        }
        for ((_, data), offset) in files.iter().zip(&offsets) {
            out.resize(*offset, 0);
            out.extend_from_slice(data);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> Vec<(String, Vec<u8>)> {
        vec![
            ("data.unity3d".to_string(), vec![1, 2, 3, 4, 5]),
            ("setup.json".to_string(), b"{}".to_vec()),
        ]
    }

    #[test]
    fn test_write_read_round_trip() {
        let bytes = WebFile::write(&sample_files()).unwrap();
        let view = MemoryView::from_vec(bytes);
        assert!(WebFile::probe(&view));
        assert_eq!(view.position(), 0);

        let web = WebFile::read(view).unwrap();
        assert_eq!(web.table.len(), 2);
        assert_eq!(
            web.entry("data.unity3d").unwrap().data().as_slice(),
            &[1, 2, 3, 4, 5]
        );
        assert_eq!(web.entry("setup.json").unwrap().data().as_slice(), b"{}");
        // entry data is 4-aligned
        assert_eq!(web.table[0].offset % 4, 0);
    }

    #[test]
    fn test_probe_rejects_other_signatures() {
        let view = MemoryView::from_vec(b"UnityFS\0rest".to_vec());
        assert!(!WebFile::probe(&view));
    }

    #[test]
    fn test_entry_past_end_rejected() {
        let mut bytes = WebFile::write(&sample_files()).unwrap();
        // point the first entry's size past the file end
        let size_at = SIGNATURE.len() + 1 + 4 + 4;
        bytes[size_at..size_at + 4].copy_from_slice(&i32::MAX.to_le_bytes());
        assert!(matches!(
            WebFile::read(MemoryView::from_vec(bytes)),
            Err(FilesError::OutOfRange { .. })
        ));
    }
}
