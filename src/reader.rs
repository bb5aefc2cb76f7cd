//! Endian-aware reader over a [`MemoryView`]

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{FilesError, Result};
use crate::memory::MemoryView;

/// Byte order for reading binary data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Big endian (network byte order)
    Big,
    /// Little endian (most common on x86/x64)
    #[default]
    Little,
}

/// Endian-aware reader borrowing a [`MemoryView`] cursor.
///
/// Reads advance the underlying view's position, so dropping the reader and
/// picking the view back up continues where the reader left off.
pub struct EndianReader<'a> {
    view: &'a mut MemoryView,
    byte_order: ByteOrder,
    /// Whether primitive array reads align to 4 bytes afterwards. Gated on
    /// the serialized file format version (2017.1 and later).
    align_arrays: bool,
}

impl<'a> EndianReader<'a> {
    /// Create a new reader over the given view.
    pub fn new(view: &'a mut MemoryView, byte_order: ByteOrder) -> Self {
        Self {
            view,
            byte_order,
            align_arrays: false,
        }
    }

    /// Create a reader that aligns after primitive array reads.
    pub fn with_array_alignment(view: &'a mut MemoryView, byte_order: ByteOrder) -> Self {
        Self {
            view,
            byte_order,
            align_arrays: true,
        }
    }

    /// Get the current byte order
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Set the byte order
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Current position within the underlying view
    pub fn position(&self) -> usize {
        self.view.position()
    }

    /// Set the position within the underlying view
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        self.view.set_position(position)
    }

    /// Total length of the underlying view
    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Bytes remaining in the underlying view
    pub fn remaining(&self) -> usize {
        self.view.remaining()
    }

    /// Skip forward `count` bytes
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.view.skip(count)
    }

    /// Align to the next 4-byte boundary
    pub fn align(&mut self) -> Result<()> {
        self.view.align(4)
    }

    /// Align to the specified power-of-two boundary
    pub fn align_to(&mut self, alignment: usize) -> Result<()> {
        self.view.align(alignment)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.view.read_bytes(1)?[0])
    }

    /// Read a boolean (as u8, 0 = false, non-zero = true)
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a signed 8-bit integer
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read an unsigned 16-bit integer
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.view.read_bytes(2)?;
        Ok(match self.byte_order {
            ByteOrder::Big => BigEndian::read_u16(bytes),
            ByteOrder::Little => LittleEndian::read_u16(bytes),
        })
    }

    /// Read a signed 16-bit integer
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Read an unsigned 32-bit integer
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.view.read_bytes(4)?;
        Ok(match self.byte_order {
            ByteOrder::Big => BigEndian::read_u32(bytes),
            ByteOrder::Little => LittleEndian::read_u32(bytes),
        })
    }

    /// Read a signed 32-bit integer
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read an unsigned 64-bit integer
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.view.read_bytes(8)?;
        Ok(match self.byte_order {
            ByteOrder::Big => BigEndian::read_u64(bytes),
            ByteOrder::Little => LittleEndian::read_u64(bytes),
        })
    }

    /// Read a signed 64-bit integer
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Read a 16-bit floating point number, widened to f32
    pub fn read_f16(&mut self) -> Result<f32> {
        Ok(f16::from_bits(self.read_u16()?).to_f32())
    }

    /// Read a 32-bit floating point number
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read a 64-bit floating point number
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.view.read_bytes(count)?.to_vec())
    }

    /// Read a fixed-size byte array
    pub fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.view.read_array()
    }

    /// Read a null-terminated string.
    ///
    /// Scans at most `max_len` bytes; a missing terminator within that window
    /// is reported as invalid data rather than running to the end of the view.
    pub fn read_cstring(&mut self, max_len: usize) -> Result<String> {
        let mut bytes = Vec::new();
        for _ in 0..max_len {
            let byte = self.read_u8()?;
            if byte == 0 {
                return Ok(String::from_utf8(bytes)?);
            }
            bytes.push(byte);
        }
        Err(FilesError::invalid_data(format!(
            "string not terminated within {max_len} bytes"
        )))
    }

    /// Read a string with a 32-bit length prefix
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_i32()?;
        if length < 0 {
            return Err(FilesError::invalid_data(format!(
                "negative string length {length}"
            )));
        }
        let bytes = self.read_bytes(length as usize)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Read a length-prefixed string followed by alignment to 4 bytes.
    ///
    /// Alignment is applied whether or not the string length was already a
    /// multiple of 4; serialized data always pads these strings.
    pub fn read_aligned_string(&mut self) -> Result<String> {
        let string = self.read_string()?;
        self.align()?;
        Ok(string)
    }

    fn check_array(&self, count: usize, elem_size: usize) -> Result<()> {
        let needed = count
            .checked_mul(elem_size)
            .ok_or_else(|| FilesError::out_of_range(u64::MAX, self.remaining() as u64))?;
        if needed > self.remaining() {
            return Err(FilesError::out_of_range(
                needed as u64,
                self.remaining() as u64,
            ));
        }
        Ok(())
    }

    fn post_array(&mut self) -> Result<()> {
        if self.align_arrays {
            self.align()?;
        }
        Ok(())
    }

    /// Read a 32-bit count followed by that many i32 values
    pub fn read_i32_array(&mut self) -> Result<Vec<i32>> {
        let count = self.read_array_count()?;
        self.check_array(count, 4)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_i32()?);
        }
        self.post_array()?;
        Ok(values)
    }

    /// Read a 32-bit count followed by that many u32 values
    pub fn read_u32_array(&mut self) -> Result<Vec<u32>> {
        let count = self.read_array_count()?;
        self.check_array(count, 4)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_u32()?);
        }
        self.post_array()?;
        Ok(values)
    }

    /// Read a 32-bit count followed by that many length-prefixed strings
    pub fn read_string_array(&mut self) -> Result<Vec<String>> {
        let count = self.read_array_count()?;
        // each string needs at least its 4-byte length prefix
        self.check_array(count, 4)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_string()?);
        }
        self.post_array()?;
        Ok(values)
    }

    fn read_array_count(&mut self) -> Result<usize> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(FilesError::invalid_data(format!(
                "negative array count {count}"
            )));
        }
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(data: &[u8]) -> MemoryView {
        MemoryView::from_vec(data.to_vec())
    }

    #[test]
    fn test_endianness() {
        let mut v = view(&[0x01, 0x02, 0x03, 0x04]);
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        assert_eq!(reader.read_u32().unwrap(), 0x04030201);

        let mut v = view(&[0x01, 0x02, 0x03, 0x04]);
        let mut reader = EndianReader::new(&mut v, ByteOrder::Big);
        assert_eq!(reader.read_u32().unwrap(), 0x01020304);
    }

    #[test]
    fn test_position_survives_reader() {
        let mut v = view(&[1, 2, 3, 4]);
        {
            let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
            reader.read_u16().unwrap();
        }
        assert_eq!(v.position(), 2);
    }

    #[test]
    fn test_cstring() {
        let mut v = view(b"Hello\0World\0");
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        assert_eq!(reader.read_cstring(64).unwrap(), "Hello");
        assert_eq!(reader.read_cstring(64).unwrap(), "World");
    }

    #[test]
    fn test_cstring_missing_terminator() {
        let mut v = view(b"abcdef");
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        let err = reader.read_cstring(4).unwrap_err();
        assert!(matches!(err, FilesError::InvalidData(_)));
    }

    #[test]
    fn test_aligned_string_always_aligns() {
        // "abcd" is exactly 4 bytes, but alignment still applies to the
        // position after the length prefix plus payload (8, already aligned)
        let mut data = vec![4, 0, 0, 0];
        data.extend_from_slice(b"abcd");
        data.extend_from_slice(&[0xAA; 4]);
        let mut v = view(&data);
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        assert_eq!(reader.read_aligned_string().unwrap(), "abcd");
        assert_eq!(reader.position(), 8);

        // a 3-byte string leaves position 7, aligned up to 8
        let mut data = vec![3, 0, 0, 0];
        data.extend_from_slice(b"abc");
        data.extend_from_slice(&[0xAA; 4]);
        let mut v = view(&data);
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        assert_eq!(reader.read_aligned_string().unwrap(), "abc");
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_negative_string_length() {
        let mut v = view(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        assert!(matches!(
            reader.read_string(),
            Err(FilesError::InvalidData(_))
        ));
    }

    #[test]
    fn test_array_count_bounds_check() {
        // claims 1000 elements but only 4 bytes follow the count
        let mut data = vec![0xE8, 0x03, 0x00, 0x00];
        data.extend_from_slice(&[0; 4]);
        let mut v = view(&data);
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        assert!(matches!(
            reader.read_i32_array(),
            Err(FilesError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_array_alignment() {
        // count 1, one u16-ish via i32 array not applicable; use raw bytes:
        // i32 array of one element ends aligned already, so exercise the flag
        // with a string array whose payload ends unaligned
        let mut data = vec![1, 0, 0, 0]; // one string
        data.extend_from_slice(&[2, 0, 0, 0]); // length 2
        data.extend_from_slice(b"ab");
        data.extend_from_slice(&[0; 4]);
        let mut v = view(&data);
        let mut reader = EndianReader::with_array_alignment(&mut v, ByteOrder::Little);
        let strings = reader.read_string_array().unwrap();
        assert_eq!(strings, vec!["ab".to_string()]);
        assert_eq!(reader.position() % 4, 0);
    }

    #[test]
    fn test_f16() {
        // 1.0 in IEEE half precision is 0x3C00
        let mut v = view(&[0x00, 0x3C]);
        let mut reader = EndianReader::new(&mut v, ByteOrder::Little);
        assert_eq!(reader.read_f16().unwrap(), 1.0);
    }
}
