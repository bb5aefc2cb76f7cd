//! Compressed wrapper files
//!
//! Web builds sometimes ship a whole container wrapped in gzip or brotli.
//! The wrapper carries no structure of its own; reading one yields a single
//! resource holding the decompressed stream, which callers typically feed
//! back through the dispatcher.

use crate::compression;
use crate::error::Result;
use crate::memory::MemoryView;
use crate::resource::ResourceFile;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const BROTLI_SIGNATURE: &str = "UnityWeb Compressed Content (brotli)";

/// A gzip-wrapped file.
#[derive(Debug)]
pub struct GZipFile {
    resource: ResourceFile,
}

impl GZipFile {
    /// Whether the view starts with the gzip magic.
    pub fn probe(view: &MemoryView) -> bool {
        view.as_slice().get(..2) == Some(&GZIP_MAGIC)
    }

    /// Decompress the whole stream into a resource named like the wrapper.
    pub fn read(view: MemoryView, name: &str) -> Result<Self> {
        let decoded = compression::decompress_gzip(view.as_slice())?;
        tracing::debug!(name, decoded = decoded.len(), "unwrapped gzip file");
        Ok(Self {
            resource: ResourceFile::new(name, MemoryView::from_vec(decoded)),
        })
    }

    /// Wrap a payload the way [`GZipFile::read`] unwraps it.
    pub fn write(data: &[u8]) -> Result<Vec<u8>> {
        compression::compress_gzip(data)
    }

    pub fn resource(&self) -> &ResourceFile {
        &self.resource
    }

    pub fn into_resource(self) -> ResourceFile {
        self.resource
    }
}

/// A brotli-wrapped file.
#[derive(Debug)]
pub struct BrotliFile {
    resource: ResourceFile,
}

impl BrotliFile {
    /// Whether the stream's metadata block carries Unity's brotli comment.
    ///
    /// Unity embeds a fixed comment string as a skippable metadata block at
    /// the front of the stream; its length is packed into the low bits of
    /// the second byte, continued across the following bytes.
    pub fn probe(view: &MemoryView) -> bool {
        read_brotli_comment(view.as_slice()).as_deref() == Some(BROTLI_SIGNATURE)
    }

    /// Decompress the whole stream into a resource named like the wrapper.
    pub fn read(view: MemoryView, name: &str) -> Result<Self> {
        let decoded = compression::decompress_brotli(view.as_slice())?;
        tracing::debug!(name, decoded = decoded.len(), "unwrapped brotli file");
        Ok(Self {
            resource: ResourceFile::new(name, MemoryView::from_vec(decoded)),
        })
    }

    pub fn resource(&self) -> &ResourceFile {
        &self.resource
    }

    pub fn into_resource(self) -> ResourceFile {
        self.resource
    }
}

fn read_brotli_comment(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let mut bt = data[1];
    let size_bytes = (bt & 0x3) as usize;
    let mut pos = 2;
    if pos + size_bytes > data.len() {
        return None;
    }

    let mut length = 0usize;
    for i in 0..size_bytes {
        let nbt = data[pos];
        pos += 1;
        let bits = ((bt >> 2) as usize) | (((nbt & 0x3) as usize) << 6);
        bt = nbt;
        length += bits << (8 * i);
    }

    if length == 0 || pos + length > data.len() {
        return None;
    }
    String::from_utf8(data[pos..pos + length].to_vec()).ok()
}

/// Encode the comment framing [`BrotliFile::probe`] expects.
///
/// Test support for synthesizing probe fixtures; real streams are produced
/// by Unity's build pipeline.
#[cfg(test)]
fn write_brotli_comment(comment: &str) -> Vec<u8> {
    // one length byte is enough for the fixed comment
    let len = comment.len();
    assert!(len < 64);
    let mut out = vec![0u8];
    let bt = 0b01 | ((len as u8 & 0x3F) << 2);
    let nbt = (len as u8 >> 6) & 0x3;
    out.push(bt);
    out.push(nbt);
    out.extend_from_slice(comment.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_probe_and_read() {
        let payload = b"inner container bytes".to_vec();
        let wrapped = GZipFile::write(&payload).unwrap();
        let view = MemoryView::from_vec(wrapped);
        assert!(GZipFile::probe(&view));

        let file = GZipFile::read(view, "bundle.unity3d.gz").unwrap();
        assert_eq!(file.resource().data().as_slice(), &payload[..]);
        assert_eq!(file.resource().name(), "bundle.unity3d.gz");
    }

    #[test]
    fn test_gzip_probe_rejects_plain_data() {
        let view = MemoryView::from_vec(vec![0x50, 0x4B, 0x03, 0x04]);
        assert!(!GZipFile::probe(&view));
    }

    #[test]
    fn test_brotli_comment_detection() {
        let framed = write_brotli_comment(BROTLI_SIGNATURE);
        let view = MemoryView::from_vec(framed);
        assert!(BrotliFile::probe(&view));

        let other = write_brotli_comment("some other comment padding padding");
        assert!(!BrotliFile::probe(&MemoryView::from_vec(other)));
    }

    #[test]
    fn test_brotli_probe_needs_minimum_bytes() {
        assert!(!BrotliFile::probe(&MemoryView::from_vec(vec![0, 1, 2])));
    }
}
