//! Common bundle header prefix

use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::reader::{ByteOrder, EndianReader};

/// Bundle headers never legitimately approach this length; it bounds the
/// signature and version string scans against corrupt input.
pub const MAX_HEADER_STRING: usize = 64;

/// Bundle format version that introduced 64-bit sizes and 16-byte header
/// alignment.
pub const VERSION_LARGE_FILES_SUPPORT: u32 = 7;

/// The four known bundle signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleSignature {
    /// Modern block-compressed bundle
    UnityFs,
    /// Legacy uncompressed bundle
    UnityRaw,
    /// Legacy LZMA-compressed web bundle
    UnityWeb,
    /// Archive bundle, recognized but never readable
    UnityArchive,
}

impl BundleSignature {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnityFs => "UnityFS",
            Self::UnityRaw => "UnityRaw",
            Self::UnityWeb => "UnityWeb",
            Self::UnityArchive => "UnityArchive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UnityFS" => Some(Self::UnityFs),
            "UnityRaw" => Some(Self::UnityRaw),
            "UnityWeb" => Some(Self::UnityWeb),
            "UnityArchive" => Some(Self::UnityArchive),
            _ => None,
        }
    }
}

impl std::fmt::Display for BundleSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header fields shared by every bundle generation: signature, format
/// version and the two engine version strings. Always big-endian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHeader {
    pub signature: BundleSignature,
    pub version: u32,
    /// Minimum player version able to load the bundle, e.g. "5.x.x"
    pub unity_web_bundle_version: String,
    /// Engine revision that produced the bundle, e.g. "2020.3.0f1"
    pub unity_web_minimum_revision: String,
}

impl BundleHeader {
    /// Read the common prefix, requiring the given signature.
    pub fn read(reader: &mut EndianReader<'_>, expected: BundleSignature) -> Result<Self> {
        let signature = reader.read_cstring(MAX_HEADER_STRING)?;
        let Some(signature) = BundleSignature::parse(&signature) else {
            return Err(FilesError::invalid_signature(
                expected.as_str().to_string(),
                signature,
            ));
        };
        if signature != expected {
            return Err(FilesError::invalid_signature(
                expected.as_str().to_string(),
                signature.as_str().to_string(),
            ));
        }
        let version = reader.read_u32()?;
        let unity_web_bundle_version = reader.read_cstring(MAX_HEADER_STRING)?;
        let unity_web_minimum_revision = reader.read_cstring(MAX_HEADER_STRING)?;
        Ok(Self {
            signature,
            version,
            unity_web_bundle_version,
            unity_web_minimum_revision,
        })
    }

    /// Serialize the common prefix.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_cstring(out, self.signature.as_str());
        out.write_u32::<BigEndian>(self.version)?;
        write_cstring(out, &self.unity_web_bundle_version);
        write_cstring(out, &self.unity_web_minimum_revision);
        Ok(())
    }
}

/// Peek the signature at the view's current position without moving it.
pub fn peek_signature(view: &MemoryView) -> Option<BundleSignature> {
    let mut probe = view.clone();
    let mut reader = EndianReader::new(&mut probe, ByteOrder::Big);
    let signature = reader.read_cstring(MAX_HEADER_STRING).ok()?;
    BundleSignature::parse(&signature)
}

pub(crate) fn write_cstring(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}
