//! Format detection and dispatch
//!
//! Input files carry no reliable extension, so every supported format gets
//! a cheap probe and the probes run in a fixed priority order. Serialized
//! files go first because they have no signature, only structural checks;
//! the signatured formats follow; anything unrecognized falls back to an
//! opaque resource.

use std::path::Path;

use crate::bundle::archive::ArchiveBundle;
use crate::bundle::filestream::FileStreamBundle;
use crate::bundle::rawweb::{RawWebBundle, RawWebKind};
use crate::compressed::{BrotliFile, GZipFile};
use crate::error::{FilesError, Result};
use crate::memory::MemoryView;
use crate::multifile::FileCache;
use crate::resource::ResourceFile;
use crate::serialized::SerializedFile;
use crate::webfile::WebFile;

/// The format a probe matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    Serialized,
    GZip,
    Brotli,
    Web,
    ArchiveBundle,
    WebBundle,
    RawBundle,
    FileStreamBundle,
}

/// A successfully parsed file.
#[derive(Debug)]
pub enum ParsedFile {
    Serialized(SerializedFile),
    GZip(GZipFile),
    Brotli(BrotliFile),
    Web(WebFile),
    WebBundle(RawWebBundle),
    RawBundle(RawWebBundle),
    Bundle(FileStreamBundle),
    /// Nothing matched; the raw bytes, untouched
    Resource(ResourceFile),
}

impl ParsedFile {
    /// Entries exposed by container formats; empty for leaf formats.
    pub fn entries(&self) -> &[ResourceFile] {
        match self {
            Self::Web(web) => web.entries(),
            Self::WebBundle(bundle) | Self::RawBundle(bundle) => bundle.entries(),
            Self::Bundle(bundle) => bundle.entries(),
            Self::Serialized(_) | Self::GZip(_) | Self::Brotli(_) | Self::Resource(_) => &[],
        }
    }
}

/// Identify which scheme, if any, claims the view.
///
/// Probes never move the view's position, so identification is repeatable
/// and leaves the data ready for the committed parse.
pub fn identify(view: &MemoryView) -> Option<SchemeKind> {
    if SerializedFile::probe(view) {
        Some(SchemeKind::Serialized)
    } else if GZipFile::probe(view) {
        Some(SchemeKind::GZip)
    } else if BrotliFile::probe(view) {
        Some(SchemeKind::Brotli)
    } else if WebFile::probe(view) {
        Some(SchemeKind::Web)
    } else if ArchiveBundle::probe(view) {
        Some(SchemeKind::ArchiveBundle)
    } else if RawWebBundle::probe(view, RawWebKind::Web) {
        Some(SchemeKind::WebBundle)
    } else if RawWebBundle::probe(view, RawWebKind::Raw) {
        Some(SchemeKind::RawBundle)
    } else if FileStreamBundle::probe(view) {
        Some(SchemeKind::FileStreamBundle)
    } else {
        None
    }
}

/// Whether any scheme would parse the view.
pub fn is_readable(view: &MemoryView) -> bool {
    identify(view).is_some()
}

/// Parse a view with the first scheme that claims it.
///
/// Once a probe matches, that scheme's parser runs to completion; its
/// errors propagate rather than falling through to the next scheme, and
/// carry the file's name for top-level reporting. A view no scheme claims
/// comes back as an opaque [`ResourceFile`].
pub fn read_file<S: Into<String>>(view: MemoryView, name: S) -> Result<ParsedFile> {
    let name = name.into();
    let kind = identify(&view);
    tracing::debug!(name = %name, kind = ?kind, len = view.len(), "dispatching file");
    let Some(kind) = kind else {
        return Ok(ParsedFile::Resource(ResourceFile::new(name, view)));
    };
    let parsed = match kind {
        SchemeKind::Serialized => SerializedFile::read(view).map(ParsedFile::Serialized),
        SchemeKind::GZip => GZipFile::read(view, &name).map(ParsedFile::GZip),
        SchemeKind::Brotli => BrotliFile::read(view, &name).map(ParsedFile::Brotli),
        SchemeKind::Web => WebFile::read(view).map(ParsedFile::Web),
        // recognized so the ordering stays observable; never readable
        SchemeKind::ArchiveBundle => Err(FilesError::unsupported("UnityArchive bundle")),
        SchemeKind::WebBundle => {
            RawWebBundle::read(view, RawWebKind::Web).map(ParsedFile::WebBundle)
        }
        SchemeKind::RawBundle => {
            RawWebBundle::read(view, RawWebKind::Raw).map(ParsedFile::RawBundle)
        }
        SchemeKind::FileStreamBundle => FileStreamBundle::read(view).map(ParsedFile::Bundle),
    };
    parsed.map_err(|e| e.in_file(name.as_str()))
}

/// Open a path through the cache and dispatch its contents.
///
/// Split file sets are reassembled first; single files are memory-mapped.
pub fn load_file<P: AsRef<Path>>(cache: &mut FileCache, path: P) -> Result<ParsedFile> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let view = cache
        .open(path)
        .map_err(|e| e.in_file(path.display().to_string()))?;
    read_file(view, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::filestream::FileStreamBundleWriter;
    use crate::error::FilesError;

    #[test]
    fn test_unrecognized_falls_back_to_resource() {
        let view = MemoryView::from_vec(b"just some text".to_vec());
        let parsed = read_file(view, "notes.txt").unwrap();
        match parsed {
            ParsedFile::Resource(res) => {
                assert_eq!(res.name(), "notes.txt");
                assert_eq!(res.data().as_slice(), b"just some text");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_probe_is_idempotent() {
        let writer = FileStreamBundleWriter::default();
        let bytes = writer
            .write(&[("a".to_string(), vec![1, 2, 3])])
            .unwrap();
        let view = MemoryView::from_vec(bytes);
        let first = identify(&view);
        let second = identify(&view);
        assert_eq!(first, Some(SchemeKind::FileStreamBundle));
        assert_eq!(first, second);
        assert_eq!(view.position(), 0);
    }

    #[test]
    fn test_archive_bundle_recognized_but_unreadable() {
        let mut bytes = b"UnityArchive\0".to_vec();
        bytes.extend_from_slice(&[0; 32]);
        let view = MemoryView::from_vec(bytes);
        assert_eq!(identify(&view), Some(SchemeKind::ArchiveBundle));
        match read_file(view, "level.archive") {
            Err(FilesError::InFile { file, source }) => {
                assert_eq!(file, "level.archive");
                assert!(matches!(*source, FilesError::UnsupportedFormat(_)));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_commit_error_does_not_fall_through() {
        // valid UnityFS signature with a truncated body: the bundle scheme
        // commits and its parse error propagates
        let bytes = b"UnityFS\0garbage".to_vec();
        let view = MemoryView::from_vec(bytes);
        assert_eq!(identify(&view), Some(SchemeKind::FileStreamBundle));
        assert!(read_file(view, "broken").is_err());
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let bytes = b"UnityFS\0garbage".to_vec();
        let err = read_file(MemoryView::from_vec(bytes), "broken.bundle").unwrap_err();
        assert!(matches!(err, FilesError::InFile { .. }));
        assert!(err.to_string().starts_with("broken.bundle: "));
    }
}
