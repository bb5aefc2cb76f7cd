//! Writer to dispatcher round trips for the container formats

use std::fs;

use unity_asset_files::{
    CompressionType, FileCache, FileStreamBundleWriter, GZipFile, MemoryView, ParsedFile,
    SchemeKind, WebFile, identify, load_file, read_file,
};

fn sample_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("CAB-deadbeef".to_string(), (0u8..=255).cycle().take(700).collect()),
        ("CAB-deadbeef.resS".to_string(), vec![0x5A; 123]),
    ]
}

fn assert_entries_match(entries: &[unity_asset_files::ResourceFile], files: &[(String, Vec<u8>)]) {
    assert_eq!(entries.len(), files.len());
    for (entry, (name, data)) in entries.iter().zip(files) {
        assert_eq!(entry.name(), name);
        assert_eq!(entry.data().as_slice(), &data[..]);
    }
}

#[test]
fn bundle_round_trip_uncompressed() {
    let files = sample_files();
    let bytes = FileStreamBundleWriter::default().write(&files).unwrap();

    let parsed = read_file(MemoryView::from_vec(bytes), "game.unity3d").unwrap();
    let ParsedFile::Bundle(bundle) = parsed else {
        panic!("expected a bundle");
    };
    assert_entries_match(bundle.entries(), &files);
}

#[test]
fn bundle_round_trip_lz4() {
    let files = sample_files();
    let writer = FileStreamBundleWriter {
        compression: CompressionType::Lz4,
        ..Default::default()
    };
    let bytes = writer.write(&files).unwrap();

    let parsed = read_file(MemoryView::from_vec(bytes), "game.unity3d").unwrap();
    let ParsedFile::Bundle(bundle) = parsed else {
        panic!("expected a bundle");
    };
    assert_eq!(bundle.compression().unwrap(), CompressionType::Lz4);
    assert_entries_match(bundle.entries(), &files);
}

#[test]
fn web_container_round_trip() {
    let files = sample_files();
    let bytes = WebFile::write(&files).unwrap();

    let parsed = read_file(MemoryView::from_vec(bytes), "data.unitywebdata").unwrap();
    let ParsedFile::Web(web) = parsed else {
        panic!("expected a web container");
    };
    assert_entries_match(web.entries(), &files);
}

#[test]
fn gzip_wrapped_container_unwraps_recursively() {
    let files = sample_files();
    let inner = WebFile::write(&files).unwrap();
    let wrapped = GZipFile::write(&inner).unwrap();

    let parsed = read_file(MemoryView::from_vec(wrapped), "data.unity3d.gz").unwrap();
    let ParsedFile::GZip(gz) = parsed else {
        panic!("expected a gzip wrapper");
    };
    assert_eq!(gz.resource().data().as_slice(), &inner[..]);

    // the unwrapped payload dispatches again as a web container
    let ParsedFile::Web(web) = gz.resource().parse().unwrap() else {
        panic!("expected the inner web container");
    };
    assert_entries_match(web.entries(), &files);
}

#[test]
fn probes_are_stable_across_formats() {
    let files = sample_files();
    let cases = [
        (
            FileStreamBundleWriter::default().write(&files).unwrap(),
            SchemeKind::FileStreamBundle,
        ),
        (WebFile::write(&files).unwrap(), SchemeKind::Web),
        (
            GZipFile::write(b"anything").unwrap(),
            SchemeKind::GZip,
        ),
    ];
    for (bytes, expected) in cases {
        let view = MemoryView::from_vec(bytes);
        assert_eq!(identify(&view), Some(expected));
        assert_eq!(identify(&view), Some(expected));
        assert_eq!(view.position(), 0);
    }
}

#[test]
fn split_bundle_loads_through_cache() {
    let files = sample_files();
    let bytes = FileStreamBundleWriter::default().write(&files).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("game.unity3d");
    let mid = bytes.len() / 2;
    fs::write(dir.path().join("game.unity3d.split0"), &bytes[..mid]).unwrap();
    fs::write(dir.path().join("game.unity3d.split1"), &bytes[mid..]).unwrap();

    let mut cache = FileCache::new();
    let parsed = load_file(&mut cache, &base).unwrap();
    let ParsedFile::Bundle(bundle) = parsed else {
        panic!("expected a bundle");
    };
    assert_entries_match(bundle.entries(), &files);
}

#[test]
fn split_parts_ordered_numerically_not_lexically() {
    // eleven single-byte parts; lexical order would put split10 after
    // split1 and corrupt the sequence
    let dir = tempfile::tempdir().unwrap();
    for i in 0..11u8 {
        fs::write(dir.path().join(format!("seq.bin.split{i}")), [i]).unwrap();
    }

    let mut cache = FileCache::new();
    let view = cache.open(dir.path().join("seq.bin")).unwrap();
    assert_eq!(view.as_slice(), &(0u8..11).collect::<Vec<_>>()[..]);
}

#[test]
fn cache_reuses_mappings_and_loads_plain_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loose.resS");
    fs::write(&path, [1, 2, 3, 4]).unwrap();

    let mut cache = FileCache::new();
    let parsed = load_file(&mut cache, &path).unwrap();
    let ParsedFile::Resource(res) = parsed else {
        panic!("expected an opaque resource");
    };
    assert_eq!(res.name(), "loose.resS");
    assert_eq!(res.data().as_slice(), &[1, 2, 3, 4]);
    assert_eq!(cache.len(), 1);

    // a second load reuses the cached mapping
    let again = load_file(&mut cache, &path).unwrap();
    assert!(matches!(again, ParsedFile::Resource(_)));
    assert_eq!(cache.len(), 1);
}
