#![allow(clippy::disallowed_methods)]

use std::{fs, io::Read};

use bzip2::read::BzDecoder;
use phpstitch::{
    BundleError, BundleMetadata, BundleOptions, Compression, PharBuilder, ResolvedFiles,
};
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

const HALT: &[u8] = b"__HALT_COMPILER(); ?>\r\n";

struct Entry {
    name: String,
    size: u32,
    compressed_size: u32,
    flags: u32,
}

struct Layout {
    file_count: u32,
    global_flags: u32,
    metadata: String,
    entries: Vec<Entry>,
    payload_start: usize,
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn parse_layout(archive: &[u8]) -> Layout {
    let halt = archive
        .windows(HALT.len())
        .position(|window| window == HALT)
        .unwrap();
    let manifest_start = halt + HALT.len();
    let manifest_len = u32_at(archive, manifest_start) as usize;
    let mut at = manifest_start + 4;

    let file_count = u32_at(archive, at);
    at += 4;
    assert_eq!(&archive[at..at + 2], &[0x11_u8, 0x10]);
    at += 2;
    let global_flags = u32_at(archive, at);
    at += 4;
    let alias_len = u32_at(archive, at) as usize;
    at += 4 + alias_len;
    let metadata_len = u32_at(archive, at) as usize;
    at += 4;
    let metadata = String::from_utf8(archive[at..at + metadata_len].to_vec()).unwrap();
    at += metadata_len;

    let mut entries = Vec::new();
    for _ in 0..file_count {
        let name_len = u32_at(archive, at) as usize;
        at += 4;
        let name = String::from_utf8(archive[at..at + name_len].to_vec()).unwrap();
        at += name_len;
        let size = u32_at(archive, at);
        let compressed_size = u32_at(archive, at + 8);
        let flags = u32_at(archive, at + 16);
        let entry_meta_len = u32_at(archive, at + 20) as usize;
        at += 24 + entry_meta_len;
        entries.push(Entry {
            name,
            size,
            compressed_size,
            flags,
        });
    }
    assert_eq!(at, manifest_start + 4 + manifest_len);

    Layout {
        file_count,
        global_flags,
        metadata,
        entries,
        payload_start: at,
    }
}

fn project() -> (TempDir, ResolvedFiles) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("vendor/composer")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("vendor/autoload.php"), "<?php\nrequire __DIR__ . '/composer/autoload_real.php';\n").unwrap();
    fs::write(root.join("vendor/composer/autoload_real.php"), "<?php\n// loader\n").unwrap();
    fs::write(root.join("src/app.php"), "<?php\nfunction main($argc, $argv) { return 0; }\n").unwrap();
    let files = ResolvedFiles {
        base_dir: root.to_path_buf(),
        files: vec![root.join("src/app.php"), root.join("src/missing.php")],
    };
    (temp_dir, files)
}

fn metadata() -> BundleMetadata {
    BundleMetadata {
        version: "1.0.0".to_owned(),
        generated: "2024-05-01 12:00:00 UTC".to_owned(),
    }
}

#[test]
fn test_uncompressed_archive_layout() {
    let (temp_dir, files) = project();
    let output = temp_dir.path().join("app.phar");
    let options = BundleOptions {
        entrypoint: "main".to_owned(),
        ..BundleOptions::default()
    };

    let summary = PharBuilder::new(options, Compression::None)
        .build(&files, &metadata(), &output)
        .unwrap();
    assert_eq!(summary.file_count, 3);

    let archive = fs::read(&output).unwrap();
    assert_eq!(summary.bytes, archive.len() as u64);
    assert!(archive.starts_with(b"<?php\ndeclare(strict_types=1);\n"));

    let layout = parse_layout(&archive);
    assert_eq!(layout.file_count, 3);
    assert_eq!(layout.global_flags, 0x0001_0000);
    let names: Vec<&str> = layout.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "vendor/autoload.php",
            "vendor/composer/autoload_real.php",
            "src/app.php"
        ]
    );
    assert!(layout.entries.iter().all(|e| e.size == e.compressed_size));
    assert!(layout.entries.iter().all(|e| e.flags == 0o644));
    assert!(layout.metadata.contains("s:5:\"files\";i:3;"));
    assert!(layout.metadata.contains("s:10:\"entrypoint\";s:4:\"main\";"));
    assert!(layout.metadata.contains("s:11:\"compression\";s:4:\"none\";"));

    let first = &layout.entries[0];
    let payload = &archive[layout.payload_start..layout.payload_start + first.size as usize];
    assert_eq!(payload, fs::read(temp_dir.path().join("vendor/autoload.php")).unwrap());

    let (signed, trailer) = archive.split_at(archive.len() - 40);
    assert_eq!(&trailer[..32], Sha256::digest(signed).as_slice());
    assert_eq!(u32_at(trailer, 32), 3);
    assert_eq!(&trailer[36..], b"GBMB");
}

#[test]
fn test_bzip2_archive_entries_decompress() {
    let (temp_dir, files) = project();
    let output = temp_dir.path().join("app.phar.bz2");
    PharBuilder::new(BundleOptions::default(), Compression::Bzip2)
        .build(&files, &metadata(), &output)
        .unwrap();

    let archive = fs::read(&output).unwrap();
    let layout = parse_layout(&archive);
    assert_eq!(layout.global_flags, 0x0001_0000 | 0x2000);

    let mut offset = layout.payload_start;
    for entry in &layout.entries {
        assert_eq!(entry.flags, 0o644 | 0x2000);
        let data = &archive[offset..offset + entry.compressed_size as usize];
        let mut inflated = Vec::new();
        BzDecoder::new(data).read_to_end(&mut inflated).unwrap();
        assert_eq!(inflated.len(), entry.size as usize);
        offset += entry.compressed_size as usize;
    }
}

#[test]
fn test_missing_output_directory_is_rejected() {
    let (temp_dir, files) = project();
    let output = temp_dir.path().join("dist/app.phar");
    let err = PharBuilder::new(BundleOptions::default(), Compression::None)
        .build(&files, &metadata(), &output)
        .unwrap_err();
    assert!(matches!(err, BundleError::Configuration { .. }), "got {err:?}");
}

#[test]
fn test_no_files_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let files = ResolvedFiles {
        base_dir: temp_dir.path().to_path_buf(),
        files: vec![temp_dir.path().join("absent.php")],
    };
    let output = temp_dir.path().join("app.phar");
    let err = PharBuilder::new(BundleOptions::default(), Compression::None)
        .build(&files, &metadata(), &output)
        .unwrap_err();
    assert!(matches!(err, BundleError::Archive { .. }));
    assert!(!output.exists());
}
