//! Self-extracting `.phar` archive packaging
//!
//! Files are stored unchanged (optionally compressed) behind a stub that maps
//! the archive and loads Composer's autoloader. The archive layout follows the
//! phar file format: stub, manifest, file contents and a SHA-256 signature.

mod metadata;

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use flate2::{Compression as Level, Crc, write::DeflateEncoder};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

pub use self::metadata::{PhpValue, serialize_array};
use crate::{
    atomic::AtomicOutput,
    bundler::{BundleMetadata, BundleOptions},
    config::{Compression, ResolvedFiles},
    error::{BuildStage, BundleError, Result},
};

/// Manifest API version 1.1.1
const API_VERSION: [u8; 2] = [0x11, 0x10];
const GLOBAL_HAS_SIGNATURE: u32 = 0x0001_0000;
const ENTRY_COMPRESSED_GZ: u32 = 0x0000_1000;
const ENTRY_COMPRESSED_BZ2: u32 = 0x0000_2000;
const ENTRY_PERMISSIONS: u32 = 0o644;
const SIGNATURE_SHA256: u32 = 0x0003;
const SIGNATURE_MAGIC: &[u8; 4] = b"GBMB";
const HALT: &str = "__HALT_COMPILER(); ?>\r\n";
const TOOL_NAME: &str = "phpstitch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PharSummary {
    pub output: PathBuf,
    pub bytes: u64,
    pub file_count: usize,
    pub compression: Compression,
}

struct PharEntry {
    name: String,
    contents: Vec<u8>,
    mtime: u32,
}

#[derive(Debug, Clone)]
pub struct PharBuilder {
    options: BundleOptions,
    compression: Compression,
}

impl PharBuilder {
    pub fn new(options: BundleOptions, compression: Compression) -> Self {
        Self {
            options,
            compression,
        }
    }

    pub fn build(
        &self,
        files: &ResolvedFiles,
        metadata: &BundleMetadata,
        output: &Path,
    ) -> Result<PharSummary> {
        info!("Building Phar archive: {}", output.display());

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !dir.is_dir() {
            return Err(BundleError::configuration(format!(
                "can't find output directory: {}",
                dir.display()
            )));
        }

        let files = with_vendor_files(files);
        let entries = collect_entries(&files)?;
        if entries.is_empty() {
            return Err(BundleError::Archive {
                message: "no files were added to the archive".to_owned(),
            });
        }

        let archive = self.encode(&entries, metadata)?;
        let mut out = AtomicOutput::create(output)?;
        if let Err(e) = out.file().write_all(&archive) {
            out.discard();
            return Err(BundleError::write(BuildStage::WritingArchive, output, e));
        }
        let path = out.commit(self.options.has_shebang())?;

        Ok(PharSummary {
            output: path,
            bytes: archive.len() as u64,
            file_count: entries.len(),
            compression: self.compression,
        })
    }

    fn stub(&self, metadata: &BundleMetadata) -> String {
        let mut stub = String::new();
        if self.options.has_shebang() {
            stub.push_str(&self.options.shebang_line);
            stub.push('\n');
        }
        stub.push_str("<?php\n");
        if self.options.strict_types {
            stub.push_str("declare(strict_types=1);\n");
        }
        stub.push_str("\n/**\n");
        stub.push_str(&format!(" * {}\n", self.options.comment_title()));
        stub.push_str(" * \n");
        stub.push_str(&format!(" * Generated: {}\n", metadata.generated));
        stub.push_str(&format!(" * Version: {}\n", metadata.version));
        stub.push_str(" */\n\n");
        stub.push_str("Phar::mapPhar();\n\n");
        stub.push_str("require_once 'phar://' . __FILE__ . '/vendor/autoload.php';\n\n");
        if !self.options.entrypoint.is_empty() {
            stub.push_str(&format!(
                "exit({}({}));\n",
                self.options.entrypoint, self.options.entrypoint_args
            ));
        }
        stub.push('\n');
        stub.push_str(HALT);
        stub
    }

    fn archive_metadata(&self, metadata: &BundleMetadata, file_count: usize) -> String {
        serialize_array(&[
            ("title", self.options.bundle_title.as_str().into()),
            ("generated", metadata.generated.as_str().into()),
            ("version", metadata.version.as_str().into()),
            ("files", file_count.into()),
            ("entrypoint", self.options.entrypoint.as_str().into()),
            ("compression", self.compression.as_str().into()),
            ("tool", TOOL_NAME.into()),
        ])
    }

    /// Compressed contents and the entry's compression flag
    fn compress(&self, entry: &PharEntry) -> (Vec<u8>, u32) {
        let compressed = match self.compression {
            Compression::None => return (entry.contents.clone(), 0),
            Compression::Gzip => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Level::default());
                encoder
                    .write_all(&entry.contents)
                    .and_then(|()| encoder.finish())
                    .map(|data| (data, ENTRY_COMPRESSED_GZ))
            }
            Compression::Bzip2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
                encoder
                    .write_all(&entry.contents)
                    .and_then(|()| encoder.finish())
                    .map(|data| (data, ENTRY_COMPRESSED_BZ2))
            }
        };
        match compressed {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "{} compression of {} failed, storing it uncompressed: {e}",
                    self.compression.as_str(),
                    entry.name
                );
                (entry.contents.clone(), 0)
            }
        }
    }

    fn encode(&self, entries: &[PharEntry], metadata: &BundleMetadata) -> Result<Vec<u8>> {
        let archive_meta = self.archive_metadata(metadata, entries.len());

        let mut table = Vec::new();
        let mut payload = Vec::new();
        let mut global_flags = GLOBAL_HAS_SIGNATURE;
        for entry in entries {
            let (data, compression_flag) = self.compress(entry);
            global_flags |= compression_flag;

            let mut crc = Crc::new();
            crc.update(&entry.contents);

            table.extend(le_u32(entry.name.len())?);
            table.extend(entry.name.as_bytes());
            table.extend(le_u32(entry.contents.len())?);
            table.extend(entry.mtime.to_le_bytes());
            table.extend(le_u32(data.len())?);
            table.extend(crc.sum().to_le_bytes());
            table.extend((ENTRY_PERMISSIONS | compression_flag).to_le_bytes());
            table.extend(0u32.to_le_bytes());
            payload.extend(data);
        }

        let mut manifest = Vec::new();
        manifest.extend(le_u32(entries.len())?);
        manifest.extend(API_VERSION);
        manifest.extend(global_flags.to_le_bytes());
        // no alias
        manifest.extend(0u32.to_le_bytes());
        manifest.extend(le_u32(archive_meta.len())?);
        manifest.extend(archive_meta.as_bytes());
        manifest.extend(table);

        let mut archive = self.stub(metadata).into_bytes();
        archive.extend(le_u32(manifest.len())?);
        archive.extend(manifest);
        archive.extend(payload);

        let digest = Sha256::digest(&archive);
        archive.extend(digest.as_slice());
        archive.extend(SIGNATURE_SHA256.to_le_bytes());
        archive.extend(SIGNATURE_MAGIC);

        debug!("Encoded archive of {} bytes", archive.len());
        Ok(archive)
    }
}

fn le_u32(value: usize) -> Result<[u8; 4]> {
    u32::try_from(value)
        .map(u32::to_le_bytes)
        .map_err(|_| BundleError::Archive {
            message: format!("value {value} does not fit the archive format"),
        })
}

/// Prepend every file below `base_dir/vendor`, sorted by path
fn with_vendor_files(files: &ResolvedFiles) -> ResolvedFiles {
    let vendor = files.base_dir.join("vendor");
    if !vendor.is_dir() {
        return files.clone();
    }
    let vendor_files: Vec<PathBuf> = WalkDir::new(&vendor)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable vendor entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();
    debug!("Adding {} vendor file(s)", vendor_files.len());
    files.merged_with_prefix(vendor_files)
}

fn collect_entries(files: &ResolvedFiles) -> Result<Vec<PharEntry>> {
    let mut entries = Vec::with_capacity(files.len());
    for path in &files.files {
        if !path.is_file() {
            warn!("File not found: {}", path.display());
            continue;
        }
        let name = files.relative_path(path);
        info!("Adding: {name}");

        let contents = fs::read(path).map_err(|source| BundleError::Read {
            path: path.clone(),
            source,
        })?;
        let mtime = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .and_then(|age| u32::try_from(age.as_secs()).ok())
            .unwrap_or(0);
        entries.push(PharEntry {
            name,
            contents,
            mtime,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::DeflateDecoder;
    use pretty_assertions::assert_eq;

    use super::*;

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().expect("4 bytes"))
    }

    fn metadata() -> BundleMetadata {
        BundleMetadata {
            version: "0.1.0".to_owned(),
            generated: "2024-01-01 00:00:00 UTC".to_owned(),
        }
    }

    fn entry(name: &str, contents: &str) -> PharEntry {
        PharEntry {
            name: name.to_owned(),
            contents: contents.as_bytes().to_vec(),
            mtime: 1_700_000_000,
        }
    }

    #[test]
    fn test_stub_ends_with_halt_compiler() {
        let builder = PharBuilder::new(
            BundleOptions {
                entrypoint: "main".to_owned(),
                ..BundleOptions::default()
            },
            Compression::None,
        );
        let stub = builder.stub(&metadata());
        assert!(stub.starts_with("<?php\ndeclare(strict_types=1);\n"));
        assert!(stub.contains("Phar::mapPhar();\n"));
        assert!(stub.contains("exit(main($argc, $argv));\n"));
        assert!(stub.ends_with("__HALT_COMPILER(); ?>\r\n"));
    }

    #[test]
    fn test_manifest_layout_and_signature() {
        let builder = PharBuilder::new(BundleOptions::default(), Compression::None);
        let archive = builder
            .encode(&[entry("src/a.php", "<?php echo 1;")], &metadata())
            .expect("encode");

        let stub_len = builder.stub(&metadata()).len();
        let manifest_len = read_u32(&archive, stub_len) as usize;
        let manifest = stub_len + 4;
        assert_eq!(read_u32(&archive, manifest), 1);
        assert_eq!(&archive[manifest + 4..manifest + 6], &API_VERSION);
        assert_eq!(read_u32(&archive, manifest + 6), GLOBAL_HAS_SIGNATURE);
        assert_eq!(read_u32(&archive, manifest + 10), 0);

        let meta_len = read_u32(&archive, manifest + 14) as usize;
        let meta = std::str::from_utf8(&archive[manifest + 18..manifest + 18 + meta_len])
            .expect("utf8 metadata");
        assert!(meta.starts_with("a:7:{s:5:\"title\";s:14:\"Bundle Version\";"));
        assert!(meta.ends_with("s:4:\"tool\";s:9:\"phpstitch\";}"));

        let payload = manifest + manifest_len;
        assert_eq!(&archive[payload..payload + 13], b"<?php echo 1;");

        let (signed, trailer) = archive.split_at(archive.len() - 40);
        assert_eq!(&trailer[..32], Sha256::digest(signed).as_slice());
        assert_eq!(read_u32(trailer, 32), SIGNATURE_SHA256);
        assert_eq!(&trailer[36..], b"GBMB");
    }

    #[test]
    fn test_gzip_entries_are_raw_deflate() {
        let builder = PharBuilder::new(BundleOptions::default(), Compression::Gzip);
        let original = "<?php\n".repeat(50);
        let (data, flag) = builder.compress(&entry("big.php", &original));
        assert_eq!(flag, ENTRY_COMPRESSED_GZ);
        assert!(data.len() < original.len());

        let mut inflated = String::new();
        DeflateDecoder::new(data.as_slice())
            .read_to_string(&mut inflated)
            .expect("inflate");
        assert_eq!(inflated, original);
    }

    #[test]
    fn test_bzip2_entries_are_flagged() {
        let builder = PharBuilder::new(BundleOptions::default(), Compression::Bzip2);
        let (data, flag) = builder.compress(&entry("a.php", "<?php echo 'bz';"));
        assert_eq!(flag, ENTRY_COMPRESSED_BZ2);
        assert!(data.starts_with(b"BZh"));
    }

    #[test]
    fn test_vendor_files_come_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("vendor/composer")).expect("mkdir");
        fs::write(dir.path().join("vendor/autoload.php"), "<?php\n").expect("write");
        fs::write(dir.path().join("vendor/composer/a.php"), "<?php\n").expect("write");
        fs::write(dir.path().join("main.php"), "<?php\n").expect("write");

        let files = ResolvedFiles {
            base_dir: dir.path().to_path_buf(),
            files: vec![dir.path().join("main.php")],
        };
        let merged = with_vendor_files(&files);
        assert_eq!(
            merged.relative_paths(),
            vec!["vendor/autoload.php", "vendor/composer/a.php", "main.php"]
        );
    }
}
