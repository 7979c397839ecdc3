//! Bundle assembly
//!
//! The bundler writes a header, one section per fragment in the order given
//! and an optional entrypoint call into a temporary file, then promotes it
//! onto the output path. Any failure discards the temporary file.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::{
    atomic::AtomicOutput,
    config::ResolvedFiles,
    error::{BuildStage, BundleError, Result},
    fragment::FragmentLabel,
    pipeline::FragmentPipeline,
};

/// Width of the `=` rule between sections
const SEPARATOR_WIDTH: usize = 77;

/// Options that shape the generated bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Keep `namespace` wrappers and `use` imports instead of flattening
    pub keep_namespaces: bool,
    /// Emit `declare(strict_types=1);` once in the header
    pub strict_types: bool,
    /// First line of the output, e.g. `#!/usr/bin/env php`; empty for none
    pub shebang_line: String,
    pub bundle_title: String,
    /// Function called at the end of the bundle; empty for none
    pub entrypoint: String,
    pub entrypoint_args: String,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            keep_namespaces: true,
            strict_types: true,
            shebang_line: String::new(),
            bundle_title: "Bundle Version".to_owned(),
            entrypoint: String::new(),
            entrypoint_args: "$argc, $argv".to_owned(),
        }
    }
}

impl BundleOptions {
    /// Whether fragment pragmas are dropped without a replacement in the header
    pub fn strip_strict_pragma(&self) -> bool {
        !self.strict_types
    }

    pub fn has_shebang(&self) -> bool {
        !self.shebang_line.is_empty()
    }

    /// The title, safe for use inside a doc comment
    pub(crate) fn comment_title(&self) -> String {
        self.bundle_title.replace("*/", "* /")
    }
}

/// Version and build time shown in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    pub version: String,
    pub generated: String,
}

impl BundleMetadata {
    /// Metadata stamped with the current local time
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            generated: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    pub output: PathBuf,
    pub bytes: u64,
    pub file_count: usize,
}

pub(crate) fn separator() -> String {
    format!("// {}\n", "=".repeat(SEPARATOR_WIDTH))
}

#[derive(Debug, Clone)]
pub struct Bundler {
    options: BundleOptions,
}

impl Bundler {
    pub fn new(options: BundleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// Build the bundle for `files` at `output`
    pub fn build(
        &self,
        files: &ResolvedFiles,
        metadata: &BundleMetadata,
        output: &Path,
    ) -> Result<BundleSummary> {
        self.build_with_writer(files, metadata, output, BufWriter::new)
    }

    /// [`Bundler::build`], streaming through the writer `wrap` builds around
    /// a handle of the temporary file
    pub fn build_with_writer<W, F>(
        &self,
        files: &ResolvedFiles,
        metadata: &BundleMetadata,
        output: &Path,
        wrap: F,
    ) -> Result<BundleSummary>
    where
        W: Write,
        F: FnOnce(File) -> W,
    {
        info!("Building bundle script: {}", output.display());
        debug!("Bundle stage: {}", BuildStage::Init);
        let mut out = AtomicOutput::create(output)?;

        let written = match out.file().try_clone() {
            Ok(handle) => {
                let mut writer = wrap(handle);
                self.write_bundle(&mut writer, files, metadata, output)
            }
            Err(e) => Err(BundleError::write(BuildStage::Init, output, e)),
        };

        let file_count = match written {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    "Discarding temporary output {}",
                    out.temp_path().display()
                );
                out.discard();
                return Err(err);
            }
        };

        debug!("Bundle stage: {}", BuildStage::Promoting);
        let path = out.commit(self.options.has_shebang())?;
        let bytes = fs::metadata(&path).map(|meta| meta.len()).map_err(|e| {
            BundleError::write(BuildStage::Done, &path, e)
        })?;
        debug!("Bundle stage: {}", BuildStage::Done);

        Ok(BundleSummary {
            output: path,
            bytes,
            file_count,
        })
    }

    /// Stream the complete bundle into `writer`, returning the fragment count
    ///
    /// `output` only names the destination in errors.
    pub fn write_bundle<W: Write>(
        &self,
        writer: &mut W,
        files: &ResolvedFiles,
        metadata: &BundleMetadata,
        output: &Path,
    ) -> Result<usize> {
        let relative = files.relative_paths();

        let mut stage = BuildStage::WritingHeader;
        debug!("Bundle stage: {stage}");
        writer
            .write_all(self.header(metadata, &relative).as_bytes())
            .map_err(|e| BundleError::write(stage, output, e))?;

        let mut pipeline = FragmentPipeline::new(&self.options)?;
        let mut labels: FxHashMap<FragmentLabel, PathBuf> = FxHashMap::default();

        for (index, (path, relative_path)) in files.files.iter().zip(&relative).enumerate() {
            stage = BuildStage::WritingFragment(index + 1);
            debug!("Bundle stage: {stage}");

            if !path.exists() {
                return Err(BundleError::FileNotFound { path: path.clone() });
            }
            info!("Adding: {relative_path}");

            let mut fragment = pipeline.load(path)?;
            pipeline.process(&mut fragment)?;

            if let Some(label) = fragment.label.take() {
                if let Some(first) = labels.get(&label) {
                    return Err(BundleError::LabelCollision {
                        label: label.to_string(),
                        first: first.clone(),
                        second: path.clone(),
                    });
                }
                labels.insert(label, path.clone());
            }

            let text = fragment.transformed_text.unwrap_or_default();
            write_section(writer, relative_path, &text)
                .map_err(|e| BundleError::write(stage, output, e))?;
        }

        if !self.options.entrypoint.is_empty() {
            stage = BuildStage::WritingEntrypoint;
            debug!("Bundle stage: {stage}");
            writer
                .write_all(self.entrypoint_block().as_bytes())
                .map_err(|e| BundleError::write(stage, output, e))?;
        }

        writer
            .flush()
            .map_err(|e| BundleError::write(stage, output, e))?;
        Ok(files.files.len())
    }

    fn header(&self, metadata: &BundleMetadata, relative: &[String]) -> String {
        let mut header = String::new();
        if self.options.has_shebang() {
            header.push_str(&self.options.shebang_line);
            header.push('\n');
        }
        header.push_str("<?php\n\n");
        if !self.options.strip_strict_pragma() {
            header.push_str("declare(strict_types=1);\n\n");
        }
        header.push_str("/**\n");
        header.push_str(&format!(" * {}\n", self.options.comment_title()));
        header.push_str(" * \n");
        header.push_str(&format!(" * Generated: {}\n", metadata.generated));
        header.push_str(&format!(" * Version: {}\n", metadata.version));
        header.push_str(" * \n");
        header.push_str(" * Bundled files:\n");
        for path in relative {
            header.push_str(&format!(" *   - {path}\n"));
        }
        header.push_str(" */\n\n");
        header
    }

    fn entrypoint_block(&self) -> String {
        format!(
            "{sep}// Script Execution\n{sep}{}({});\n",
            self.options.entrypoint,
            self.options.entrypoint_args,
            sep = separator()
        )
    }
}

fn write_section<W: Write>(
    writer: &mut W,
    relative_path: &str,
    text: &[u8],
) -> std::io::Result<()> {
    let sep = separator();
    writer.write_all(format!("{sep}// {relative_path}\n{sep}").as_bytes())?;
    writer.write_all(text)?;
    writer.write_all(b"\n\n")
}
