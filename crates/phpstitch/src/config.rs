//! Build configuration and source file resolution

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexSet;
use log::{debug, warn};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    bundler::BundleOptions,
    error::{BundleError, Result},
};

/// Kind of artifact a build produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum OutputFormat {
    #[default]
    #[serde(rename = "php")]
    Php,
    #[serde(rename = "phar")]
    Phar,
    #[serde(rename = "phar-gz")]
    PharGz,
    #[serde(rename = "phar-bz2")]
    PharBz2,
}

/// Per-entry compression of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        }
    }
}

impl OutputFormat {
    pub fn compression(self) -> Compression {
        match self {
            Self::Php | Self::Phar => Compression::None,
            Self::PharGz => Compression::Gzip,
            Self::PharBz2 => Compression::Bzip2,
        }
    }

    pub fn is_phar(self) -> bool {
        !matches!(self, Self::Php)
    }
}

/// Contents of `bundle.json` (or a `.toml` equivalent)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AssembleConfig {
    pub output: PathBuf,
    pub entrypoint: String,
    pub entrypoint_args: String,
    pub bundle_title: String,
    pub source_files: Vec<String>,
    pub source_files_exclude: Vec<String>,
    pub keep_namespaces: bool,
    pub shebang_line: String,
    pub strict_types: bool,
    pub output_format: OutputFormat,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        let options = BundleOptions::default();
        Self {
            output: PathBuf::from("bundle.php"),
            entrypoint: options.entrypoint,
            entrypoint_args: options.entrypoint_args,
            bundle_title: options.bundle_title,
            source_files: Vec::new(),
            source_files_exclude: Vec::new(),
            keep_namespaces: options.keep_namespaces,
            shebang_line: options.shebang_line,
            strict_types: options.strict_types,
            output_format: OutputFormat::default(),
        }
    }
}

impl AssembleConfig {
    /// Load a configuration file, TOML when it ends in `.toml`, JSON otherwise
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BundleError::configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            BundleError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            Self::from_toml_str(&text)
        } else {
            Self::from_json_str(&text)
        };
        parsed.map_err(|e| match e {
            BundleError::Configuration { message } => {
                BundleError::configuration(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| BundleError::configuration(format!("invalid JSON configuration: {e}")))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| BundleError::configuration(format!("invalid TOML configuration: {e}")))
    }

    pub fn bundle_options(&self) -> BundleOptions {
        BundleOptions {
            keep_namespaces: self.keep_namespaces,
            strict_types: self.strict_types,
            shebang_line: self.shebang_line.clone(),
            bundle_title: self.bundle_title.clone(),
            entrypoint: self.entrypoint.clone(),
            entrypoint_args: self.entrypoint_args.clone(),
        }
    }

    /// Expand `source_files` against `base_dir` and apply the exclusions
    pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedFiles> {
        let included = expand_entries(base_dir, &self.source_files)?;
        let excluded: FxHashSet<PathBuf> = expand_entries(base_dir, &self.source_files_exclude)?
            .into_iter()
            .collect();

        let files: Vec<PathBuf> = included
            .into_iter()
            .filter(|path| !excluded.contains(path))
            .collect();

        if files.is_empty() {
            return Err(BundleError::configuration(
                "no source files to bundle; check source_files and source_files_exclude",
            ));
        }

        debug!("Resolved {} source file(s)", files.len());
        Ok(ResolvedFiles {
            base_dir: base_dir.to_path_buf(),
            files,
        })
    }
}

fn is_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Absolute, deduplicated paths for `entries`, first occurrence wins
fn expand_entries(base_dir: &Path, entries: &[String]) -> Result<IndexSet<PathBuf>> {
    let mut paths = IndexSet::new();
    for entry in entries {
        if !is_pattern(entry) {
            paths.insert(base_dir.join(entry));
            continue;
        }

        let pattern = base_dir.join(entry);
        let pattern = pattern.to_string_lossy();
        let walker = glob::glob(&pattern).map_err(|e| {
            BundleError::configuration(format!("invalid source file pattern '{entry}': {e}"))
        })?;

        let mut matches = Vec::new();
        for found in walker {
            match found {
                Ok(path) if path.is_file() => matches.push(path),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable match of '{entry}': {e}"),
            }
        }
        if matches.is_empty() {
            warn!("Pattern '{entry}' did not match any files");
            continue;
        }
        matches.sort();
        paths.extend(matches);
    }
    Ok(paths)
}

/// Ordered list of absolute fragment paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFiles {
    pub base_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl ResolvedFiles {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths relative to `base_dir`, `/`-separated
    pub fn relative_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|path| self.relative_path(path))
            .collect()
    }

    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.base_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// A new list with `extra` first, followed by the current files
    pub fn merged_with_prefix(&self, extra: impl IntoIterator<Item = PathBuf>) -> Self {
        let files: IndexSet<PathBuf> = extra
            .into_iter()
            .chain(self.files.iter().cloned())
            .collect();
        Self {
            base_dir: self.base_dir.clone(),
            files: files.into_iter().collect(),
        }
    }
}
