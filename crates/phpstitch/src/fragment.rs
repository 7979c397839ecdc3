//! Source fragments and their jump labels

use std::{
    fmt,
    hash::Hasher,
    path::{Path, PathBuf},
};

use rustc_hash::FxHasher;

use crate::ast::Program;

/// Per-fragment jump target, `BNDL_` followed by 16 upper-case hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentLabel(String);

impl FragmentLabel {
    pub const PREFIX: &'static str = "BNDL_";

    /// Derive the label of `path`
    ///
    /// Backslashes are normalized to `/` first so the label does not depend on
    /// the host's separator.
    pub fn for_path(path: &Path) -> Self {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let mut hasher = FxHasher::default();
        hasher.write(normalized.as_bytes());
        Self(format!("{}{:016X}", Self::PREFIX, hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One input file while it moves through the pipeline
#[derive(Debug)]
pub struct SourceFragment {
    pub path: PathBuf,
    pub raw_text: Vec<u8>,
    pub tree: Option<Program>,
    /// Set once the fragment needed its top-level returns rewritten
    pub label: Option<FragmentLabel>,
    pub transformed_text: Option<Vec<u8>>,
}

impl SourceFragment {
    pub fn new(path: impl Into<PathBuf>, raw_text: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            raw_text: raw_text.into(),
            tree: None,
            label: None,
            transformed_text: None,
        }
    }
}
