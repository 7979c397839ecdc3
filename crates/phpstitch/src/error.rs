//! Error taxonomy for bundling and packaging
//!
//! Every failure is terminal for the build that raised it. Variants carry the
//! offending path and, for write failures, the build stage that was active so
//! that the one-line diagnostic printed by the binary identifies where the
//! build stopped.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Stages of a single bundle build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Init,
    WritingHeader,
    /// 1-based index of the fragment being written
    WritingFragment(usize),
    WritingEntrypoint,
    /// Writing a packaged archive in one piece
    WritingArchive,
    Promoting,
    Done,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "preparing the temporary output"),
            Self::WritingHeader => write!(f, "writing the header"),
            Self::WritingFragment(index) => write!(f, "writing fragment #{index}"),
            Self::WritingEntrypoint => write!(f, "writing the entrypoint invocation"),
            Self::WritingArchive => write!(f, "writing the archive"),
            Self::Promoting => write!(f, "promoting the temporary output"),
            Self::Done => write!(f, "finishing"),
        }
    }
}

/// Errors raised while resolving, transforming, assembling or packaging files
#[derive(Debug, Error)]
pub enum BundleError {
    /// The configuration could not be loaded or resolved to a usable file list
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A fragment is not syntactically valid PHP
    #[error("parse error in {}:{line}:{column}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// A resolved path does not exist at assembly time
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// A fragment exists but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The fragment uses a construct the transformation refuses to rewrite
    #[error("unsupported construct in {}: {construct}", path.display())]
    Unsupported { path: PathBuf, construct: String },

    /// Two fragments of one run derived the same jump label
    #[error(
        "fragment label {label} derived for both {} and {}",
        first.display(),
        second.display()
    )]
    LabelCollision {
        label: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Writing the temporary output failed
    #[error("failed while {stage} for {}: {source}", path.display())]
    Write {
        stage: BuildStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The final rename onto the output path failed
    #[error("failed to move temporary output onto {}: {source}", path.display())]
    Promotion {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be assembled
    #[error("archive error: {message}")]
    Archive { message: String },

    /// The tree-sitter grammar could not be loaded
    #[error("parser setup failed: {0}")]
    ParserSetup(String),
}

impl BundleError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(path: &Path, construct: impl Into<String>) -> Self {
        Self::Unsupported {
            path: path.to_path_buf(),
            construct: construct.into(),
        }
    }

    pub(crate) fn write(stage: BuildStage, path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            stage,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T, E = BundleError> = std::result::Result<T, E>;
