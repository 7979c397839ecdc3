//! Merge a list of PHP source files into one self-contained script
//!
//! Each file is parsed, stripped of the declarations and inclusions that
//! cannot survive concatenation, has its top-level `return` statements turned
//! into jumps, and is printed back into a single bundle. A sibling packager
//! produces `.phar` archives from the same file list.

pub mod ast;
pub mod atomic;
pub mod bundler;
pub mod config;
pub mod emitter;
pub mod error;
pub mod fragment;
pub mod parser;
pub mod phar;
pub mod pipeline;
pub mod version;
pub mod visitors;

pub use bundler::{BundleMetadata, BundleOptions, BundleSummary, Bundler};
pub use config::{AssembleConfig, Compression, OutputFormat, ResolvedFiles};
pub use error::{BuildStage, BundleError, Result};
pub use fragment::{FragmentLabel, SourceFragment};
pub use phar::{PharBuilder, PharSummary};
pub use pipeline::FragmentPipeline;
