//! Per-fragment transformation pipeline
//!
//! parse → declaration filter → inclusion stripper → return rewriter → emit

use std::{fs, path::Path};

use log::debug;

use crate::{
    bundler::BundleOptions,
    emitter::emit_program,
    error::{BundleError, Result},
    fragment::{FragmentLabel, SourceFragment},
    parser::FragmentParser,
    visitors::{DeclarationFilter, InclusionStripper, ReturnRewriter},
};

#[derive(Debug)]
pub struct FragmentPipeline {
    parser: FragmentParser,
    keep_namespaces: bool,
}

impl FragmentPipeline {
    pub fn new(options: &BundleOptions) -> Result<Self> {
        Ok(Self {
            parser: FragmentParser::new()?,
            keep_namespaces: options.keep_namespaces,
        })
    }

    /// Read `path` into a fresh fragment, bytes as they are on disk
    pub fn load(&self, path: &Path) -> Result<SourceFragment> {
        let raw_text = fs::read(path).map_err(|source| BundleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(SourceFragment::new(path, raw_text))
    }

    /// Run every pass over `fragment`, filling its tree, label and text
    pub fn process(&mut self, fragment: &mut SourceFragment) -> Result<()> {
        let mut program = self.parser.parse(&fragment.path, &fragment.raw_text)?;

        DeclarationFilter::new(self.keep_namespaces).transform_program(&mut program);

        let removed = InclusionStripper::new().transform_program(&mut program);
        if removed > 0 {
            debug!(
                "Removed {removed} inclusion statement(s) from {}",
                fragment.path.display()
            );
        }

        if program.top_level_returns > 0 {
            let label = FragmentLabel::for_path(&fragment.path);
            ReturnRewriter::new(&fragment.path, &label).transform_program(&mut program)?;
            fragment.label = Some(label);
        }

        fragment.transformed_text = Some(emit_program(&program));
        fragment.tree = Some(program);
        Ok(())
    }

    /// Transform source text without touching the filesystem
    pub fn transform_source(&mut self, path: &Path, source: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let mut fragment = SourceFragment::new(path, source.as_ref());
        self.process(&mut fragment)?;
        Ok(fragment.transformed_text.unwrap_or_default())
    }
}
