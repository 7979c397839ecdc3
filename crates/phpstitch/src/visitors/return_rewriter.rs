//! Rewrites top-level `return` statements into jumps
//!
//! A `return` at the outermost scope of an included file ends that file only.
//! Once the file is merged into a bundle the same statement would end the
//! whole script, so each reachable one becomes `goto <label>;` and the label
//! is placed after the fragment's last statement.

use std::path::Path;

use crate::{
    ast::{BodyRole, Program, Stmt},
    error::{BundleError, Result},
    fragment::FragmentLabel,
};

#[derive(Debug)]
pub struct ReturnRewriter<'a> {
    path: &'a Path,
    label: &'a FragmentLabel,
    rewritten: usize,
}

impl<'a> ReturnRewriter<'a> {
    pub fn new(path: &'a Path, label: &'a FragmentLabel) -> Self {
        Self {
            path,
            label,
            rewritten: 0,
        }
    }

    /// Rewrite every reachable return and append the label
    ///
    /// Fails when a return sits inside a `try`/`catch` guarded by `finally` or
    /// inside `finally` itself, and when fewer returns were reachable than the
    /// concrete tree holds at the outermost scope.
    pub fn transform_program(mut self, program: &mut Program) -> Result<usize> {
        self.process_body(&mut program.stmts, false)?;

        if self.rewritten != program.top_level_returns {
            return Err(BundleError::unsupported(
                self.path,
                format!(
                    "top-level return in a position that cannot be rewritten ({} of {} reachable)",
                    self.rewritten, program.top_level_returns
                ),
            ));
        }

        let label = Stmt::Label(self.label.to_string());
        match program.stmts.last_mut() {
            Some(Stmt::Namespace(namespace)) if namespace.braced => namespace.body.push(label),
            _ => program.stmts.push(label),
        }

        log::debug!(
            "Rewrote {} top-level return(s) in {} to jump to {}",
            self.rewritten,
            self.path.display(),
            self.label
        );
        Ok(self.rewritten)
    }

    fn process_body(&mut self, stmts: &mut [Stmt], in_cleanup: bool) -> Result<()> {
        for stmt in stmts.iter_mut() {
            match stmt {
                Stmt::Return(_) => {
                    if in_cleanup {
                        return Err(BundleError::unsupported(
                            self.path,
                            "top-level return that unwinds through a finally block",
                        ));
                    }
                    *stmt = Stmt::Goto(self.label.to_string());
                    self.rewritten += 1;
                }
                Stmt::Namespace(namespace) => self.process_body(&mut namespace.body, in_cleanup)?,
                Stmt::Block(block) => {
                    for body in block.bodies_mut() {
                        let cleanup = in_cleanup || body.role != BodyRole::Plain;
                        self.process_body(&mut body.stmts, cleanup)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
