//! Removes `include`/`require` statements
//!
//! The configured file list is the complete dependency closure, so every
//! inclusion statement is dropped wherever a statement list can hold one.
//! That covers the parenthesized and `@`-silenced forms of the statement.
//! Inclusions used as values (`$cfg = require 'x.php';`) are left alone.

use crate::ast::{BlockPart, Program, Stmt};

#[derive(Debug, Default)]
pub struct InclusionStripper {
    removed: usize,
}

impl InclusionStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip the program, returning the number of removed statements
    pub fn transform_program(&mut self, program: &mut Program) -> usize {
        self.process_body(&mut program.stmts);
        self.removed
    }

    fn process_body(&mut self, stmts: &mut Vec<Stmt>) {
        let before = stmts.len();
        stmts.retain(|stmt| !matches!(stmt, Stmt::Include(_)));
        self.removed += before - stmts.len();

        for stmt in stmts.iter_mut() {
            match stmt {
                Stmt::Namespace(namespace) => self.process_body(&mut namespace.body),
                Stmt::Block(block) => {
                    for part in &mut block.parts {
                        if let BlockPart::Body(body) = part {
                            self.process_body(&mut body.stmts);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}
