//! Filters file-scope declarations that cannot be repeated in a bundle
//!
//! `declare(strict_types=1)` must be the first statement of a file, so every
//! fragment pragma is dropped and the bundle header emits the directive once.
//! Namespace wrappers and imports are kept or flattened depending on the
//! `keep_namespaces` option.

use crate::ast::{Program, Stmt};

#[derive(Debug, Clone, Copy)]
pub struct DeclarationFilter {
    keep_namespaces: bool,
}

impl DeclarationFilter {
    pub fn new(keep_namespaces: bool) -> Self {
        Self { keep_namespaces }
    }

    pub fn transform_program(&self, program: &mut Program) {
        let stmts = std::mem::take(&mut program.stmts);
        program.stmts = self.process_top_level(stmts);
    }

    fn process_top_level(&self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut kept = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::Pragma(_) => {
                    log::debug!("Dropping file-scope declare directive");
                }
                Stmt::Use(_) if !self.keep_namespaces => {
                    log::debug!("Dropping import outside of a namespace");
                }
                Stmt::Namespace(mut namespace) => {
                    namespace.body.retain(|child| !child.is_pragma());
                    if self.keep_namespaces {
                        kept.push(Stmt::Namespace(namespace));
                    } else {
                        log::debug!(
                            "Unwrapping namespace {}",
                            namespace
                                .name
                                .as_deref()
                                .map_or("<global>".into(), String::from_utf8_lossy)
                        );
                        kept.extend(namespace.body.into_iter().filter(|child| !child.is_use()));
                    }
                }
                other => kept.push(other),
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::{Code, Namespace};

    fn sample() -> Program {
        Program {
            stmts: vec![
                Stmt::Pragma(Code::line("declare(strict_types=1);")),
                Stmt::Namespace(Namespace {
                    name: Some(b"App".to_vec()),
                    braced: false,
                    body: vec![
                        Stmt::Use(Code::line("use Foo\\Bar;")),
                        Stmt::Pragma(Code::line("declare(ticks=1);")),
                        Stmt::Other(Code::line("echo 1;")),
                    ],
                }),
            ],
            top_level_returns: 0,
        }
    }

    #[test]
    fn test_keep_namespaces_drops_only_pragmas() {
        let mut program = sample();
        DeclarationFilter::new(true).transform_program(&mut program);
        assert_eq!(
            program.stmts,
            vec![Stmt::Namespace(Namespace {
                name: Some(b"App".to_vec()),
                braced: false,
                body: vec![
                    Stmt::Use(Code::line("use Foo\\Bar;")),
                    Stmt::Other(Code::line("echo 1;")),
                ],
            })]
        );
    }

    #[test]
    fn test_unwrap_namespaces_drops_imports() {
        let mut program = sample();
        program.stmts.push(Stmt::Use(Code::line("use Baz;")));
        DeclarationFilter::new(false).transform_program(&mut program);
        assert_eq!(program.stmts, vec![Stmt::Other(Code::line("echo 1;"))]);
    }
}
