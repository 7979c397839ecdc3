//! Deterministic PHP printer for [`Program`]
//!
//! Opaque code is printed line by line at the current nesting level. Verbatim
//! lines (those starting inside a literal) are written untouched. The output
//! carries no leading PHP open tag and no trailing newline; the assembler owns
//! both.

use crate::ast::{BlockPart, Code, Namespace, Program, Stmt};

const INDENT: &[u8] = b"    ";

/// Print `program` back to PHP source bytes
pub fn emit_program(program: &Program) -> Vec<u8> {
    let mut emitter = Emitter::new();
    emitter.emit_stmts(&program.stmts);
    emitter.finish()
}

struct Emitter {
    out: Vec<u8>,
    indent: usize,
    at_line_start: bool,
}

impl Emitter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            indent: 0,
            at_line_start: true,
        }
    }

    fn finish(mut self) -> Vec<u8> {
        let leading = self.out.iter().take_while(|b| **b == b'\n').count();
        self.out.drain(..leading);
        self.out
    }

    fn newline(&mut self) {
        if !self.at_line_start {
            self.out.push(b'\n');
            self.at_line_start = true;
        }
    }

    fn blank_line(&mut self) {
        self.newline();
        self.out.push(b'\n');
    }

    /// Write `text` at the start of an indented line, or after a space when
    /// the current line already holds code
    fn push_line_text(&mut self, text: &[u8]) {
        if text.is_empty() {
            return;
        }
        if self.at_line_start {
            for _ in 0..self.indent {
                self.out.extend_from_slice(INDENT);
            }
        } else {
            self.out.push(b' ');
        }
        self.out.extend_from_slice(text);
        self.at_line_start = false;
    }

    fn write_code(&mut self, code: &Code) {
        for (i, line) in code.lines.iter().enumerate() {
            if i > 0 {
                self.out.push(b'\n');
                self.at_line_start = true;
            }
            if line.verbatim {
                self.out.extend_from_slice(&line.text);
                self.at_line_start = false;
            } else {
                self.push_line_text(&line.text);
            }
        }
    }

    fn emit_stmts(&mut self, stmts: &[Stmt]) {
        for (i, stmt) in stmts.iter().enumerate() {
            let separated = i > 0 && (stmt.wants_blank_line() || stmts[i - 1].wants_blank_line());
            if separated {
                self.blank_line();
            } else {
                self.newline();
            }
            self.emit_stmt(stmt);
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Pragma(code)
            | Stmt::Use(code)
            | Stmt::Include(code)
            | Stmt::Return(code)
            | Stmt::Other(code) => self.write_code(code),
            Stmt::Definition(definition) => self.write_code(&definition.code),
            Stmt::Namespace(namespace) => self.emit_namespace(namespace),
            Stmt::Block(block) => {
                for part in &block.parts {
                    match part {
                        BlockPart::Code(code) => self.write_code(code),
                        BlockPart::Body(body) => {
                            if body.synthetic_braces {
                                self.push_line_text(b"{");
                            }
                            self.indent += 1;
                            self.emit_stmts(&body.stmts);
                            self.indent -= 1;
                            self.newline();
                            if body.synthetic_braces {
                                self.push_line_text(b"}");
                            }
                        }
                    }
                }
            }
            Stmt::InlineHtml(html) => {
                self.push_line_text(b"?>");
                self.out.extend_from_slice(html);
                self.at_line_start = html.ends_with(b"\n");
            }
            Stmt::Goto(label) => self.push_line_text(format!("goto {label};").as_bytes()),
            Stmt::Label(label) => self.push_line_text(format!("{label}:").as_bytes()),
        }
    }

    fn emit_namespace(&mut self, namespace: &Namespace) {
        let name = namespace.name.as_deref().unwrap_or_default();
        if namespace.braced {
            if name.is_empty() {
                self.push_line_text(b"namespace {");
            } else {
                let header: [&[u8]; 3] = [b"namespace ", name, b" {"];
                self.push_line_text(&header.concat());
            }
            self.indent += 1;
            self.emit_stmts(&namespace.body);
            self.indent -= 1;
            self.newline();
            self.push_line_text(b"}");
        } else {
            let header: [&[u8]; 3] = [b"namespace ", name, b";"];
            self.push_line_text(&header.concat());
            if !namespace.body.is_empty() {
                self.blank_line();
                self.emit_stmts(&namespace.body);
            }
        }
    }
}
