//! Fragment parser
//!
//! Parses PHP source with the tree-sitter PHP grammar and lowers the concrete
//! syntax tree into the bundler's [`Program`]. Lowering only descends through
//! statement containers (the file, namespace bodies and control structures);
//! definitions and expressions are kept as opaque [`Code`].
//!
//! Independently of the lowering, the parser counts the `return` statements
//! that sit outside every callable boundary of the concrete tree. The return
//! rewriter checks its own work against that count.

use std::{ops::Range, path::Path};

use log::debug;
use tree_sitter::{Language, Node, Parser};

use crate::{
    ast::{
        Block, BlockKind, BlockPart, Body, BodyRole, Code, CodeLine, Definition, DefinitionKind,
        Namespace, Program, Stmt,
    },
    error::{BundleError, Result},
};

/// Node kinds whose text must never be re-indented
const LITERAL_KINDS: &[&str] = &[
    "string",
    "encapsed_string",
    "heredoc",
    "nowdoc",
    "shell_command_expression",
    "text",
];

/// Node kinds that open a new `return` scope
const CALLABLE_KINDS: &[&str] = &[
    "function_definition",
    "method_declaration",
    "anonymous_function",
    "anonymous_function_creation_expression",
    "arrow_function",
    "class_declaration",
    "interface_declaration",
    "trait_declaration",
    "enum_declaration",
    "anonymous_class",
];

const INCLUDE_KINDS: &[&str] = &[
    "include_expression",
    "include_once_expression",
    "require_expression",
    "require_once_expression",
];

const STATEMENT_KINDS: &[&str] = &[
    "empty_statement",
    "compound_statement",
    "named_label_statement",
    "expression_statement",
    "if_statement",
    "switch_statement",
    "while_statement",
    "do_statement",
    "for_statement",
    "foreach_statement",
    "goto_statement",
    "continue_statement",
    "break_statement",
    "return_statement",
    "try_statement",
    "declare_statement",
    "echo_statement",
    "exit_statement",
    "unset_statement",
    "const_declaration",
    "function_definition",
    "class_declaration",
    "interface_declaration",
    "trait_declaration",
    "enum_declaration",
    "namespace_definition",
    "namespace_use_declaration",
    "global_declaration",
    "function_static_declaration",
    "text_interpolation",
];

/// Statements that end with `;`, which `?>` may stand in for
const SIMPLE_STATEMENT_KINDS: &[&str] = &[
    "expression_statement",
    "echo_statement",
    "exit_statement",
    "unset_statement",
    "const_declaration",
    "global_declaration",
    "function_static_declaration",
    "break_statement",
    "continue_statement",
    "goto_statement",
    "return_statement",
    "namespace_use_declaration",
    "declare_statement",
];

fn is_statement(kind: &str) -> bool {
    STATEMENT_KINDS.contains(&kind)
}

fn children<'t>(node: Node<'t>) -> impl Iterator<Item = Node<'t>> {
    (0..node.child_count()).filter_map(move |i| node.child(i))
}

/// Parser for single fragments, reusable across the files of one build
pub struct FragmentParser {
    parser: Parser,
}

impl std::fmt::Debug for FragmentParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentParser").finish_non_exhaustive()
    }
}

impl FragmentParser {
    pub fn new() -> Result<Self> {
        let language: Language = tree_sitter_php::LANGUAGE_PHP.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| BundleError::ParserSetup(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Parse `source` (the contents of `path`) into a [`Program`]
    ///
    /// PHP source is a byte string: literals and inline HTML may hold bytes
    /// that are not UTF-8, and they are carried through unchanged.
    pub fn parse(&mut self, path: &Path, source: &[u8]) -> Result<Program> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| BundleError::Parse {
                path: path.to_path_buf(),
                line: 1,
                column: 1,
                message: "the parser did not produce a syntax tree".to_owned(),
            })?;
        let root = tree.root_node();

        if root.has_error() {
            return Err(syntax_error(path, source, root));
        }

        let trivia = Trivia::collect(root);
        let lowering = Lowering {
            path,
            source,
            trivia: &trivia,
        };
        let stmts = lowering.lower_program(root)?;
        let top_level_returns = count_top_level_returns(root);

        debug!(
            "Parsed {}: {} top-level statements, {} top-level returns",
            path.display(),
            stmts.len(),
            top_level_returns
        );

        Ok(Program {
            stmts,
            top_level_returns,
        })
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    children(node).find_map(first_error)
}

fn syntax_error(path: &Path, source: &[u8], root: Node<'_>) -> BundleError {
    let node = first_error(root).unwrap_or(root);
    let position = node.start_position();
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let text = String::from_utf8_lossy(
            source
                .get(node.start_byte()..node.end_byte())
                .unwrap_or_default(),
        );
        let snippet: String = text
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(40)
            .collect();
        format!("unexpected `{}`", snippet.trim())
    };
    BundleError::Parse {
        path: path.to_path_buf(),
        line: position.row + 1,
        column: position.column + 1,
        message,
    }
}

/// Count `return` statements at callable depth zero
pub(crate) fn count_top_level_returns(root: Node<'_>) -> usize {
    struct ReturnScan {
        depth: usize,
        found: usize,
    }

    impl ReturnScan {
        fn visit(&mut self, node: Node<'_>) {
            let boundary = CALLABLE_KINDS.contains(&node.kind());
            if boundary {
                self.depth += 1;
            }
            if self.depth == 0 && node.kind() == "return_statement" {
                self.found += 1;
            }
            for child in children(node) {
                self.visit(child);
            }
            if boundary {
                self.depth -= 1;
            }
        }
    }

    let mut scan = ReturnScan { depth: 0, found: 0 };
    scan.visit(root);
    scan.found
}

/// Byte ranges of comments and string-like literals of one tree
#[derive(Debug, Default)]
struct Trivia {
    comments: Vec<Range<usize>>,
    literals: Vec<Range<usize>>,
}

impl Trivia {
    fn collect(root: Node<'_>) -> Self {
        let mut trivia = Self::default();
        trivia.visit(root);
        trivia
    }

    fn visit(&mut self, node: Node<'_>) {
        let kind = node.kind();
        if kind == "comment" {
            self.comments.push(node.start_byte()..node.end_byte());
            return;
        }
        if LITERAL_KINDS.contains(&kind) {
            self.literals.push(node.start_byte()..node.end_byte());
            return;
        }
        for child in children(node) {
            self.visit(child);
        }
    }

    fn comments_within(&self, start: usize, end: usize) -> impl Iterator<Item = &Range<usize>> {
        self.comments
            .iter()
            .filter(move |c| c.start >= start && c.end <= end)
    }

    fn inside_literal(&self, offset: usize) -> bool {
        self.literals
            .iter()
            .any(|l| l.start < offset && offset < l.end)
    }
}

/// Strip at most `columns` leading blanks
fn strip_indent(text: &[u8], columns: usize) -> &[u8] {
    let strip = text
        .iter()
        .take(columns)
        .take_while(|b| matches!(**b, b' ' | b'\t'))
        .count();
    &text[strip..]
}

/// Bytes that may continue an identifier or variable name
fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'$') || byte >= 0x80
}

/// First named child that is not a comment
fn operand(node: Node<'_>) -> Option<Node<'_>> {
    children(node).find(|child| child.is_named() && child.kind() != "comment")
}

#[derive(Debug, Clone, Copy)]
struct TokenRun {
    start: usize,
    end: usize,
    column: usize,
}

/// Accumulates the parts of a [`Block`], merging adjacent tokens into one
/// piece of code
#[derive(Debug, Default)]
struct PartsBuilder {
    parts: Vec<BlockPart>,
    run: Option<TokenRun>,
}

impl PartsBuilder {
    fn token(&mut self, node: Node<'_>) {
        match self.run.as_mut() {
            Some(run) => run.end = node.end_byte(),
            None => {
                self.run = Some(TokenRun {
                    start: node.start_byte(),
                    end: node.end_byte(),
                    column: node.start_position().column,
                });
            }
        }
    }

    fn body(&mut self, lowering: &Lowering<'_>, body: Body) {
        self.flush(lowering);
        self.parts.push(BlockPart::Body(body));
    }

    fn flush(&mut self, lowering: &Lowering<'_>) {
        if let Some(run) = self.run.take() {
            let code = lowering.code(run.start, run.end, run.column);
            if !code.is_empty() {
                self.parts.push(BlockPart::Code(code));
            }
        }
    }

    fn finish(mut self, lowering: &Lowering<'_>) -> Vec<BlockPart> {
        self.flush(lowering);
        self.parts
    }
}

struct Lowering<'a> {
    path: &'a Path,
    source: &'a [u8],
    trivia: &'a Trivia,
}

impl Lowering<'_> {
    fn text(&self, node: Node<'_>) -> &[u8] {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or_default()
    }

    fn node_code(&self, node: Node<'_>) -> Code {
        self.code(
            node.start_byte(),
            node.end_byte(),
            node.start_position().column,
        )
    }

    /// Code of a statement that must end with `;`
    fn simple_code(&self, node: Node<'_>) -> Code {
        let mut code = self.node_code(node);
        code.ensure_semicolon();
        code
    }

    /// Comment-free code for `start..end`, re-indented relative to `column`
    fn code(&self, start: usize, end: usize, column: usize) -> Code {
        let mut raw = vec![CodeLine {
            text: Vec::new(),
            verbatim: false,
        }];
        let mut pos = start;
        for comment in self.trivia.comments_within(start, end) {
            self.push_segment(&mut raw, pos, comment.start);
            pos = comment.end;
            if let Some(line) = raw.last_mut() {
                while line.text.last().is_some_and(|b| matches!(*b, b' ' | b'\t')) {
                    line.text.pop();
                }
                let before = line.text.last().copied();
                let after = self.source.get(pos..end).and_then(|rest| rest.first().copied());
                if let (Some(before), Some(after)) = (before, after) {
                    if is_word_byte(before) && is_word_byte(after) {
                        line.text.push(b' ');
                    }
                }
            }
        }
        self.push_segment(&mut raw, pos, end);
        normalize_lines(&raw, column)
    }

    fn push_segment(&self, raw: &mut Vec<CodeLine>, from: usize, to: usize) {
        let segment = self.source.get(from..to).unwrap_or_default();
        let mut offset = from;
        for (i, piece) in segment.split(|b| *b == b'\n').enumerate() {
            if i > 0 {
                raw.push(CodeLine {
                    text: Vec::new(),
                    verbatim: self.trivia.inside_literal(offset),
                });
            }
            if let Some(line) = raw.last_mut() {
                line.text.extend_from_slice(piece);
            }
            offset += piece.len() + 1;
        }
    }

    fn lower_program(&self, root: Node<'_>) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        // an unbraced `namespace Foo;` owns every statement up to the next one
        let mut open: Option<Namespace> = None;
        // text before the opening tag waits for that tag
        let mut leading: &[u8] = b"";

        for child in children(root) {
            let stmt = match child.kind() {
                "comment" => None,
                "text" => {
                    leading = self.text(child);
                    None
                }
                "php_tag" => {
                    let html = leading_html(leading, self.text(child));
                    leading = b"";
                    html.map(Stmt::InlineHtml)
                }
                "namespace_definition" => {
                    if let Some(done) = open.take() {
                        stmts.push(Stmt::Namespace(done));
                    }
                    let namespace = self.lower_namespace(child)?;
                    if namespace.braced {
                        stmts.push(Stmt::Namespace(namespace));
                    } else {
                        open = Some(namespace);
                    }
                    None
                }
                _ => self.lower_stmt(child)?,
            };

            if let Some(stmt) = stmt {
                match open.as_mut() {
                    Some(namespace) => namespace.body.push(stmt),
                    None => stmts.push(stmt),
                }
            }
        }

        if let Some(done) = open {
            stmts.push(Stmt::Namespace(done));
        }
        // a file that never opens PHP
        if let Some(html) = leading_html(leading, b"<?php") {
            stmts.push(Stmt::InlineHtml(html));
        }
        Ok(stmts)
    }

    fn lower_namespace(&self, node: Node<'_>) -> Result<Namespace> {
        let name = node
            .child_by_field_name("name")
            .map(|name| self.text(name).trim_ascii().to_vec());
        let body = children(node).find(|child| child.kind() == "compound_statement");

        match body {
            Some(body) => Ok(Namespace {
                name,
                braced: true,
                body: self.lower_statements(body)?,
            }),
            None => Ok(Namespace {
                name,
                braced: false,
                body: Vec::new(),
            }),
        }
    }

    /// Statements of a `{ ... }` block, ignoring its braces
    fn lower_statements(&self, holder: Node<'_>) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        for child in children(holder) {
            if is_statement(child.kind()) {
                stmts.extend(self.lower_stmt(child)?);
            }
        }
        Ok(stmts)
    }

    fn lower_stmt(&self, node: Node<'_>) -> Result<Option<Stmt>> {
        let kind = node.kind();
        let stmt = match kind {
            "comment" | "empty_statement" => return Ok(None),
            "text_interpolation" => return Ok(self.interpolated_html(node).map(Stmt::InlineHtml)),
            "namespace_definition" => {
                return Err(BundleError::unsupported(
                    self.path,
                    format!(
                        "namespace declaration nested inside a block at line {}",
                        node.start_position().row + 1
                    ),
                ));
            }
            "namespace_use_declaration" => Stmt::Use(self.simple_code(node)),
            "return_statement" => Stmt::Return(self.simple_code(node)),
            "goto_statement" | "named_label_statement" => self.jump(node),
            "expression_statement" if self.is_inclusion(node) => {
                Stmt::Include(self.simple_code(node))
            }
            "declare_statement" if !self.has_body(node) => Stmt::Pragma(self.simple_code(node)),
            _ => {
                if let Some(definition_kind) = DefinitionKind::from_node_kind(kind) {
                    Stmt::Definition(Definition {
                        kind: definition_kind,
                        name: node
                            .child_by_field_name("name")
                            .map(|name| String::from_utf8_lossy(self.text(name)).into_owned()),
                        code: self.node_code(node),
                    })
                } else if let Some(block_kind) = BlockKind::from_node_kind(kind) {
                    Stmt::Block(self.lower_block(node, block_kind)?)
                } else if SIMPLE_STATEMENT_KINDS.contains(&kind) {
                    Stmt::Other(self.simple_code(node))
                } else {
                    Stmt::Other(self.node_code(node))
                }
            }
        };
        Ok(Some(stmt))
    }

    /// `goto x;` and `x:`, kept as code when the name is not UTF-8
    fn jump(&self, node: Node<'_>) -> Stmt {
        let name = children(node)
            .find(|child| child.kind() == "name")
            .and_then(|name| std::str::from_utf8(self.text(name)).ok());
        match name {
            Some(name) if node.kind() == "goto_statement" => Stmt::Goto(name.to_owned()),
            Some(name) => Stmt::Label(name.to_owned()),
            None => Stmt::Other(self.simple_code(node)),
        }
    }

    /// The statement only loads a file, possibly as `(require ...)` or
    /// `@include ...`
    fn is_inclusion(&self, node: Node<'_>) -> bool {
        let mut expr = operand(node);
        while let Some(current) = expr {
            match current.kind() {
                kind if INCLUDE_KINDS.contains(&kind) => return true,
                "parenthesized_expression" | "error_suppression_expression" => {
                    expr = operand(current);
                }
                "unary_op_expression"
                    if children(current).next().is_some_and(|op| op.kind() == "@") =>
                {
                    expr = operand(current);
                }
                _ => return false,
            }
        }
        false
    }

    fn has_body(&self, node: Node<'_>) -> bool {
        children(node).any(|child| child.kind() == "colon_block" || is_statement(child.kind()))
    }

    /// HTML between `?>` and the next open tag, followed by that tag
    ///
    /// `None` when PHP would print nothing: no text, or only the newline
    /// directly after `?>`, which PHP swallows.
    fn interpolated_html(&self, node: Node<'_>) -> Option<Vec<u8>> {
        let close = children(node).find(|child| child.kind() == "?>");
        let reopen = children(node).find(|child| child.kind() == "php_tag");

        let start = close.map_or(node.start_byte(), |close| close.end_byte());
        let end = reopen.map_or(node.end_byte(), |tag| tag.start_byte());
        let html = self.source.get(start..end).unwrap_or_default();
        let tag = reopen.map_or(&b"<?php"[..], |tag| self.text(tag));

        let silent = matches!(html, b"" | b"\n" | b"\r\n");
        if silent && !is_echo_tag(tag) {
            return None;
        }
        Some([html, tag].concat())
    }

    fn lower_block(&self, node: Node<'_>, kind: BlockKind) -> Result<Block> {
        let mut builder = PartsBuilder::default();
        if node.kind() == "compound_statement" {
            self.flatten_body_holder(node, BodyRole::Plain, &mut builder)?;
        } else {
            self.flatten(node, BodyRole::Plain, &mut builder)?;
        }
        Ok(Block {
            kind,
            parts: builder.finish(self),
        })
    }

    /// Walk a control structure, splitting it into header tokens and bodies
    fn flatten(&self, node: Node<'_>, role: BodyRole, builder: &mut PartsBuilder) -> Result<()> {
        let is_try = node.kind() == "try_statement";
        let has_finally = is_try && children(node).any(|child| child.kind() == "finally_clause");

        for child in children(node) {
            let child_role = match child.kind() {
                "finally_clause" if is_try => BodyRole::Finally,
                "compound_statement" | "catch_clause" if has_finally => BodyRole::Guarded,
                _ => role,
            };

            match child.kind() {
                "comment" => {}
                "compound_statement" | "colon_block" | "case_statement" | "default_statement" => {
                    self.flatten_body_holder(child, child_role, builder)?;
                }
                "else_if_clause" | "else_clause" | "catch_clause" | "finally_clause"
                | "switch_block" => {
                    self.flatten(child, child_role, builder)?;
                }
                kind if is_statement(kind) => {
                    let body = Body {
                        stmts: self.lower_stmt(child)?.into_iter().collect(),
                        role: child_role,
                        synthetic_braces: true,
                    };
                    builder.body(self, body);
                }
                _ => builder.token(child),
            }
        }
        Ok(())
    }

    /// Walk a node whose statements form one body (`{ }`, `: ...`, `case:`)
    fn flatten_body_holder(
        &self,
        holder: Node<'_>,
        role: BodyRole,
        builder: &mut PartsBuilder,
    ) -> Result<()> {
        let mut stmts = Vec::new();
        let mut in_body = false;

        for child in children(holder) {
            let kind = child.kind();
            if kind == "comment" {
                continue;
            }
            if is_statement(kind) {
                stmts.extend(self.lower_stmt(child)?);
                in_body = true;
                continue;
            }
            if in_body {
                builder.body(
                    self,
                    Body {
                        stmts: std::mem::take(&mut stmts),
                        role,
                        synthetic_braces: false,
                    },
                );
                in_body = false;
            }
            builder.token(child);
        }

        if in_body {
            builder.body(
                self,
                Body {
                    stmts,
                    role,
                    synthetic_braces: false,
                },
            );
        }
        Ok(())
    }
}

fn is_echo_tag(tag: &[u8]) -> bool {
    tag == b"<?="
}

/// Text before the opening `tag`, minus a shebang line, followed by the tag
///
/// `None` when nothing would be printed. A `<?=` opening always survives since
/// the expression after it is echoed.
fn leading_html(text: &[u8], tag: &[u8]) -> Option<Vec<u8>> {
    let html = if text.starts_with(b"#!") {
        text.iter()
            .position(|b| *b == b'\n')
            .map_or(&b""[..], |newline| &text[newline + 1..])
    } else {
        text
    };
    if html.is_empty() && !is_echo_tag(tag) {
        None
    } else {
        Some([html, tag].concat())
    }
}

fn normalize_lines(raw: &[CodeLine], column: usize) -> Code {
    let mut lines = Vec::with_capacity(raw.len());
    for (i, line) in raw.iter().enumerate() {
        if line.verbatim {
            lines.push(line.clone());
            continue;
        }
        // the line ends inside a literal when the next one starts inside it
        let ends_in_literal = raw.get(i + 1).is_some_and(|next| next.verbatim);
        let mut text = line.text.as_slice();
        if i > 0 {
            text = strip_indent(text, column);
        }
        if !ends_in_literal {
            text = text.trim_ascii_end();
            if text.is_empty() {
                continue;
            }
        }
        lines.push(CodeLine {
            text: text.to_vec(),
            verbatim: false,
        });
    }
    Code { lines }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(source: &str) -> Program {
        FragmentParser::new()
            .expect("grammar loads")
            .parse(Path::new("test.php"), source.as_bytes())
            .expect("failed to parse test code")
    }

    fn kinds(stmts: &[Stmt]) -> Vec<&'static str> {
        stmts
            .iter()
            .map(|stmt| match stmt {
                Stmt::Pragma(_) => "pragma",
                Stmt::Namespace(_) => "namespace",
                Stmt::Use(_) => "use",
                Stmt::Definition(_) => "definition",
                Stmt::Include(_) => "include",
                Stmt::Return(_) => "return",
                Stmt::Block(_) => "block",
                Stmt::InlineHtml(_) => "html",
                Stmt::Goto(_) => "goto",
                Stmt::Label(_) => "label",
                Stmt::Other(_) => "other",
            })
            .collect()
    }

    #[test]
    fn test_statement_classification() {
        let program = parse(
            r#"<?php
declare(strict_types=1);
use Foo\Bar;
require_once __DIR__ . '/other.php';
$config = require 'config.php';
function helper() { return 1; }
class Widget {}
if ($x) { echo 1; }
return;
"#,
        );
        assert_eq!(
            kinds(&program.stmts),
            vec![
                "pragma",
                "use",
                "include",
                "other",
                "definition",
                "definition",
                "block",
                "return"
            ]
        );
        assert_eq!(program.top_level_returns, 1);
    }

    #[test]
    fn test_unbraced_namespace_owns_following_statements() {
        let program = parse("<?php\nnamespace App\\Models;\n\nuse Bar;\n\necho 'x';\n");
        assert_eq!(program.stmts.len(), 1);
        let Stmt::Namespace(namespace) = &program.stmts[0] else {
            panic!("expected a namespace, got {:?}", program.stmts[0]);
        };
        assert!(!namespace.braced);
        assert_eq!(namespace.name.as_deref(), Some(&b"App\\Models"[..]));
        assert_eq!(kinds(&namespace.body), vec!["use", "other"]);
    }

    #[test]
    fn test_braced_namespaces_are_separate() {
        let program = parse("<?php\nnamespace A {\n    echo 1;\n}\nnamespace {\n    echo 2;\n}\n");
        assert_eq!(kinds(&program.stmts), vec!["namespace", "namespace"]);
        let Stmt::Namespace(global) = &program.stmts[1] else {
            panic!("expected a namespace");
        };
        assert!(global.braced);
        assert_eq!(global.name, None);
    }

    #[test]
    fn test_nested_namespace_is_rejected() {
        let err = FragmentParser::new()
            .expect("grammar loads")
            .parse(
                Path::new("nested.php"),
                b"<?php\nif (true) {\n    namespace Inner;\n}\n",
            );
        assert!(
            matches!(err, Err(BundleError::Unsupported { .. }) | Err(BundleError::Parse { .. })),
            "nested namespace must fail, got {err:?}"
        );
    }

    #[test]
    fn test_returns_inside_callables_are_not_top_level() {
        let program = parse(
            r#"<?php
function a() { return 1; }
$f = function () { return 2; };
$g = fn () => 3;
class C { public function m() { return 4; } }
$o = new class { public function n() { return 5; } };
foreach ($items as $item) {
    if ($item) {
        return;
    }
}
"#,
        );
        assert_eq!(program.top_level_returns, 1);
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = FragmentParser::new()
            .expect("grammar loads")
            .parse(Path::new("broken.php"), b"<?php\necho 1;\nfunction (\n");
        let Err(BundleError::Parse { path, line, .. }) = err else {
            panic!("expected a parse error, got {err:?}");
        };
        assert_eq!(path, Path::new("broken.php"));
        assert!(line >= 3, "error reported on line {line}");
    }

    #[test]
    fn test_comments_are_dropped_and_heredoc_kept_verbatim() {
        let program = parse(
            "<?php\nfunction greet() {\n    // say hi\n    $text = <<<EOT\n  keep   this\nEOT;\n    return $text; # done\n}\n",
        );
        let Stmt::Definition(definition) = &program.stmts[0] else {
            panic!("expected a definition");
        };
        assert_eq!(
            definition.code.to_text(),
            "function greet() {\n    $text = <<<EOT\n  keep   this\nEOT;\n    return $text;\n}"
        );
        assert!(definition.code.lines[2].verbatim);
        assert!(definition.code.lines[3].verbatim);
    }

    #[test]
    fn test_shebang_is_dropped() {
        let program = parse("#!/usr/bin/env php\n<?php\necho 1;\n");
        assert_eq!(kinds(&program.stmts), vec!["other"]);
    }

    #[test]
    fn test_inline_html_is_kept_with_reopen_tag() {
        let program = parse("<?php\necho 1;\n?>\n<p>hi</p>\n<?php\necho 2;\n");
        assert_eq!(kinds(&program.stmts), vec!["other", "html", "other"]);
        assert_eq!(
            program.stmts[1],
            Stmt::InlineHtml(b"\n<p>hi</p>\n<?php".to_vec())
        );
    }

    #[test]
    fn test_short_echo_opening_tag_is_kept() {
        let program = parse("<?= 'hi' ?>\n");
        assert_eq!(kinds(&program.stmts), vec!["html", "other"]);
        assert_eq!(program.stmts[0], Stmt::InlineHtml(b"<?=".to_vec()));
    }

    #[test]
    fn test_leading_html_keeps_its_short_echo_tag() {
        let program = parse("<p>x</p><?= $name ?>\n<?php echo 2;\n");
        assert_eq!(kinds(&program.stmts), vec!["html", "other", "other"]);
        assert_eq!(program.stmts[0], Stmt::InlineHtml(b"<p>x</p><?=".to_vec()));
    }

    #[test]
    fn test_html_only_file_is_inline_html() {
        let program = parse("<p>static</p>\n");
        assert_eq!(
            program.stmts,
            vec![Stmt::InlineHtml(b"<p>static</p>\n<?php".to_vec())]
        );
    }

    #[test]
    fn test_non_utf8_literal_bytes_are_kept() {
        let program = FragmentParser::new()
            .expect("grammar loads")
            .parse(Path::new("latin1.php"), b"<?php\necho '\xe9t\xe9';\n")
            .expect("latin-1 literal is valid PHP");
        let Stmt::Other(code) = &program.stmts[0] else {
            panic!("expected an echo statement, got {:?}", program.stmts[0]);
        };
        assert_eq!(code.to_bytes(), b"echo '\xe9t\xe9';".to_vec());
    }

    #[test]
    fn test_wrapped_inclusions_are_classified() {
        let program = parse(
            "<?php\n(require 'a.php');\n@include 'b.php';\n@(include_once 'c.php');\n$x = @include 'd.php';\n!require 'e.php';\n",
        );
        assert_eq!(
            kinds(&program.stmts),
            vec!["include", "include", "include", "other", "other"]
        );
    }

    #[test]
    fn test_goto_and_labels_are_lowered() {
        let program = parse("<?php\ngoto done;\necho 1;\ndone:\necho 2;\n");
        assert_eq!(
            program.stmts,
            vec![
                Stmt::Goto("done".to_owned()),
                Stmt::Other(Code::line("echo 1;")),
                Stmt::Label("done".to_owned()),
                Stmt::Other(Code::line("echo 2;")),
            ]
        );
    }

    #[test]
    fn test_trailing_close_tag_is_dropped() {
        let program = parse("<?php\necho 1;\n?>\n");
        assert_eq!(kinds(&program.stmts), vec!["other"]);
    }

    #[test]
    fn test_block_splits_header_and_bodies() {
        let program = parse("<?php\nif ($a) {\n    foo();\n} else {\n    bar();\n}\n");
        let Stmt::Block(block) = &program.stmts[0] else {
            panic!("expected a block");
        };
        assert_eq!(block.kind, BlockKind::Conditional);
        let shape: Vec<String> = block
            .parts
            .iter()
            .map(|part| match part {
                BlockPart::Code(code) => code.to_text(),
                BlockPart::Body(body) => format!("<{} stmts>", body.stmts.len()),
            })
            .collect();
        assert_eq!(
            shape,
            vec!["if ($a) {", "<1 stmts>", "} else {", "<1 stmts>", "}"]
        );
    }

    #[test]
    fn test_try_with_finally_marks_guarded_bodies() {
        let program =
            parse("<?php\ntry {\n    a();\n} catch (E $e) {\n    b();\n} finally {\n    c();\n}\n");
        let Stmt::Block(mut block) = program.stmts[0].clone() else {
            panic!("expected a block");
        };
        let roles: Vec<BodyRole> = block.bodies_mut().map(|body| body.role).collect();
        assert_eq!(
            roles,
            vec![BodyRole::Guarded, BodyRole::Guarded, BodyRole::Finally]
        );
    }

    #[test]
    fn test_brace_less_body_gets_synthetic_braces() {
        let program = parse("<?php\nif ($done) return;\n");
        let Stmt::Block(mut block) = program.stmts[0].clone() else {
            panic!("expected a block");
        };
        let body = block.bodies_mut().next().expect("one body");
        assert!(body.synthetic_braces);
        assert_eq!(kinds(&body.stmts), vec!["return"]);
    }
}
