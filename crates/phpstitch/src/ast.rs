//! Syntax tree of one PHP fragment
//!
//! The tree only distinguishes the node kinds the bundler acts on. Everything
//! else is kept as comment-free [`Code`] and printed back unchanged. Function,
//! method and closure bodies are never represented as statements: they live
//! inside opaque [`Definition`] or [`Stmt::Other`] code, so a `return` that
//! appears as a [`Stmt::Return`] is always reachable from the fragment's
//! outermost scope.

/// A parsed fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
    /// Number of `return` statements outside any callable boundary, counted
    /// on the concrete syntax tree
    pub top_level_returns: usize,
}

/// One statement of a statement list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `declare(strict_types=1);` and other bodiless `declare` directives
    Pragma(Code),
    Namespace(Namespace),
    /// `use Foo\Bar;`, `use function ...;`, `use const ...;`
    Use(Code),
    Definition(Definition),
    /// An expression statement whose only effect is `require`/`include`
    Include(Code),
    Return(Code),
    Block(Block),
    /// Raw bytes between `?>` and the next open tag, followed by that tag
    InlineHtml(Vec<u8>),
    /// `goto <label>;`
    Goto(String),
    /// `<label>:`
    Label(String),
    Other(Code),
}

impl Stmt {
    /// Statements the emitter separates from their neighbours by a blank line
    pub fn wants_blank_line(&self) -> bool {
        matches!(
            self,
            Self::Definition(_) | Self::Namespace(_) | Self::Label(_)
        )
    }

    pub fn is_use(&self) -> bool {
        matches!(self, Self::Use(_))
    }

    pub fn is_pragma(&self) -> bool {
        matches!(self, Self::Pragma(_))
    }
}

/// A namespace wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// `None` for the global `namespace { }` block
    pub name: Option<Vec<u8>>,
    /// `namespace Foo { ... }` as opposed to `namespace Foo;`
    pub braced: bool,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Function,
    Class,
    Interface,
    Trait,
    Enum,
}

impl DefinitionKind {
    pub fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "function_definition" => Some(Self::Function),
            "class_declaration" => Some(Self::Class),
            "interface_declaration" => Some(Self::Interface),
            "trait_declaration" => Some(Self::Trait),
            "enum_declaration" => Some(Self::Enum),
            _ => None,
        }
    }
}

/// A top-level function or class-like declaration, kept opaque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: Option<String>,
    pub code: Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Conditional,
    Loop,
    Switch,
    Try,
    Declare,
    Compound,
}

impl BlockKind {
    pub fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "if_statement" => Some(Self::Conditional),
            "while_statement" | "do_statement" | "for_statement" | "foreach_statement" => {
                Some(Self::Loop)
            }
            "switch_statement" => Some(Self::Switch),
            "try_statement" => Some(Self::Try),
            "declare_statement" => Some(Self::Declare),
            "compound_statement" => Some(Self::Compound),
            _ => None,
        }
    }
}

/// A control structure: header code interleaved with statement bodies
///
/// `if ($a) { ... } else { ... }` is stored as
/// `[Code("if ($a) {"), Body, Code("} else {"), Body, Code("}")]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub parts: Vec<BlockPart>,
}

impl Block {
    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        self.parts.iter_mut().filter_map(|part| match part {
            BlockPart::Body(body) => Some(body),
            BlockPart::Code(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPart {
    Code(Code),
    Body(Body),
}

/// Position of a body relative to `try`/`finally` cleanup semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRole {
    Plain,
    /// `try` or `catch` body of a `try` statement that has a `finally` clause
    Guarded,
    Finally,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub stmts: Vec<Stmt>,
    pub role: BodyRole,
    /// The source body was a single statement without braces; the emitter
    /// adds them so that the body stays valid when statements are removed
    pub synthetic_braces: bool,
}

/// Comment-free source bytes of an opaque node
///
/// Lines are re-indented relative to the column the node started at. PHP
/// source is a byte string, so nothing here assumes UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Code {
    pub lines: Vec<CodeLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub text: Vec<u8>,
    /// The line starts inside a string, heredoc, nowdoc or inline HTML and
    /// must be printed without indentation changes
    pub verbatim: bool,
}

impl Code {
    /// Single-line code, mostly useful for synthesized statements and tests
    pub fn line(text: impl Into<Vec<u8>>) -> Self {
        Self {
            lines: vec![CodeLine {
                text: text.into(),
                verbatim: false,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.text.is_empty())
    }

    /// Make sure the code is terminated by `;`
    pub fn ensure_semicolon(&mut self) {
        if let Some(last) = self.lines.last_mut() {
            if !last.text.trim_ascii_end().ends_with(b";") {
                last.text.push(b';');
            }
        }
    }

    /// The lines joined with `\n`, without indentation
    pub fn to_bytes(&self) -> Vec<u8> {
        self.lines
            .iter()
            .map(|line| line.text.as_slice())
            .collect::<Vec<_>>()
            .join(&b'\n')
    }

    /// Lossy UTF-8 rendering of [`Code::to_bytes`], for messages
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }
}
