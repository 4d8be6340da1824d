//! Parser-facing syntax tree interface.
//!
//! The engine never parses source text itself; an external parser hands it a
//! tree of typed nodes with byte offsets into the include-expanded source
//! buffer. This module defines that contract: the node vocabulary, the tree
//! with its offset-to-position resolver, and the [`SourceParser`] trait the
//! surrounding server implements.

use std::path::{Path, PathBuf};

use crate::Result;

/// Node vocabulary produced by the external parser.
///
/// Closed set: extraction dispatches over these tags with a plain `match`,
/// and anything a given context does not recognize falls through to that
/// context's catch-all rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Root of a parsed compilation unit.
    Unit,
    InterfaceSection,
    ImplementationSection,
    UsesClause,
    TypeSection,
    ConstSection,
    VarSection,
    /// Class-like type declaration.
    ClassDecl,
    /// Record / plain-old-data declaration.
    RecordDecl,
    EnumDecl,
    EnumMember,
    /// Foreign-linkage class declaration (may be a bare forward declaration).
    ExternalClassDecl,
    /// Generic instantiation used as a type alias.
    GenericSpecialization,
    TypeAlias,
    SetDecl,
    PointerDecl,
    ProceduralDecl,
    /// Procedure/function header, at top level or inside a type.
    RoutineDecl,
    ConstDecl,
    VarDecl,
}

/// A node in the parsed tree.
///
/// `start` points at the declared identifier in the source buffer; `end` is
/// one past the node's span. Children appear in source order, so a
/// depth-first walk mirrors declaration order.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub start: usize,
    pub end: usize,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            start,
            end,
            children: Vec::new(),
        }
    }

    pub fn with_children(
        kind: NodeKind,
        start: usize,
        end: usize,
        children: Vec<SyntaxNode>,
    ) -> Self {
        Self {
            kind,
            start,
            end,
            children,
        }
    }
}

/// Resolved position of a byte offset: the physical file that contains it
/// plus a 0-based line and column within that file's span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

/// A contiguous region of the include-expanded buffer that belongs to one
/// physical file.
#[derive(Debug, Clone)]
pub struct FileSpan {
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
}

/// A parsed source tree for one compilation unit.
///
/// Owns the include-expanded source text, the root node, and the span table
/// mapping buffer regions back to physical files. Line and column numbers
/// are counted from the start of each span, matching how include expansion
/// splices whole files into the buffer.
pub struct SourceTree {
    source: String,
    root: SyntaxNode,
    spans: Vec<FileSpan>,
}

impl SourceTree {
    pub fn new(source: String, root: SyntaxNode, spans: Vec<FileSpan>) -> Self {
        Self {
            source,
            root,
            spans,
        }
    }

    /// A tree whose whole buffer belongs to a single physical file.
    pub fn single_file(file: PathBuf, source: String, root: SyntaxNode) -> Self {
        let end = source.len();
        Self::new(
            source,
            root,
            vec![FileSpan {
                file,
                start: 0,
                end,
            }],
        )
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &SyntaxNode {
        &self.root
    }

    /// Resolve a byte offset to the physical file, line, and column that
    /// contain it. `None` when the offset falls outside every span.
    pub fn resolve(&self, offset: usize) -> Option<SourcePos> {
        let span = self
            .spans
            .iter()
            .find(|s| offset >= s.start && offset < s.end)?;
        let text = self.source.get(span.start..offset)?;
        let line = text.bytes().filter(|&b| b == b'\n').count() as u32;
        let column = match text.rfind('\n') {
            Some(i) => (text.len() - i - 1) as u32,
            None => text.len() as u32,
        };
        Some(SourcePos {
            file: span.file.clone(),
            line,
            column,
        })
    }
}

/// The external parser collaborator.
///
/// Implementations own parsing entirely; the engine only walks the resulting
/// tree. `main_file` also resolves include files to the file that physically
/// contains them, which is how document queries against an include land on
/// the right entry.
pub trait SourceParser {
    /// Resolve a path (possibly an include file) to its owning main file.
    /// `None` when the path is unknown to the parser.
    fn main_file(&self, path: &Path) -> Option<PathBuf>;

    /// Parse a main file into a tree.
    fn parse(&self, path: &Path) -> Result<SourceTree>;

    /// Whether this parser recognizes the file. Used by workspace scans.
    fn can_parse(&self, path: &Path) -> bool;
}
