//! Symbol extraction from parsed source trees.
//!
//! The extractor walks one file's tree depth-first, left-to-right, so
//! records land in declaration order. Only Const, Type, and Routine material
//! produces symbols; everything else is skipped. Entering an interface or
//! implementation section emits a synthetic section marker first, then the
//! walk descends into it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::entry::SymbolTableEntry;
use crate::store::SymbolStore;
use crate::tree::{NodeKind, SourceTree, SyntaxNode};
use crate::{Location, Result, SymbolKind, SymbolRecord};

/// Identifier-reading options. The same primitive serves plain identifiers,
/// qualified names, and operator names depending on the toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentOptions {
    /// Strip a leading `&` escape marker instead of keeping it.
    pub strip_escape: bool,
    /// Admit `.` separators, for qualified names like `TParser.Advance`.
    pub allow_qualified: bool,
    /// Admit operator characters, for operator overload names.
    pub allow_operators: bool,
}

const OPERATOR_CHARS: &[char] = &['+', '-', '*', '/', '=', '<', '>'];

/// Marker introducing a foreign-linkage class body.
const EXTERNAL_MARKER: &str = "external";

/// Read an identifier from `source` starting at `offset`.
///
/// Returns the empty string when `offset` is out of range or nothing
/// identifier-like starts there.
pub fn read_identifier(source: &str, offset: usize, opts: IdentOptions) -> &str {
    let Some(text) = source.get(offset..) else {
        return "";
    };
    let bytes = text.as_bytes();
    let mut begin = 0;
    let mut pos = 0;

    if bytes.first() == Some(&b'&') {
        if opts.strip_escape {
            begin = 1;
        }
        pos = 1;
    }

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        let accepted = c.is_ascii_alphanumeric()
            || c == '_'
            || (opts.allow_qualified && c == '.')
            || (opts.allow_operators && OPERATOR_CHARS.contains(&c));
        if !accepted {
            break;
        }
        pos += 1;
    }

    &text[begin..pos]
}

/// Walks a parsed source tree and populates a [`SymbolTableEntry`].
///
/// One extractor instance serves one pass over one tree. When the tree spans
/// several physical files (include expansion), the store's rows for each
/// newly-seen foreign file are dropped once per pass before that file's
/// records are persisted, so stale rows from a previous inclusion set cannot
/// survive.
pub struct Extractor<'a> {
    tree: &'a SourceTree,
    store: Option<&'a SymbolStore>,
    include_enum_members: bool,
    /// Files whose persisted rows were already dropped during this pass.
    cleared: HashSet<PathBuf>,
}

impl<'a> Extractor<'a> {
    pub fn new(tree: &'a SourceTree, store: Option<&'a SymbolStore>) -> Self {
        Self {
            tree,
            store,
            include_enum_members: false,
            cleared: HashSet::new(),
        }
    }

    /// Emit enum member symbols instead of suppressing them.
    pub fn include_enum_members(mut self, on: bool) -> Self {
        self.include_enum_members = on;
        self
    }

    /// Populate `entry` from the tree root. Mutation is the contract; the
    /// records land in `entry` in traversal order.
    pub fn run(mut self, entry: &mut SymbolTableEntry) -> Result<()> {
        // The entry's own rows were dropped by `clear` before this pass.
        self.cleared.insert(entry.file().to_path_buf());
        let root = self.tree.root();
        self.walk(root, entry)
    }

    fn walk(&mut self, node: &SyntaxNode, entry: &mut SymbolTableEntry) -> Result<()> {
        match node.kind {
            NodeKind::Unit => self.walk_children(node, entry),
            NodeKind::InterfaceSection => {
                self.add(entry, "interface", SymbolKind::Namespace, node.start, None)?;
                self.walk_children(node, entry)
            }
            NodeKind::ImplementationSection => {
                self.add(
                    entry,
                    "implementation",
                    SymbolKind::Namespace,
                    node.start,
                    None,
                )?;
                self.walk_children(node, entry)
            }
            NodeKind::TypeSection => self.type_section(node, entry),
            NodeKind::ConstSection => self.const_section(node, entry),
            NodeKind::RoutineDecl => {
                // Top-level routine; implementation-section names may be
                // qualified (TParser.Advance).
                let name = self
                    .ident(
                        node,
                        IdentOptions {
                            strip_escape: true,
                            allow_qualified: true,
                            ..Default::default()
                        },
                    )
                    .to_string();
                if !name.is_empty() {
                    self.add(entry, &name, SymbolKind::Function, node.start, None)?;
                }
                Ok(())
            }
            // Uses clauses and var material produce no symbols
            _ => Ok(()),
        }
    }

    fn walk_children(&mut self, node: &SyntaxNode, entry: &mut SymbolTableEntry) -> Result<()> {
        for child in &node.children {
            self.walk(child, entry)?;
        }
        Ok(())
    }

    fn type_section(&mut self, node: &SyntaxNode, entry: &mut SymbolTableEntry) -> Result<()> {
        for child in &node.children {
            match child.kind {
                NodeKind::ClassDecl => self.class_like(child, entry, SymbolKind::Class)?,
                NodeKind::RecordDecl => self.class_like(child, entry, SymbolKind::Struct)?,
                NodeKind::ExternalClassDecl => self.external_class(child, entry)?,
                NodeKind::GenericSpecialization => {
                    // Alias over a generic instantiation; approximated as a
                    // class, no generic-argument analysis.
                    let name = self.decl_name(child).to_string();
                    if !name.is_empty() {
                        self.add(entry, &name, SymbolKind::Class, child.start, None)?;
                    }
                }
                NodeKind::EnumDecl => self.enum_decl(child, entry)?,
                NodeKind::RoutineDecl => {
                    let name = self.decl_name(child).to_string();
                    if !name.is_empty() {
                        self.add(entry, &name, SymbolKind::Method, child.start, None)?;
                    }
                }
                _ => {
                    // Explicit catch-all for the rest of the type section
                    let name = self.decl_name(child).to_string();
                    if !name.is_empty() {
                        self.add(entry, &name, SymbolKind::TypeParameter, child.start, None)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn const_section(&mut self, node: &SyntaxNode, entry: &mut SymbolTableEntry) -> Result<()> {
        for child in &node.children {
            if child.kind == NodeKind::ConstDecl {
                let name = self.decl_name(child).to_string();
                if !name.is_empty() {
                    self.add(entry, &name, SymbolKind::Constant, child.start, None)?;
                }
            }
        }
        Ok(())
    }

    fn class_like(
        &mut self,
        node: &SyntaxNode,
        entry: &mut SymbolTableEntry,
        kind: SymbolKind,
    ) -> Result<()> {
        let name = self.decl_name(node).to_string();
        if name.is_empty() {
            return Ok(());
        }
        self.add(entry, &name, kind, node.start, None)?;
        self.members(node, entry, &name)
    }

    fn external_class(&mut self, node: &SyntaxNode, entry: &mut SymbolTableEntry) -> Result<()> {
        let name = self.decl_name(node).to_string();
        if name.is_empty() {
            return Ok(());
        }
        let forward = self.is_forward_external(node);
        if let Some(record) = self.add(entry, &name, SymbolKind::Class, node.start, None)? {
            record.flags.forward = forward;
        }
        if forward {
            // Tagged, not expanded: no method symbols for a bare forward
            // declaration.
            return Ok(());
        }
        self.members(node, entry, &name)
    }

    /// Routine declarations inside a class-like body become methods,
    /// qualified by the enclosing type name. Fields and everything else in
    /// the body are skipped.
    fn members(
        &mut self,
        node: &SyntaxNode,
        entry: &mut SymbolTableEntry,
        container: &str,
    ) -> Result<()> {
        for child in &node.children {
            if child.kind == NodeKind::RoutineDecl {
                let name = self
                    .ident(
                        child,
                        IdentOptions {
                            strip_escape: true,
                            allow_operators: true,
                            ..Default::default()
                        },
                    )
                    .to_string();
                if name.is_empty() {
                    continue;
                }
                if let Some(record) =
                    self.add(entry, &name, SymbolKind::Method, child.start, None)?
                {
                    record.container_name = Some(container.to_string());
                }
            }
        }
        Ok(())
    }

    fn enum_decl(&mut self, node: &SyntaxNode, entry: &mut SymbolTableEntry) -> Result<()> {
        let name = self.decl_name(node).to_string();
        if name.is_empty() {
            return Ok(());
        }
        self.add(entry, &name, SymbolKind::Enum, node.start, None)?;

        for child in &node.children {
            if child.kind != NodeKind::EnumMember {
                continue;
            }
            // Members are read regardless; emission is gated by the toggle
            let member = self.decl_name(child).to_string();
            if member.is_empty() || !self.include_enum_members {
                continue;
            }
            if let Some(record) =
                self.add(entry, &member, SymbolKind::EnumMember, child.start, None)?
            {
                record.container_name = Some(name.clone());
            }
        }
        Ok(())
    }

    /// A bare forward declaration ends in a terminator immediately after the
    /// external marker.
    fn is_forward_external(&self, node: &SyntaxNode) -> bool {
        let source = self.tree.source();
        let Some(text) = source.get(node.start..node.end) else {
            return false;
        };
        let Some(found) = text.to_ascii_lowercase().find(EXTERNAL_MARKER) else {
            return false;
        };
        let after = node.start + found + EXTERNAL_MARKER.len();
        source
            .get(after..)
            .map(|rest| rest.trim_start().starts_with(';'))
            .unwrap_or(false)
    }

    /// Plain declared name at the node's start offset, escape marker
    /// stripped.
    fn decl_name(&self, node: &SyntaxNode) -> &str {
        self.ident(
            node,
            IdentOptions {
                strip_escape: true,
                ..Default::default()
            },
        )
    }

    fn ident(&self, node: &SyntaxNode, opts: IdentOptions) -> &str {
        read_identifier(self.tree.source(), node.start, opts)
    }

    /// Resolve the offset, run cross-file hygiene, and append the record.
    fn add<'e>(
        &mut self,
        entry: &'e mut SymbolTableEntry,
        name: &str,
        kind: SymbolKind,
        offset: usize,
        length: Option<u32>,
    ) -> Result<Option<&'e mut SymbolRecord>> {
        let Some(pos) = self.tree.resolve(offset) else {
            tracing::debug!(offset, name, "symbol offset outside every source span");
            return Ok(None);
        };
        self.hygiene(&pos.file)?;
        let length = length.unwrap_or(name.len() as u32);
        let location = Location::new(pos.file, pos.line, pos.column, length);
        Ok(Some(entry.add_symbol(name, kind, location)))
    }

    /// Included files are not tracked as a fixed list, so the first time a
    /// symbol resolves to a file not yet seen this pass, that file's
    /// persisted rows are dropped before new ones can be inserted.
    fn hygiene(&mut self, file: &Path) -> Result<()> {
        if self.cleared.contains(file) {
            return Ok(());
        }
        if let Some(store) = self.store {
            store.clear_symbols(file)?;
            tracing::debug!(file = %file.display(), "dropped stale rows for included file");
        }
        self.cleared.insert(file.to_path_buf());
        Ok(())
    }
}
