//! Symbol arena.
//!
//! Every binding the frontend resolves (variables, arrays, struct fields,
//! functions) gets one [`SymbolId`]. Two identifiers with the same spelling
//! but different declarations get different ids, so analyses compare
//! bindings, never strings. Spellings are interned once.

use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use string_interner::{backend::StringBackend, DefaultSymbol, StringInterner, Symbol as SymbolTrait};

type Backend = StringBackend<DefaultSymbol>;

/// An interned spelling.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(u32);

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// Opaque handle to a resolved binding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Index into the owning [`SymbolTable`].
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a binding denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Plain scalar variable.
    Scalar,
    /// Array with a known number of dimensions.
    Array {
        /// Declared dimensionality
        rank: usize,
    },
    /// Pointer variable.
    Pointer,
    /// Struct or union member, shared by every owner of that member name.
    Field,
    /// Function name.
    Function,
    /// Never declared in the translation unit; shape inferred from use.
    Implicit,
}

/// Bookkeeping for one binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Interned spelling
    pub name: Name,
    /// What the binding denotes
    pub kind: SymbolKind,
    /// Declaration site (dummy for implicit symbols)
    pub span: Span,
    /// Lexical scope depth of the declaration; 0 is file scope
    pub depth: usize,
}

/// Arena owning every binding of one translation unit.
#[derive(Debug)]
pub struct SymbolTable {
    names: StringInterner<Backend>,
    symbols: Vec<SymbolInfo>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            names: StringInterner::new(),
            symbols: Vec::new(),
        }
    }

    /// Intern a spelling.
    pub fn intern(&mut self, s: &str) -> Name {
        Name(self.names.get_or_intern(s).to_usize() as u32)
    }

    /// Resolve an interned spelling.
    pub fn spelling(&self, name: Name) -> &str {
        DefaultSymbol::try_from_usize(name.0 as usize)
            .and_then(|sym| self.names.resolve(sym))
            .unwrap_or("<?>")
    }

    /// Allocate a fresh binding.
    pub fn declare(&mut self, name: &str, kind: SymbolKind, span: Span, depth: usize) -> SymbolId {
        let name = self.intern(name);
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(SymbolInfo { name, kind, span, depth });
        id
    }

    /// Binding details.
    ///
    /// Panics if `id` was produced by a different table.
    pub fn info(&self, id: SymbolId) -> &SymbolInfo {
        &self.symbols[id.index()]
    }

    /// Spelling of a binding.
    pub fn name(&self, id: SymbolId) -> &str {
        self.spelling(self.info(id).name)
    }

    /// Kind of a binding.
    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.info(id).kind
    }

    /// Refine the kind of an implicitly declared binding from its use.
    pub fn refine_implicit(&mut self, id: SymbolId, kind: SymbolKind) {
        if let Some(info) = self.symbols.get_mut(id.index()) {
            if info.kind == SymbolKind::Implicit {
                info.kind = kind;
            }
        }
    }

    /// Declared dimensionality, if the binding is an array.
    pub fn rank(&self, id: SymbolId) -> Option<usize> {
        match self.kind(id) {
            SymbolKind::Array { rank } => Some(rank),
            _ => None,
        }
    }

    /// All bindings spelled `name`, in declaration order.
    pub fn lookup_all(&self, name: &str) -> Vec<SymbolId> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, info)| self.spelling(info.name) == name)
            .map(|(i, _)| SymbolId(i as u32))
            .collect()
    }

    /// First binding spelled `name`.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.lookup_all(name).into_iter().next()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table has no bindings.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
