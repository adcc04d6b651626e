//! Binding resolution.
//!
//! The parser resolves every identifier while it builds the tree, using the
//! lexical scopes tracked here. A re-declaration in an inner scope gets a new
//! [`SymbolId`], so shadowed variables never look like the same variable to
//! the dependence engine.

use crate::utils::intern::{SymbolId, SymbolKind, SymbolTable};
use crate::utils::location::Span;
use std::collections::HashMap;

/// One lexical scope.
#[derive(Debug, Default)]
struct Scope {
    symbols: HashMap<String, SymbolId>,
}

/// Stack of lexical scopes; index 0 is file scope.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    /// Member names; one binding per spelling, whatever the struct
    fields: HashMap<String, SymbolId>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    /// A stack holding only file scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            fields: HashMap::new(),
        }
    }

    /// Current nesting depth; 0 is file scope.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Enter a block.
    pub fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Leave a block. File scope is never popped.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Declare `name` in the innermost scope.
    ///
    /// Re-declaring in the same scope replaces the visible binding.
    pub fn declare(&mut self, table: &mut SymbolTable, name: &str, kind: SymbolKind, span: Span) -> SymbolId {
        let depth = self.depth();
        let id = table.declare(name, kind, span, depth);
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name.to_string(), id);
        }
        id
    }

    /// Innermost visible binding for `name`.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name).copied())
    }

    /// Resolve a use of `name`, declaring it at file scope if nothing is visible.
    pub fn resolve(&mut self, table: &mut SymbolTable, name: &str, implicit: SymbolKind) -> SymbolId {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        log::debug!("implicitly declaring '{}' at file scope", name);
        let id = table.declare(name, implicit, Span::dummy(), 0);
        self.scopes[0].symbols.insert(name.to_string(), id);
        id
    }

    /// Binding for a struct or union member name.
    pub fn field(&mut self, table: &mut SymbolTable, name: &str) -> SymbolId {
        if let Some(id) = self.fields.get(name) {
            return *id;
        }
        let id = table.declare(name, SymbolKind::Field, Span::dummy(), 0);
        self.fields.insert(name.to_string(), id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeStack::new();
        let outer = scopes.declare(&mut table, "x", SymbolKind::Scalar, Span::dummy());
        scopes.push();
        let inner = scopes.declare(&mut table, "x", SymbolKind::Scalar, Span::dummy());
        assert_eq!(scopes.lookup("x"), Some(inner));
        assert_eq!(table.info(inner).depth, 1);
        scopes.pop();
        assert_eq!(scopes.lookup("x"), Some(outer));
    }

    #[test]
    fn test_implicit_declaration_is_file_scope() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.push();
        let n = scopes.resolve(&mut table, "n", SymbolKind::Implicit);
        scopes.pop();
        scopes.pop();
        assert_eq!(scopes.lookup("n"), Some(n));
        assert_eq!(table.info(n).depth, 0);
        assert_eq!(scopes.resolve(&mut table, "n", SymbolKind::Implicit), n);
    }

    #[test]
    fn test_fields_shared_by_name() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeStack::new();
        let x1 = scopes.field(&mut table, "x");
        let x2 = scopes.field(&mut table, "x");
        let y = scopes.field(&mut table, "y");
        assert_eq!(x1, x2);
        assert_ne!(x1, y);
        assert_eq!(table.kind(x1), SymbolKind::Field);
    }
}
