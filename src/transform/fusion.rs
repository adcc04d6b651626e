//! Loop fusion check.
//!
//! Fusion merges a loop with the loop that follows it:
//!
//! ```text
//! for (i = 0; i < n; i++) a[i] = b[i];
//! for (j = 0; j < n; j++) c[j] = a[j + 1];
//! ```
//! becomes
//! ```text
//! for (i = 0; i < n; i++) { a[i] = b[i]; c[i] = a[i + 1]; }
//! ```
//!
//! The headers must unify, with the second loop's names renamed to the
//! first's. The bodies are then analyzed as one fused loop: a dependence
//! carried from the second body back into the first would run against
//! its original order, as `a[i + 1]` above is read before it is written.

use crate::analysis::dependence::DependenceAnalysis;
use crate::analysis::unify::unify_headers;
use crate::frontend::ast::{referenced_symbols, walk_declarator, AstVisitor, Declarator, ForStmt, Stmt, StmtKind};
use crate::transform::{CheckContext, LoopCheck, LoopSelection, Status};
use crate::utils::errors::{AnalysisResult, Diagnostic};
use crate::utils::intern::SymbolId;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// The loop following the selected one, with the renaming that unifies it.
#[derive(Debug, Clone)]
struct SecondLoop<'a> {
    stmt: &'a Stmt,
    header: &'a ForStmt,
    /// second -> first
    renaming: BTreeMap<SymbolId, SymbolId>,
}

/// Checks that the selected loop may be fused with its next sibling.
#[derive(Debug, Clone)]
pub struct FusionCheck<'a> {
    first_stmt: &'a Stmt,
    first: &'a ForStmt,
    second: Option<SecondLoop<'a>>,
}

impl<'a> FusionCheck<'a> {
    /// Pair the selected loop with the statement after it.
    pub fn new(selection: &LoopSelection<'a>) -> AnalysisResult<Self> {
        let first_stmt = selection.stmt();
        let first = selection.for_stmt()?;
        let second = selection.next_sibling().and_then(|stmt| {
            let header = stmt.as_for()?;
            let renaming = unify_headers(first, header)?;
            Some(SecondLoop { stmt, header, renaming })
        });
        if second.is_none() {
            log::debug!("no fusable loop follows line {}", first_stmt.span.start_line);
        }
        Ok(Self {
            first_stmt,
            first,
            second,
        })
    }

    /// Whether a loop with a unifiable header follows the selected one.
    pub fn has_second_loop(&self) -> bool {
        self.second.is_some()
    }

    /// The fused loop: the first header over both bodies, with the second
    /// body renamed into the first loop's names.
    pub fn fused_loop(&self) -> Option<Stmt> {
        let second = self.second.as_ref()?;
        let mut body: Vec<Stmt> = self.first.body.statements().to_vec();
        body.extend(second.header.body.statements().iter().map(|s| {
            let mut s = s.clone();
            s.rename(&second.renaming);
            s
        }));
        let span = self.first_stmt.span.merge(&second.stmt.span);
        let header = ForStmt {
            id: self.first.id,
            init: self.first.init.clone(),
            cond: self.first.cond.clone(),
            incr: self.first.incr.clone(),
            body: Box::new(Stmt::new(StmtKind::Compound(body), span)),
        };
        let mut fused = Stmt::new(StmtKind::For(header), span);
        fused.pragmas = self.first_stmt.pragmas.clone();
        Some(fused)
    }

    /// A name declared in the first body that a use in the second body would
    /// resolve to once the bodies share a scope.
    fn name_conflict(&self, ctx: &CheckContext<'_>) -> Option<String> {
        let second = self.second.as_ref()?;
        let symbols = &ctx.unit.symbols;
        let declared_first = declared_in(&self.first.body);
        let declared_second = declared_in(&second.header.body);
        let top_level_second: BTreeSet<SymbolId> = second
            .header
            .body
            .statements()
            .iter()
            .flat_map(|s| match &s.kind {
                StmtKind::Decl(decls) => decls.iter().map(|d| d.symbol).collect(),
                _ => Vec::new(),
            })
            .collect();
        let used_second = referenced_symbols(&second.header.body);

        for decl in &declared_first {
            let name = symbols.name(*decl);
            for used in &used_second {
                if symbols.name(*used) != name {
                    continue;
                }
                // A binding declared deeper inside the second body keeps its own scope.
                let shadowed = !declared_second.contains(used) || top_level_second.contains(used);
                if shadowed {
                    return Some(name.to_string());
                }
            }
        }
        None
    }
}

fn declared_in(stmt: &Stmt) -> BTreeSet<SymbolId> {
    struct Declared(BTreeSet<SymbolId>);
    impl AstVisitor for Declared {
        fn visit_declarator(&mut self, decl: &Declarator) {
            self.0.insert(decl.symbol);
            walk_declarator(self, decl);
        }
    }
    let mut d = Declared(BTreeSet::new());
    d.visit_stmt(stmt);
    d.0
}

impl LoopCheck for FusionCheck<'_> {
    fn name(&self) -> &'static str {
        "fuse"
    }

    fn loop_stmt(&self) -> &Stmt {
        self.first_stmt
    }

    fn form_check(&self, ctx: &CheckContext<'_>, status: &mut Status) {
        let second = match &self.second {
            Some(s) => s,
            None => {
                status.add_fatal("There must be two for loops for fusion to be possible.");
                return;
            }
        };
        if let Some(name) = self.name_conflict(ctx) {
            status.add_error(format!(
                "A definition of \"{}\" in the first loop may shadow \"{}\" used in the second loop",
                name, name
            ));
            return;
        }
        let first_pragmas = &self.first_stmt.pragmas;
        let second_pragmas = &second.stmt.pragmas;
        let empty = first_pragmas.is_empty() && second_pragmas.is_empty();
        if !empty && first_pragmas != second_pragmas {
            status.add_fatal(
                "When a loop has a pragma associated with it, it cannot be fused unless both loops have identical pragmas.",
            );
        }
    }

    fn dependence_region(&self) -> Cow<'_, [Stmt]> {
        match self.fused_loop() {
            Some(fused) => Cow::Owned(vec![fused]),
            None => Cow::Borrowed(std::slice::from_ref(self.first_stmt)),
        }
    }

    fn dependence_check(
        &self,
        ctx: &CheckContext<'_>,
        analysis: &DependenceAnalysis,
        status: &mut Status,
    ) -> AnalysisResult<()> {
        let first_len = self.first.body.statements().len();
        let preventing = analysis.dependences().iter().find(|d| {
            d.kind.is_true_dependence()
                && d.level() == 1
                && d.direction_at(1).map_or(false, |dir| dir.may_be_forward())
                && d.source.top_level >= first_len
                && d.sink.top_level < first_len
        });
        if let Some(dep) = preventing {
            log::debug!("fusion-preventing: {}", dep.description(&ctx.unit.symbols));
            status.add(Diagnostic::error("A dependence in the loops is fusion-preventing").with_span(dep.sink.span));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::{loops, with_context};

    fn fuse(src: &str) -> Status {
        with_context(src, |ctx| {
            let sel = loops(ctx)[0];
            FusionCheck::new(&sel).unwrap().check(ctx).unwrap()
        })
    }

    #[test]
    fn test_independent_loops_fuse() {
        let status = fuse(
            "void f(int n, int a[], int b[], int c[], int d[]) {
                for (int i = 0; i < n; i++) a[i] = b[i];
                for (int j = 0; j < n; j++) c[j] = d[j];
            }",
        );
        assert!(status.is_ok(), "{}", status);
    }

    #[test]
    fn test_forward_dependence_survives_fusion() {
        let status = fuse(
            "void f(int n, int a[], int b[], int c[]) {
                for (int i = 1; i < n; i++) a[i] = b[i];
                for (int j = 1; j < n; j++) c[j] = a[j - 1];
            }",
        );
        assert!(status.is_ok(), "{}", status);
    }

    #[test]
    fn test_backward_dependence_prevents_fusion() {
        let status = fuse(
            "void f(int n, int a[], int b[], int c[]) {
                for (int i = 0; i < n; i++) a[i] = b[i];
                for (int j = 0; j < n; j++) c[j] = a[j + 1];
            }",
        );
        assert!(status.contains("A dependence in the loops is fusion-preventing"));
    }

    #[test]
    fn test_headers_must_unify() {
        let status = fuse(
            "void f(int n, int a[], int b[]) {
                for (int i = 0; i < n; i++) a[i] = 0;
                for (int j = 0; j <= n; j++) b[j] = 1;
            }",
        );
        assert!(status.contains("There must be two for loops for fusion to be possible."));
        assert!(status.has_fatal_error());
    }

    #[test]
    fn test_last_loop_has_no_partner() {
        let status = fuse("void f(int n, int a[]) { for (int i = 0; i < n; i++) a[i] = 0; a[0] = 1; }");
        assert!(status.has_fatal_error());
    }

    #[test]
    fn test_pragmas_must_match() {
        let status = fuse(
            "void f(int n, int a[], int b[]) {
                #pragma acc parallel loop
                for (int i = 0; i < n; i++) a[i] = 0;
                for (int j = 0; j < n; j++) b[j] = 1;
            }",
        );
        assert!(status.has_fatal_error());
    }

    #[test]
    fn test_declaration_would_shadow() {
        let status = fuse(
            "void f(int n, int t, int a[], int b[]) {
                for (int i = 0; i < n; i++) { int t = i; a[i] = t; }
                for (int j = 0; j < n; j++) b[j] = t;
            }",
        );
        assert!(status.contains("A definition of \"t\" in the first loop may shadow \"t\" used in the second loop"));
    }

    #[test]
    fn test_fused_loop_renames_second_body() {
        with_context(
            "void f(int n, int a[], int b[]) {
                for (int i = 0; i < n; i++) a[i] = 0;
                for (int j = 0; j < n; j++) b[j] = 1;
            }",
            |ctx| {
                let sel = loops(ctx)[0];
                let check = FusionCheck::new(&sel).unwrap();
                assert!(check.has_second_loop());
                let fused = check.fused_loop().unwrap();
                let header = fused.as_for().unwrap();
                assert_eq!(header.body.statements().len(), 2);
                let names: BTreeSet<String> = referenced_symbols(&fused)
                    .into_iter()
                    .map(|s| ctx.unit.symbols.name(s).to_string())
                    .collect();
                assert!(!names.contains("j"));
            },
        );
    }
}
