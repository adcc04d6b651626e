//! Property tests for the linear index model, header unification and
//! dependence classification.

use loopsafe::analysis::{
    analyze_dependences, unify_headers, DataDependence, DependenceType, Direction, LinearExpr, VariableAccess,
};
use loopsafe::config::AnalysisConfig;
use loopsafe::parse;
use loopsafe::transform::interchange::swap;
use loopsafe::transform::is_interchange_valid;
use loopsafe::utils::{Span, SymbolId, SymbolKind, SymbolTable};
use proptest::prelude::*;

fn offset(c: i64) -> String {
    match c {
        0 => String::new(),
        c if c > 0 => format!(" + {}", c),
        c => format!(" - {}", -c),
    }
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::Lt),
        Just(Direction::Eq),
        Just(Direction::Gt),
        Just(Direction::Le),
        Just(Direction::Ge),
        Just(Direction::Any),
    ]
}

fn access(symbol: SymbolId, is_write: bool, order: usize) -> VariableAccess {
    VariableAccess {
        symbol,
        is_write,
        subscripts: None,
        loops: Vec::new(),
        statement: order,
        top_level: order,
        order,
        is_declaration: false,
        span: Span::dummy(),
    }
}

/// Dependences over one array with the given (source write, sink write)
/// roles and direction vectors.
fn dependences(roles: &[(bool, bool)], vectors: Vec<Vec<Direction>>) -> Vec<DataDependence> {
    let mut symbols = SymbolTable::new();
    let a = symbols.declare("a", SymbolKind::Array { rank: 1 }, Span::dummy(), 1);
    roles
        .iter()
        .zip(vectors)
        .map(|((src, snk), dir)| DataDependence::new(access(a, *src, 0), access(a, *snk, 1), dir))
        .collect()
}

proptest! {
    #[test]
    fn prop_linear_plus_negation_is_zero(
        constant in -1_000_000i64..1_000_000,
        coeffs in prop::collection::vec(-1000i64..1000, 0..4),
    ) {
        let mut symbols = SymbolTable::new();
        let mut e = LinearExpr::constant(constant);
        for (k, c) in coeffs.iter().enumerate() {
            let s = symbols.declare(&format!("v{}", k), SymbolKind::Scalar, Default::default(), 1);
            e = e.checked_add(&LinearExpr::term(s, *c)).unwrap();
        }
        let negated = e.checked_neg().unwrap();
        prop_assert!(e.checked_add(&negated).unwrap().is_zero());
        prop_assert!(e.checked_sub(&e).unwrap().is_zero());
    }

    #[test]
    fn prop_unification_is_reflexive(
        lo in -20i64..20,
        hi in -20i64..60,
        step in 1i64..5,
        inclusive in any::<bool>(),
    ) {
        let op = if inclusive { "<=" } else { "<" };
        let source = format!(
            "void f(int a[]) {{ for (int i = {}; i {} {}; i += {}) a[i] = 0; }}",
            lo, op, hi, step
        );
        let unit = parse(&source).unwrap();
        let header = unit.functions[0].statements()[0].as_for().unwrap();
        let map = unify_headers(header, header);
        prop_assert!(map.is_some());
        prop_assert!(map.unwrap().iter().all(|(k, v)| k == v));
    }

    #[test]
    fn prop_scalar_roles_pair_with_kind(body in prop::collection::vec((any::<bool>(), 0usize..3, 0usize..3), 1..5)) {
        let names = ["x", "y", "z"];
        let stmts: Vec<String> = body
            .iter()
            .map(|(plus, dst, src)| {
                if *plus {
                    format!("{} += {};", names[*dst], names[*src])
                } else {
                    format!("{} = {} + 1;", names[*dst], names[*src])
                }
            })
            .collect();
        let source = format!(
            "void f(int n, double x, double y, double z) {{ for (int i = 0; i < n; i++) {{ {} }} }}",
            stmts.join(" ")
        );
        let unit = parse(&source).unwrap();
        let function = &unit.functions[0];
        let config = AnalysisConfig::default();
        let analysis = analyze_dependences(&unit, function, function.statements(), &config).unwrap();

        for dep in analysis.dependences() {
            let expected = match (dep.source.is_write, dep.sink.is_write) {
                (true, false) => DependenceType::Flow,
                (false, true) => DependenceType::Anti,
                (true, true) => DependenceType::Output,
                (false, false) => DependenceType::Input,
            };
            prop_assert_eq!(dep.kind, expected);
            prop_assert_eq!(dep.kind, dep.source.dependence_type_to(&dep.sink));
            prop_assert!(dep.source.same_variable(&dep.sink));
        }
        // Every written scalar is overwritten on the next iteration.
        let written = body.iter().map(|(_, dst, _)| *dst).collect::<std::collections::BTreeSet<_>>();
        for dst in written {
            let symbol = unit.symbols.lookup(names[dst]).unwrap();
            prop_assert!(analysis
                .dependences_of_kind(DependenceType::Output)
                .any(|d| d.source.symbol == symbol && d.is_loop_carried()));
        }
    }

    #[test]
    fn prop_constant_offsets_are_equal_iff_same_offset(write in -5i64..5, read in -5i64..5) {
        let source = format!(
            "void f(int n, double a[]) {{ for (int i = 10; i < n; i++) a[i{}] = a[i{}]; }}",
            offset(write),
            offset(read)
        );
        let unit = parse(&source).unwrap();
        let function = &unit.functions[0];
        let analysis = analyze_dependences(&unit, function, function.statements(), &AnalysisConfig::default()).unwrap();
        let deps = analysis.dependences();

        prop_assert!(!deps.is_empty());
        let same_iteration = deps.iter().any(|d| d.direction == vec![Direction::Eq]);
        prop_assert_eq!(same_iteration, write == read);
        if write != read {
            prop_assert!(deps.iter().all(|d| d.direction == vec![Direction::Lt]));
            let kind = if write > read { DependenceType::Flow } else { DependenceType::Anti };
            prop_assert!(deps.iter().all(|d| d.kind == kind));
        }
    }

    #[test]
    fn prop_swap_is_an_involution(dirs in prop::collection::vec(direction(), 2..5), i in 0usize..5, j in 0usize..5) {
        let result = swap(i, j, &dirs);
        if i >= dirs.len() || j >= dirs.len() {
            prop_assert!(result.is_err());
        } else {
            let swapped = result.unwrap();
            prop_assert_eq!(swapped[i], dirs[j]);
            prop_assert_eq!(swap(i, j, &swapped).unwrap(), dirs);
        }
    }

    #[test]
    fn prop_interchange_of_equal_positions_is_valid(
        mut vectors in prop::collection::vec(prop::collection::vec(direction(), 4), 1..6),
        roles in prop::collection::vec((any::<bool>(), any::<bool>()), 6),
        i in 0usize..4,
        j in 0usize..4,
    ) {
        for dir in &mut vectors {
            dir[i] = Direction::Eq;
            dir[j] = Direction::Eq;
        }
        let deps = dependences(&roles, vectors);
        prop_assert_eq!(is_interchange_valid(i, j, &deps).ok(), Some(true));
    }

    #[test]
    fn prop_input_dependences_never_block_interchange(
        vectors in prop::collection::vec(prop::collection::vec(direction(), 3), 1..6),
        i in 0usize..3,
        j in 0usize..3,
    ) {
        let roles = vec![(false, false); vectors.len()];
        let deps = dependences(&roles, vectors);
        prop_assert!(deps.iter().all(|d| d.kind == DependenceType::Input));
        prop_assert_eq!(is_interchange_valid(i, j, &deps).ok(), Some(true));
    }
}
