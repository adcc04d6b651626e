//! Integration tests: C source through parsing, dependence analysis and
//! the transformation checks.

use loopsafe::analysis::{analyze_dependences, DependenceAnalysis, DependenceType, Direction};
use loopsafe::config::AnalysisConfig;
use loopsafe::frontend::TranslationUnit;
use loopsafe::transform::{CheckContext, LoopSelection, Status, Transformation};
use loopsafe::utils::errors::AnalysisError;
use loopsafe::utils::CancellationToken;
use loopsafe::{parse, run, Request};

fn analyze_first_loop(unit: &TranslationUnit, config: &AnalysisConfig) -> DependenceAnalysis {
    let function = &unit.functions[0];
    let selection = LoopSelection::outermost(function)[0];
    analyze_dependences(unit, function, std::slice::from_ref(selection.stmt()), config).expect("analysis failed")
}

fn check_first_loop(source: &str, transformation: Transformation) -> Status {
    let unit = parse(source).expect("Failed to parse");
    let config = AnalysisConfig::default();
    let function = &unit.functions[0];
    let ctx = CheckContext::new(&unit, function, &config);
    let selection = LoopSelection::outermost(function)[0];
    transformation.check(&ctx, &selection).expect("check failed")
}

#[test]
fn test_recurrence_pipeline() {
    let source = r#"
        void smooth(int n, double a[]) {
            for (int i = 1; i < n; i++)
                a[i] = a[i - 1] + 1;
        }
    "#;

    let unit = parse(source).expect("Failed to parse");
    assert_eq!(unit.functions.len(), 1);
    assert_eq!(unit.functions[0].name, "smooth");

    let analysis = analyze_first_loop(&unit, &AnalysisConfig::default());
    let deps = analysis.dependences();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].kind, DependenceType::Flow);
    assert_eq!(deps[0].direction, vec![Direction::Lt]);
    assert_eq!(deps[0].level(), 1);
    assert!(deps[0].source.is_write);
    assert!(deps[0].sink.is_read());

    let status = check_first_loop(source, Transformation::Parallelize);
    assert!(status.has_error());
    assert!(status.contains("This loop cannot be parallelized because it carries a dependence."));
}

#[test]
fn test_recurrence_from_zero() {
    // The first iteration reads a[-1], which no iteration writes.
    let source = r#"
        void smooth(int n, double a[]) {
            for (int i = 0; i < n; i++)
                a[i] = a[i - 1] + 1;
        }
    "#;

    let unit = parse(source).expect("Failed to parse");
    let analysis = analyze_first_loop(&unit, &AnalysisConfig::default());
    let vectors: Vec<_> = analysis
        .dependences()
        .iter()
        .map(|d| (d.kind, d.direction.clone(), d.level()))
        .collect();
    assert_eq!(vectors, vec![(DependenceType::Flow, vec![Direction::Lt], 1)]);
    assert!(analysis.has_level1_carried_dependence());

    let status = check_first_loop(source, Transformation::Parallelize);
    assert!(status.contains("This loop cannot be parallelized because it carries a dependence."));
}

#[test]
fn test_independent_loop_parallelizes() {
    let source = r#"
        void scale(int n, double a[], double b[]) {
            for (int i = 0; i < n; i++)
                b[i] = a[i] * 2;
        }
    "#;
    let unit = parse(source).unwrap();
    let analysis = analyze_first_loop(&unit, &AnalysisConfig::default());
    assert!(analysis.dependences().is_empty());
    assert!(check_first_loop(source, Transformation::Parallelize).is_ok());
}

#[test]
fn test_fusion_with_renamed_index() {
    let source = r#"
        void pair(int n, double a[], double b[]) {
            for (int i = 0; i < n; i++)
                a[i] = 0;
            for (int j = 0; j < n; j++)
                b[j] = a[j];
        }
    "#;
    let status = check_first_loop(source, Transformation::Fuse);
    assert!(status.is_ok(), "{}", status);
    assert!(status.diagnostics().is_empty());
}

#[test]
fn test_fusion_prevented_by_backward_dependence() {
    let source = r#"
        void pair(int n, double a[], double b[]) {
            for (int i = 0; i < n; i++)
                a[i] = 0;
            for (int j = 0; j < n; j++)
                b[j] = a[j + 1];
        }
    "#;
    let status = check_first_loop(source, Transformation::Fuse);
    assert!(status.contains("A dependence in the loops is fusion-preventing"));
}

#[test]
fn test_interchange_forward_inner_dependence() {
    // (=, <) stays valid as (<, =)
    let source = r#"
        void sweep(int n, int m, double a[100][100]) {
            for (int i = 0; i < n; i++)
                for (int j = 1; j < m; j++)
                    a[i][j] = a[i][j - 1];
        }
    "#;
    let unit = parse(source).unwrap();
    let analysis = analyze_first_loop(&unit, &AnalysisConfig::default());
    let vectors: Vec<_> = analysis.dependences().iter().map(|d| d.direction.clone()).collect();
    assert_eq!(vectors, vec![vec![Direction::Eq, Direction::Lt]]);

    let status = check_first_loop(source, Transformation::Interchange { depth: 1 });
    assert!(status.is_ok(), "{}", status);
}

#[test]
fn test_interchange_diagonal_dependence_rejected() {
    let source = r#"
        void wave(double a[100][100]) {
            for (int i = 1; i < 50; i++)
                for (int j = 0; j < 50; j++)
                    a[i][j] = a[i - 1][j + 1];
        }
    "#;
    let unit = parse(source).unwrap();
    let analysis = analyze_first_loop(&unit, &AnalysisConfig::default());
    assert!(analysis
        .dependences()
        .iter()
        .any(|d| d.direction == vec![Direction::Lt, Direction::Gt]));

    let status = check_first_loop(source, Transformation::Interchange { depth: 1 });
    assert!(status.has_error());
    let tiled = check_first_loop(source, Transformation::Tile { width: 8, height: 8 });
    assert!(tiled.has_error());
}

#[test]
fn test_scalar_roles() {
    let source = r#"
        void sum(int n, double s, double a[]) {
            for (int i = 0; i < n; i++)
                s = s + a[i];
        }
    "#;
    let unit = parse(source).unwrap();
    let analysis = analyze_first_loop(&unit, &AnalysisConfig::default());
    let s = unit.symbols.lookup("s").unwrap();
    let mut kinds: Vec<_> = analysis
        .dependences()
        .iter()
        .filter(|d| d.source.symbol == s)
        .map(|d| d.kind)
        .collect();
    kinds.sort();
    kinds.dedup();
    assert_eq!(kinds, vec![DependenceType::Flow, DependenceType::Anti, DependenceType::Output]);
    assert!(analysis.dependences_of_kind(DependenceType::Input).next().is_none());
}

#[test]
fn test_distribution() {
    let independent = r#"
        void two(int n, double a[], double b[], double c[]) {
            for (int i = 0; i < n; i++) {
                a[i] = c[i];
                b[i] = a[i] + 1;
            }
        }
    "#;
    assert!(check_first_loop(independent, Transformation::Distribute).is_ok());

    let backward = r#"
        void two(int n, double a[], double b[], double c[]) {
            for (int i = 1; i < n; i++) {
                b[i] = a[i - 1];
                a[i] = c[i];
            }
        }
    "#;
    let status = check_first_loop(backward, Transformation::Distribute);
    assert!(status.contains("Distribution cannot be performed because the loop carries a dependence."));
}

#[test]
fn test_strip_mine_and_unroll() {
    let source = "void f(double a[]) { for (int i = 0; i < 16; i++) a[i] = 0; }";
    assert!(check_first_loop(
        source,
        Transformation::StripMine {
            factor: 4,
            new_name: Some("i_strip".to_string())
        }
    )
    .is_ok());
    assert!(check_first_loop(source, Transformation::Unroll { factor: 4 }).is_ok());
    assert!(check_first_loop(source, Transformation::Unroll { factor: 17 }).has_fatal_error());
}

#[test]
fn test_unknown_call_is_conservative() {
    let source = r#"
        void f(int n, double a[]) {
            for (int i = 0; i < n; i++)
                update(a);
        }
    "#;
    let status = check_first_loop(source, Transformation::Parallelize);
    assert!(status.has_error());

    let whitelisted = source.replace("update(a)", "a[i] = sqrt(a[i])");
    assert!(check_first_loop(&whitelisted, Transformation::Parallelize).is_ok());
}

#[test]
fn test_whitelist_from_config() {
    let source = r#"
        void f(int n, double a[], double b[]) {
            for (int i = 0; i < n; i++)
                b[i] = pure_helper(a[i]);
        }
    "#;
    let unit = parse(source).unwrap();
    let function = &unit.functions[0];
    let selection = LoopSelection::outermost(function)[0];

    let config = AnalysisConfig::from_json_str(r#"{ "function_whitelist": ["pure_helper"] }"#).unwrap();
    let ctx = CheckContext::new(&unit, function, &config);
    let status = Transformation::Parallelize.check(&ctx, &selection).unwrap();
    assert!(status.is_ok(), "{}", status);
}

#[test]
fn test_strict_subscripts() {
    let source = r#"
        void gather(int n, double a[], int idx[]) {
            for (int i = 0; i < n; i++)
                a[idx[i]] = a[idx[i]] + 1;
        }
    "#;
    let unit = parse(source).unwrap();
    let function = &unit.functions[0];
    let selection = LoopSelection::outermost(function)[0];

    let lenient = analyze_first_loop(&unit, &AnalysisConfig::default());
    assert!(lenient.dependences().iter().any(|d| d.direction == vec![Direction::Any]));

    let strict = AnalysisConfig::default().strict_subscripts(true);
    let err = analyze_dependences(&unit, function, std::slice::from_ref(selection.stmt()), &strict).unwrap_err();
    assert!(matches!(err, AnalysisError::Unsupported(_)));

    let ctx = CheckContext::new(&unit, function, &strict);
    let status = Transformation::Parallelize.check(&ctx, &selection).unwrap();
    assert!(status
        .diagnostics()
        .iter()
        .any(|d| d.message.starts_with("Dependences could not be analyzed")));
}

#[test]
fn test_cancelled_check() {
    let unit = parse("void f(int n, double a[]) { for (int i = 0; i < n; i++) a[i] = 0; }").unwrap();
    let config = AnalysisConfig::default();
    let function = &unit.functions[0];
    let token = CancellationToken::new();
    token.cancel();
    let ctx = CheckContext::new(&unit, function, &config).with_token(token);
    let selection = LoopSelection::outermost(function)[0];
    let err = Transformation::Parallelize.check(&ctx, &selection).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_run_selects_loops_in_preorder() {
    let source = r#"
        void nest(int n, double a[100][100]) {
            for (int i = 0; i < n; i++)
                for (int j = 0; j < n; j++)
                    a[i][j] = 0;
        }
        void rec(int n, double b[]) {
            for (int i = 1; i < n; i++)
                b[i] = b[i - 1];
        }
    "#;
    let unit = parse(source).unwrap();
    let config = AnalysisConfig::default();

    let reports = run(&unit, &Request::default(), &config).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].function, "nest");
    assert_eq!(reports[1].summary.as_ref().unwrap().num_flow, 1);

    let request = Request {
        function: Some("nest".to_string()),
        loop_index: Some(1),
        transformation: Some(Transformation::Parallelize),
    };
    let reports = run(&unit, &request, &config).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].line, 4);
    assert!(reports[0].passed());

    let out_of_range = Request {
        function: Some("nest".to_string()),
        loop_index: Some(2),
        transformation: None,
    };
    assert!(run(&unit, &out_of_range, &config).is_err());
}

#[test]
fn test_report_serializes() {
    let unit = parse("void f(int n, double a[]) { for (int i = 1; i < n; i++) a[i] = a[i - 1]; }").unwrap();
    let request = Request {
        transformation: Some(Transformation::Unroll { factor: 2 }),
        ..Request::default()
    };
    let reports = run(&unit, &request, &AnalysisConfig::default()).unwrap();
    let json = serde_json::to_string(&reports).unwrap();
    assert!(json.contains("\"transformation\":\"unroll\""));
    assert!(json.contains("Upper bound is not a constant value"));
}
