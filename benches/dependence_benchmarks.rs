//! Benchmarks for the dependence analyzer and the loop checks.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loopsafe::analysis::analyze_dependences;
use loopsafe::config::AnalysisConfig;
use loopsafe::transform::{CheckContext, LoopSelection, Transformation};

const MATMUL: &str = r#"
    void matmul(int n, double a[100][100], double b[100][100], double c[100][100]) {
        for (int i = 0; i < n; i++) {
            for (int j = 0; j < n; j++) {
                c[i][j] = 0;
                for (int k = 0; k < n; k++) {
                    c[i][j] = c[i][j] + a[i][k] * b[k][j];
                }
            }
        }
    }
"#;

const STENCIL: &str = r#"
    void jacobi(int n, double a[100][100], double b[100][100]) {
        for (int t = 0; t < 10; t++) {
            for (int i = 1; i < n - 1; i++)
                for (int j = 1; j < n - 1; j++)
                    b[i][j] = 0.2 * (a[i][j] + a[i - 1][j] + a[i + 1][j] + a[i][j - 1] + a[i][j + 1]);
            for (int i = 1; i < n - 1; i++)
                for (int j = 1; j < n - 1; j++)
                    a[i][j] = b[i][j];
        }
    }
"#;

/// Benchmark lexing and parsing.
fn bench_parsing(c: &mut Criterion) {
    c.bench_function("lex_stencil", |b| {
        b.iter(|| {
            let lexer = loopsafe::frontend::Lexer::new(black_box(STENCIL));
            lexer.tokenize().unwrap()
        })
    });

    c.bench_function("parse_matmul", |b| b.iter(|| loopsafe::parse(black_box(MATMUL)).unwrap()));
}

/// Benchmark dependence testing over whole nests.
fn bench_dependences(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    for (name, source) in [("deps_matmul", MATMUL), ("deps_stencil", STENCIL)] {
        let unit = loopsafe::parse(source).unwrap();
        let function = &unit.functions[0];
        c.bench_function(name, |b| {
            b.iter(|| analyze_dependences(&unit, function, black_box(function.statements()), &config).unwrap())
        });
    }
}

/// Benchmark complete checks, analysis included.
fn bench_checks(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    let unit = loopsafe::parse(MATMUL).unwrap();
    let function = &unit.functions[0];
    let ctx = CheckContext::new(&unit, function, &config);
    let selection = LoopSelection::outermost(function)[0];

    c.bench_function("check_parallelize_matmul", |b| {
        b.iter(|| Transformation::Parallelize.check(&ctx, black_box(&selection)).unwrap())
    });
    c.bench_function("check_interchange_matmul", |b| {
        b.iter(|| Transformation::Interchange { depth: 1 }.check(&ctx, black_box(&selection)).unwrap())
    });
}

criterion_group!(benches, bench_parsing, bench_dependences, bench_checks);
criterion_main!(benches);
