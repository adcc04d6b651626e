//! loopsafe Command Line Interface
//!
//! Usage:
//!   loopsafe [OPTIONS] <input-file>
//!   loopsafe --help
//!
//! Examples:
//!   loopsafe kernel.c                                   # Dependences of every outermost loop
//!   loopsafe --check parallelize kernel.c               # May the loops run in parallel?
//!   loopsafe --function gemm --loop 0 --check interchange --depth 2 kernel.c
//!   loopsafe --check unroll --factor 4 --json kernel.c
//!
//! Exit status: 0 when every requested check passes, 1 when a check
//! reports an error, 2 when the input could not be analyzed.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use loopsafe::config::AnalysisConfig;
use loopsafe::transform::Transformation;
use loopsafe::{LoopReport, Request};
use std::fs;
use std::path::PathBuf;
use std::process;

/// loopsafe - safety checks for C loop transformations
#[derive(Parser, Debug)]
#[command(name = "loopsafe")]
#[command(author = "loopsafe contributors")]
#[command(version)]
#[command(about = "Dependence analysis and safety checks for C loop transformations", long_about = None)]
struct Cli {
    /// C source file to analyze
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Only analyze this function
    #[arg(long, value_name = "NAME")]
    function: Option<String>,

    /// Only analyze the N-th loop of the function (preorder, 0-based)
    #[arg(long = "loop", value_name = "N")]
    loop_index: Option<usize>,

    /// What to check
    #[arg(long, default_value = "deps")]
    check: CheckKind,

    /// Nest depth of the loop to interchange with
    #[arg(long, default_value_t = 1)]
    depth: usize,

    /// Strip-mine or unroll factor
    #[arg(long, default_value_t = 2)]
    factor: i64,

    /// Tile width
    #[arg(long, default_value_t = 32)]
    width: i64,

    /// Tile height
    #[arg(long, default_value_t = 32)]
    height: i64,

    /// Name of the new strip index (strip-mine)
    #[arg(long, value_name = "NAME")]
    new_name: Option<String>,

    /// Analysis configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CheckKind {
    /// Report dependences only
    Deps,
    /// Annotate the loop as parallel
    Parallelize,
    /// Swap the loop with a perfectly nested loop
    Interchange,
    /// Fuse the loop with the next one
    Fuse,
    /// Split the loop over its body statements
    Distribute,
    /// Strip-mine the loop
    StripMine,
    /// Unroll the loop
    Unroll,
    /// Tile a two-deep nest
    Tile,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    match run(&cli) {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            process::exit(2);
        }
    }
}

/// Returns whether every requested check passed.
fn run(cli: &Cli) -> Result<bool> {
    info!("loopsafe v{}", loopsafe::VERSION);
    debug!("Input file: {:?}", cli.input);

    let config = match &cli.config {
        Some(path) => AnalysisConfig::load(path).with_context(|| format!("Failed to load config: {:?}", path))?,
        None => AnalysisConfig::default(),
    };
    debug!("Analysis config: {:?}", config);

    let unit = loopsafe::parse_file(&cli.input)?;
    let request = Request {
        function: cli.function.clone(),
        loop_index: cli.loop_index,
        transformation: transformation(cli),
    };
    let reports = loopsafe::run(&unit, &request, &config).context("Analysis failed")?;
    info!("{} loops reported", reports.len());

    let output = if cli.json {
        serde_json::to_string_pretty(&reports).context("Failed to serialize report")?
    } else {
        render(&reports)
    };
    write_output(&cli.output, &output)?;
    Ok(reports.iter().all(LoopReport::passed))
}

fn transformation(cli: &Cli) -> Option<Transformation> {
    let t = match cli.check {
        CheckKind::Deps => return None,
        CheckKind::Parallelize => Transformation::Parallelize,
        CheckKind::Interchange => Transformation::Interchange { depth: cli.depth },
        CheckKind::Fuse => Transformation::Fuse,
        CheckKind::Distribute => Transformation::Distribute,
        CheckKind::StripMine => Transformation::StripMine {
            factor: cli.factor,
            new_name: cli.new_name.clone(),
        },
        CheckKind::Unroll => Transformation::Unroll { factor: cli.factor },
        CheckKind::Tile => Transformation::Tile {
            width: cli.width,
            height: cli.height,
        },
    };
    Some(t)
}

fn render(reports: &[LoopReport]) -> String {
    if reports.is_empty() {
        return "no loops selected".to_string();
    }
    reports.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("\n")
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content).with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
