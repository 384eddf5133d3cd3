/// Conception compiler CLI

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use conception_compiler::{CompileOutcome, Compiler, SourceInput};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    Human,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "conceptionc")]
#[command(about = "Conception compiler - turns Seed source into loadable unit artifacts")]
#[command(version)]
struct Args {
    /// Input Seed source file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output directory for the artifact (defaults to the source's directory)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// How diagnostics are printed
    #[arg(long, value_enum, default_value = "human")]
    message_format: MessageFormat,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Compilation failed: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    let Some(unit) = args.input.file_stem().and_then(|stem| stem.to_str()) else {
        bail!("cannot derive a unit name from {}", args.input.display());
    };
    let output_dir = match &args.output {
        Some(dir) => dir.clone(),
        None => args
            .input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let compiler = Compiler::new();
    let outcome = compiler
        .compile(unit, SourceInput::File(&args.input), &output_dir)
        .with_context(|| format!("compiling {}", args.input.display()))?;

    let json = args.message_format == MessageFormat::Json;
    if json {
        for diagnostic in outcome.diagnostics() {
            println!("{}", serde_json::to_string(diagnostic)?);
        }
    } else {
        for diagnostic in outcome.diagnostics() {
            eprintln!("{}", diagnostic);
        }
    }

    match outcome {
        CompileOutcome::Success { artifact, warnings } => {
            if args.verbose {
                status(json, "Compilation successful!");
                status(json, format_args!("  Source: {}", args.input.display()));
                status(json, format_args!("  Unit: {}", unit));
                status(json, format_args!("  Warnings: {}", warnings.len()));
            }
            status(json, format_args!("Wrote: {}", artifact.display()));
            Ok(true)
        }
        CompileOutcome::Failure { diagnostics } => {
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            eprintln!("Compilation failed with {} error(s)", errors);
            Ok(false)
        }
        CompileOutcome::Unavailable { reason } => bail!(reason),
    }
}

/// Progress lines go to stdout, unless stdout carries JSON diagnostics.
fn status(json: bool, line: impl std::fmt::Display) {
    if json {
        eprintln!("{}", line);
    } else {
        println!("{}", line);
    }
}
