//! Conception CLI - compile and run a Seed unit in one step.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conception::{CompileRunSession, CycleResult, EngineConfig, SAMPLE_PROGRAM};

#[derive(Parser, Debug)]
#[command(name = "conception")]
#[command(about = "Conception - compile a Seed unit and run it with its output captured")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile and run a Seed source file
    Run {
        /// Seed source file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Engine configuration file (TOML)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Unit name (defaults to the file stem)
        #[arg(long, value_name = "NAME")]
        unit: Option<String>,

        /// Arguments passed to `main`
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
    },
    /// Print the sample HelloWorld program
    Sample,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            input,
            config,
            unit,
            args,
        } => run(&input, config.as_deref(), unit, &args),
        Command::Sample => {
            print!("{}", SAMPLE_PROGRAM);
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(input: &Path, config: Option<&Path>, unit: Option<String>, args: &[String]) -> Result<bool> {
    if input.extension().and_then(|ext| ext.to_str()) != Some(conception_compiler::SOURCE_EXTENSION) {
        bail!("{} is not a .seed file", input.display());
    }

    let mut config = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let unit = match unit {
        Some(unit) => unit,
        None => input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a unit name from {}", input.display()))?,
    };
    config.unit_name = unit;
    config.validate()?;

    let source = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;

    let session = CompileRunSession::new(&config);
    let result = session.run_cycle_with_args(&source, args);
    session.shutdown().context("cleaning up the scratch workspace")?;

    if let Some(captured) = result.captured() {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(captured.as_bytes())?;
        stdout.flush()?;
    }
    if let Some(detail) = result.detail() {
        if !matches!(result, CycleResult::Aborted { .. }) {
            eprintln!("{}", detail);
        }
    }
    eprintln!("{}", result.status_line());

    Ok(result.is_success())
}
