/// Compiler driver
///
/// Runs the toolchain in-process: parse, check, generate, write the
/// artifact. Nothing is retained between calls; every `compile` works
/// only from the source it is given and the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use conception_bytecode::Artifact;
use conception_parser::{LineIndex, Span};

use crate::check::Checker;
use crate::codegen::CodeGenerator;
use crate::diagnostic::{self, Category, Diagnostic, DiagnosticSink, Severity};
use crate::error::{CompileError, Result};

/// File extension of Seed source files
pub const SOURCE_EXTENSION: &str = "seed";

/// Compiler backends known to this build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Seed,
}

impl Toolchain {
    pub const DEFAULT: &'static str = "seed";

    /// Find a backend by its configured name
    pub fn locate(name: &str) -> Option<Self> {
        match name {
            "seed" => Some(Toolchain::Seed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Toolchain::Seed => "seed",
        }
    }
}

/// Where the source to compile comes from
#[derive(Debug, Clone, Copy)]
pub enum SourceInput<'a> {
    /// A source file already on disk
    File(&'a Path),
    /// Raw text, written to `<output_dir>/<unit>.seed` before compiling
    Text(&'a str),
}

/// Result of one compilation
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutcome {
    /// The artifact was written; warnings may still have been reported
    Success {
        artifact: PathBuf,
        warnings: Vec<Diagnostic>,
    },
    /// At least one error-severity diagnostic; diagnostics in emission order
    Failure { diagnostics: Vec<Diagnostic> },
    /// No usable toolchain was located when the compiler was built
    Unavailable { reason: String },
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileOutcome::Success { .. })
    }

    /// All diagnostics carried by the outcome
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileOutcome::Success { warnings, .. } => warnings,
            CompileOutcome::Failure { diagnostics } => diagnostics,
            CompileOutcome::Unavailable { .. } => &[],
        }
    }

    /// Diagnostics rendered one per line, or the unavailability reason
    pub fn diagnostic_text(&self) -> String {
        match self {
            CompileOutcome::Unavailable { reason } => reason.clone(),
            _ => diagnostic::render(self.diagnostics()),
        }
    }
}

/// The Seed compiler
#[derive(Debug, Clone)]
pub struct Compiler {
    toolchain: Option<Toolchain>,
    requested: String,
}

impl Compiler {
    /// Create a compiler backed by the default toolchain
    pub fn new() -> Self {
        Self::locate(Toolchain::DEFAULT)
    }

    /// Create a compiler for the named toolchain; unknown names leave it uninitialized
    pub fn locate(name: &str) -> Self {
        let toolchain = Toolchain::locate(name);
        match toolchain {
            Some(found) => tracing::debug!("located toolchain `{}`", found.name()),
            None => tracing::warn!("no toolchain named `{}` is available", name),
        }
        Self {
            toolchain,
            requested: name.to_string(),
        }
    }

    /// Whether a usable toolchain was located
    pub fn is_initialized(&self) -> bool {
        self.toolchain.is_some()
    }

    pub fn toolchain(&self) -> Option<Toolchain> {
        self.toolchain
    }

    /// Compile `unit_name` from `source`, writing `<output_dir>/<unit_name>.unit`.
    ///
    /// Problems in the source come back as [`CompileOutcome::Failure`];
    /// `Err` is reserved for I/O failures and internal errors.
    pub fn compile(
        &self,
        unit_name: &str,
        source: SourceInput<'_>,
        output_dir: &Path,
    ) -> Result<CompileOutcome> {
        if self.toolchain.is_none() {
            return Ok(CompileOutcome::Unavailable {
                reason: format!("compiler unavailable: toolchain `{}` was not found", self.requested),
            });
        }

        if !is_unit_name(unit_name) {
            return Ok(CompileOutcome::Failure {
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    category: Category::NamingContract,
                    message: format!("`{}` is not a valid unit name", unit_name),
                    file: format!("{}.{}", unit_name, SOURCE_EXTENSION),
                    line: 1,
                    column: 1,
                }],
            });
        }

        fs::create_dir_all(output_dir).map_err(|source| CompileError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let path = match source {
            SourceInput::File(path) => path.to_path_buf(),
            SourceInput::Text(text) => {
                let path = output_dir.join(format!("{}.{}", unit_name, SOURCE_EXTENSION));
                fs::write(&path, text).map_err(|source| CompileError::WriteSource {
                    path: path.clone(),
                    source,
                })?;
                path
            }
        };

        let text = fs::read_to_string(&path).map_err(|source| CompileError::ReadSource {
            path: path.clone(),
            source,
        })?;

        tracing::debug!("compiling unit `{}` from {}", unit_name, path.display());
        let outcome = compile_source(unit_name, &path, &text, output_dir)?;
        match &outcome {
            CompileOutcome::Success { artifact, warnings } => tracing::debug!(
                "wrote {} ({} warning(s))",
                artifact.display(),
                warnings.len()
            ),
            CompileOutcome::Failure { diagnostics } => tracing::debug!(
                "compilation of `{}` failed with {} diagnostic(s)",
                unit_name,
                diagnostics.len()
            ),
            CompileOutcome::Unavailable { .. } => {}
        }
        Ok(outcome)
    }

    /// Where the artifact for `unit_name` lands inside `output_dir`
    pub fn compiled_code_location(output_dir: &Path, unit_name: &str) -> PathBuf {
        Artifact::path_in(output_dir, unit_name)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Seed identifier rules: a letter or `_`, then letters, digits or `_`.
///
/// Unit names become file names, so anything else is refused before a
/// path is built from it.
pub fn is_unit_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn compile_source(unit_name: &str, path: &Path, text: &str, output_dir: &Path) -> Result<CompileOutcome> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_unit = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let index = LineIndex::new(text);
    let mut sink = DiagnosticSink::new(&file_name, &index);

    if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXTENSION) {
        sink.error(
            Category::NamingContract,
            Span::default(),
            format!("source file `{}` must use the `.{}` extension", file_name, SOURCE_EXTENSION),
        );
    }
    if file_unit != unit_name {
        sink.error(
            Category::NamingContract,
            Span::default(),
            format!(
                "unit `{}` was requested but the source file is named `{}`",
                unit_name, file_name
            ),
        );
    }

    let program = match conception_parser::parse(text) {
        Ok(program) => program,
        Err(e) => {
            sink.error(Category::Syntax, e.span(), e.to_string());
            return Ok(CompileOutcome::Failure {
                diagnostics: sink.into_diagnostics(),
            });
        }
    };

    Checker::new(&mut sink).check(&program, &file_unit);
    if sink.has_errors() {
        return Ok(CompileOutcome::Failure {
            diagnostics: sink.into_diagnostics(),
        });
    }

    let artifact = CodeGenerator::new(&index, &file_name, program.unit.name).generate(&program)?;
    let artifact_path = artifact.write_to(output_dir)?;

    Ok(CompileOutcome::Success {
        artifact: artifact_path,
        warnings: sink.into_diagnostics(),
    })
}
