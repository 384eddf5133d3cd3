/// Conception compiler
///
/// Turns Seed source into loadable unit artifacts. The toolchain lives
/// in-process: no external compiler is spawned.

pub mod check;
pub mod codegen;
pub mod diagnostic;
pub mod driver;
pub mod error;

pub use check::Checker;
pub use codegen::CodeGenerator;
pub use diagnostic::{Category, Diagnostic, DiagnosticSink, Severity};
pub use driver::{is_unit_name, CompileOutcome, Compiler, SourceInput, Toolchain, SOURCE_EXTENSION};
pub use error::{CompileError, Result};
