/// Errors of the compiler itself
///
/// Problems in the compiled source are diagnostics, not errors; these
/// variants cover I/O failures and internal invariants.

use std::path::PathBuf;

use conception_bytecode::ArtifactError;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to read source file {}: {source}", .path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write source file {}: {source}", .path.display())]
    WriteSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("internal compiler error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;
