//! The `.unit` artifact written by the compiler and read by the runtime.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::op::{Constant, Op};

/// Marker stored in every artifact.
pub const MAGIC: &str = "conception-unit";
/// Artifact format revision understood by this crate.
pub const FORMAT_VERSION: u32 = 1;
/// File extension of compiled artifacts.
pub const ARTIFACT_EXTENSION: &str = "unit";

/// Errors raised while reading or writing artifacts
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact {} not found", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to access artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} is not a unit artifact", .path.display())]
    BadMagic { path: PathBuf },

    #[error("artifact format version {found} is not supported (expected {})", FORMAT_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("artifact declares unit `{found}` but `{expected}` was requested")]
    UnitMismatch { expected: String, found: String },
}

/// Compiled code of one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCode {
    pub name: String,
    pub arity: u32,
    /// Local slots, parameters included
    pub locals: u32,
    pub code: Vec<Op>,
    /// Source line of each instruction in `code`
    pub lines: Vec<u32>,
}

impl FunctionCode {
    pub fn line_at(&self, ip: usize) -> Option<u32> {
        self.lines.get(ip).copied()
    }
}

/// A compiled unit as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub magic: String,
    pub format_version: u32,
    pub unit: String,
    pub source_file: String,
    pub constants: Vec<Constant>,
    pub functions: Vec<FunctionCode>,
}

impl Artifact {
    pub fn new(unit: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            magic: MAGIC.to_string(),
            format_version: FORMAT_VERSION,
            unit: unit.into(),
            source_file: source_file.into(),
            constants: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Path of the artifact for `unit` inside `dir`.
    pub fn path_in(dir: &Path, unit: &str) -> PathBuf {
        dir.join(format!("{}.{}", unit, ARTIFACT_EXTENSION))
    }

    pub fn function(&self, name: &str) -> Option<(usize, &FunctionCode)> {
        self.functions.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Write the artifact to `<dir>/<unit>.unit`, returning the path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ArtifactError> {
        let path = Self::path_in(dir, &self.unit);
        let json = serde_json::to_vec(self).map_err(|source| ArtifactError::Malformed {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Read and validate the artifact for `unit` from `dir`.
    pub fn read_from(dir: &Path, unit: &str) -> Result<Self, ArtifactError> {
        let path = Self::path_in(dir, unit);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound { path });
            }
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };
        let artifact: Artifact = serde_json::from_slice(&bytes).map_err(|source| {
            ArtifactError::Malformed {
                path: path.clone(),
                source,
            }
        })?;

        if artifact.magic != MAGIC {
            return Err(ArtifactError::BadMagic { path });
        }
        if artifact.format_version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: artifact.format_version,
            });
        }
        if artifact.unit != unit {
            return Err(ArtifactError::UnitMismatch {
                expected: unit.to_string(),
                found: artifact.unit,
            });
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Artifact {
        let mut artifact = Artifact::new("HelloWorld", "HelloWorld.seed");
        artifact.constants.push(Constant::Str("hi".into()));
        artifact.functions.push(FunctionCode {
            name: "main".into(),
            arity: 1,
            locals: 1,
            code: vec![Op::Const(0), Op::Null, Op::Return],
            lines: vec![2, 3, 3],
        });
        artifact
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample().write_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("HelloWorld.unit"));

        let loaded = Artifact::read_from(dir.path(), "HelloWorld").unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.function("main").map(|(i, _)| i), Some(0));
        assert_eq!(loaded.functions[0].line_at(1), Some(3));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = Artifact::read_from(dir.path(), "Nope").unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }), "{:?}", err);
    }

    #[test]
    fn test_rejects_foreign_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = sample();
        artifact.magic = "something-else".into();
        artifact.write_to(dir.path()).unwrap();

        let err = Artifact::read_from(dir.path(), "HelloWorld").unwrap_err();
        assert!(matches!(err, ArtifactError::BadMagic { .. }), "{:?}", err);
    }

    #[test]
    fn test_rejects_future_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = sample();
        artifact.format_version = FORMAT_VERSION + 1;
        artifact.write_to(dir.path()).unwrap();

        let err = Artifact::read_from(dir.path(), "HelloWorld").unwrap_err();
        assert!(matches!(err, ArtifactError::UnsupportedVersion { .. }), "{:?}", err);
    }

    #[test]
    fn test_rejects_renamed_file() {
        let dir = tempfile::tempdir().unwrap();
        sample().write_to(dir.path()).unwrap();
        fs::rename(
            dir.path().join("HelloWorld.unit"),
            dir.path().join("Other.unit"),
        )
        .unwrap();

        let err = Artifact::read_from(dir.path(), "Other").unwrap_err();
        assert!(matches!(err, ArtifactError::UnitMismatch { .. }), "{:?}", err);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Junk.unit"), b"not json").unwrap();
        let err = Artifact::read_from(dir.path(), "Junk").unwrap_err();
        assert!(matches!(err, ArtifactError::Malformed { .. }), "{:?}", err);
    }
}
