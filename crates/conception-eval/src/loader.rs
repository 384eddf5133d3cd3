//! Resolving and loading compiled units.
//!
//! [`ArtifactLoader::resolve`] only records where a unit lives; nothing is
//! read until a [`UnitLoader`] built for one execution loads it. Loaders are
//! never cached, so every execution sees the artifact currently on disk.

use std::path::{Path, PathBuf};

use conception_bytecode::{Artifact, Constant, FunctionCode, Op};

use crate::error::Error;
use crate::value::Value;
use crate::Result;

/// The location of a compiled unit: a search root plus the unit name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    search_root: PathBuf,
    unit: String,
}

impl ArtifactHandle {
    pub fn search_root(&self) -> &Path {
        &self.search_root
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Path of the artifact file the handle refers to.
    pub fn artifact_path(&self) -> PathBuf {
        Artifact::path_in(&self.search_root, &self.unit)
    }
}

/// Builds handles for compiled units.
pub struct ArtifactLoader;

impl ArtifactLoader {
    /// Resolve `unit_name` under `output_dir` without touching the filesystem.
    pub fn resolve(output_dir: &Path, unit_name: &str) -> ArtifactHandle {
        ArtifactHandle {
            search_root: output_dir.to_path_buf(),
            unit: unit_name.to_string(),
        }
    }
}

/// Loads units from a single search root.
pub struct UnitLoader {
    root: PathBuf,
}

impl UnitLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read, validate and verify the artifact for `unit`.
    pub fn load(&self, unit: &str) -> Result<LoadedUnit> {
        let artifact = Artifact::read_from(&self.root, unit)
            .map_err(|e| Error::Load(format!("cannot load unit {}: {}", unit, e)))?;
        verify(&artifact).map_err(|problem| {
            Error::Load(format!("cannot load unit {}: malformed artifact: {}", unit, problem))
        })?;

        let constants = artifact
            .constants
            .iter()
            .map(|constant| match constant {
                Constant::Int(n) => Value::Int(*n),
                Constant::Float(n) => Value::Float(*n),
                Constant::Str(s) => Value::string(s.as_str()),
            })
            .collect();

        tracing::debug!(
            "loaded unit {} ({} function(s)) from {}",
            unit,
            artifact.functions.len(),
            self.root.display()
        );
        Ok(LoadedUnit { artifact, constants })
    }
}

/// A unit ready to run.
pub struct LoadedUnit {
    artifact: Artifact,
    constants: Vec<Value>,
}

impl LoadedUnit {
    pub fn name(&self) -> &str {
        &self.artifact.unit
    }

    pub fn source_file(&self) -> &str {
        &self.artifact.source_file
    }

    pub fn function(&self, index: usize) -> &FunctionCode {
        &self.artifact.functions[index]
    }

    pub fn constant(&self, index: usize) -> Value {
        self.constants[index].clone()
    }

    /// Find the entry point `name`, which must take exactly `arity` parameters.
    pub fn entry_point(&self, name: &str, arity: u32) -> Result<usize> {
        let Some((index, function)) = self.artifact.function(name) else {
            return Err(Error::Load(format!(
                "unit {} has no entry point `{}`",
                self.name(),
                name
            )));
        };
        if function.arity != arity {
            return Err(Error::Load(format!(
                "entry point `{}` of unit {} must take exactly {} parameter(s), found {}",
                name,
                self.name(),
                arity,
                function.arity
            )));
        }
        Ok(index)
    }
}

/// Check every index an instruction carries, so the interpreter can rely on them.
fn verify(artifact: &Artifact) -> std::result::Result<(), String> {
    for function in &artifact.functions {
        if function.lines.len() != function.code.len() {
            return Err(format!("line table of `{}` does not match its code", function.name));
        }
        if function.arity > function.locals {
            return Err(format!("`{}` has fewer locals than parameters", function.name));
        }
        let len = function.code.len() as u32;
        for (ip, op) in function.code.iter().enumerate() {
            let valid = match *op {
                Op::Const(index) => (index as usize) < artifact.constants.len(),
                Op::Load(slot) | Op::Store(slot) => slot < function.locals,
                Op::Jump(target) | Op::JumpIfFalse(target) => target < len,
                Op::Call { function: callee, argc } => artifact
                    .functions
                    .get(callee as usize)
                    .is_some_and(|f| f.arity == argc),
                Op::CallBuiltin { builtin, argc } => builtin.accepts(argc as usize),
                _ => true,
            };
            if !valid {
                return Err(format!("invalid instruction {:?} at `{}`+{}", op, function.name, ip));
            }
        }
        if !matches!(function.code.last(), Some(Op::Return | Op::Jump(_) | Op::Throw)) {
            return Err(format!("`{}` does not end in a return", function.name));
        }
    }
    Ok(())
}
