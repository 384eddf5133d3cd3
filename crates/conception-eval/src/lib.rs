//! Seed runtime: loads compiled units and runs them.
//!
//! Output written by unit code goes through the process-wide routes in
//! [`stdio`], which an [`Executor`] redirects into a buffer for the length
//! of one execution. Exceptions and runtime faults are modeled as
//! `Error::Runtime` and propagate using Rust's `?` operator.

pub mod stdio;

mod error;
mod executor;
mod interpreter;
mod loader;
mod value;

pub use error::{Error, Frame};
pub use executor::{ExecuteOutcome, Executor, FailureKind, ENTRY_POINT, ENTRY_POINT_ARITY};
pub use interpreter::{ExecutionLimits, Interpreter};
pub use loader::{ArtifactHandle, ArtifactLoader, LoadedUnit, UnitLoader};
pub use value::Value;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
