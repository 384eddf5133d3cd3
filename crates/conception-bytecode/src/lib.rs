//! Artifact format for compiled Seed units.
//!
//! The compiler writes one `<Unit>.unit` file per compilation; the runtime
//! reads it back with [`Artifact::read_from`]. The two sides share nothing
//! but this format, the directory and the unit name.

pub mod artifact;
pub mod op;

pub use artifact::{Artifact, ArtifactError, FunctionCode, ARTIFACT_EXTENSION, FORMAT_VERSION, MAGIC};
pub use op::{Builtin, Constant, Op};
