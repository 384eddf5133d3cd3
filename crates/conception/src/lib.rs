//! Conception: edit, compile and immediately run a Seed unit.
//!
//! A [`CompileRunSession`] takes source text, writes it into a fresh
//! scratch workspace, compiles it in-process, loads the resulting unit and
//! runs its `main` with stdout and stderr captured. The caller always gets
//! back a [`CycleResult`].

pub mod config;
pub mod session;
pub mod workspace;

pub use config::{ConfigError, EngineConfig, ExecutionConfig, WorkspaceConfig};
pub use conception_compiler::{Diagnostic, Severity};
pub use conception_eval::FailureKind;
pub use session::{CompileRunSession, CycleResult, SessionState, BUSY_REASON, SUCCESS_STATUS};
pub use workspace::{ScratchWorkspace, WorkspaceError, WorkspaceHandle};

/// Program a fresh session starts with.
pub const SAMPLE_PROGRAM: &str = "unit HelloWorld {
    fun main(args) {
        println(\"Hello, World\");
    }
}
";
