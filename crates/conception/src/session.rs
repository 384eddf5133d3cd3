//! The compile-and-run session.
//!
//! A session owns at most one scratch workspace at a time. Each cycle
//! deletes the previous workspace, creates a new one, compiles the given
//! source into it and runs the result with output captured. Whatever
//! happens along the way ends up in a [`CycleResult`]; nothing escapes as
//! an `Err` or a panic.

use std::path::PathBuf;

use conception_compiler::{diagnostic, CompileOutcome, Compiler, Diagnostic, SourceInput};
use conception_eval::{ArtifactLoader, ExecuteOutcome, Executor, FailureKind, ENTRY_POINT};
use parking_lot::Mutex;

use crate::config::{ConfigError, EngineConfig};
use crate::workspace::{ScratchWorkspace, WorkspaceError, WorkspaceHandle};

/// Reason reported by [`CompileRunSession::try_run_cycle`] while another cycle runs
pub const BUSY_REASON: &str = "a cycle is already in progress";

/// Status line shown after a successful cycle
pub const SUCCESS_STATUS: &str = "Compiler Success!";

/// Terminal outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleResult {
    /// The source did not compile; diagnostics in emission order.
    CompileFailed { diagnostics: Vec<Diagnostic> },
    /// The unit compiled but could not be loaded or failed while running.
    RunFailed {
        kind: FailureKind,
        reason: String,
        captured: String,
    },
    /// The entry point returned normally.
    Success { captured: String },
    /// The cycle stopped before compiling: no toolchain, a workspace
    /// failure, or another cycle holding the session.
    Aborted { reason: String },
}

impl CycleResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleResult::Success { .. })
    }

    /// Output the unit wrote, if it ran at all.
    pub fn captured(&self) -> Option<&str> {
        match self {
            CycleResult::Success { captured } | CycleResult::RunFailed { captured, .. } => Some(captured),
            _ => None,
        }
    }

    /// One-line summary for the user.
    pub fn status_line(&self) -> String {
        match self {
            CycleResult::Success { .. } => SUCCESS_STATUS.to_string(),
            CycleResult::CompileFailed { diagnostics } => {
                let errors = diagnostics.iter().filter(|d| d.is_error()).count();
                format!("Compilation failed with {} error(s)", errors)
            }
            CycleResult::RunFailed { kind, reason, .. } => {
                let summary = reason.lines().next().unwrap_or_default();
                match kind {
                    FailureKind::Load => format!("Load failed: {}", summary),
                    FailureKind::Runtime => format!("Run failed: {}", summary),
                    FailureKind::Timeout => format!("Run timed out: {}", summary),
                }
            }
            CycleResult::Aborted { reason } => format!("ERROR: {}", reason),
        }
    }

    /// Full detail: rendered diagnostics or the complete failure reason.
    pub fn detail(&self) -> Option<String> {
        match self {
            CycleResult::CompileFailed { diagnostics } => Some(diagnostic::render(diagnostics)),
            CycleResult::RunFailed { reason, .. } | CycleResult::Aborted { reason } => Some(reason.clone()),
            CycleResult::Success { .. } => None,
        }
    }
}

/// Where the last cycle got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    WorkspaceReady,
    Compiled,
    Executed,
    Failed,
}

struct Live {
    workspace: Option<WorkspaceHandle>,
    state: SessionState,
}

/// Runs compile-and-execute cycles, one at a time.
pub struct CompileRunSession {
    unit_name: String,
    scratch: ScratchWorkspace,
    compiler: Compiler,
    executor: Executor,
    invalid: Option<ConfigError>,
    live: Mutex<Live>,
}

impl CompileRunSession {
    /// Build a session from `config`.
    ///
    /// An invalid config leaves the session not ready; its cycles abort
    /// before touching the filesystem.
    pub fn new(config: &EngineConfig) -> Self {
        let invalid = config.validate().err();
        if let Some(e) = &invalid {
            tracing::warn!("{}", e);
        }
        Self {
            unit_name: config.unit_name.clone(),
            scratch: config.scratch_workspace(),
            compiler: Compiler::locate(&config.toolchain),
            executor: Executor::with_limits(config.execution.limits()),
            invalid,
            live: Mutex::new(Live {
                workspace: None,
                state: SessionState::Idle,
            }),
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Whether the compiler toolchain is usable.
    pub fn is_ready(&self) -> bool {
        self.invalid.is_none() && self.compiler.is_initialized()
    }

    pub fn state(&self) -> SessionState {
        self.live.lock().state
    }

    /// Directory of the current workspace, if one is alive.
    pub fn workspace_path(&self) -> Option<PathBuf> {
        self.live.lock().workspace.as_ref().map(|w| w.path().to_path_buf())
    }

    /// Compile and run `source`, waiting for any cycle already in progress.
    pub fn run_cycle(&self, source: &str) -> CycleResult {
        self.run_cycle_with_args(source, &[])
    }

    /// Like [`run_cycle`](Self::run_cycle), passing `args` to the entry point.
    pub fn run_cycle_with_args(&self, source: &str, args: &[String]) -> CycleResult {
        let mut live = self.live.lock();
        self.cycle(&mut live, source, args)
    }

    /// Like [`run_cycle`](Self::run_cycle), but refuses instead of waiting.
    pub fn try_run_cycle(&self, source: &str) -> CycleResult {
        match self.live.try_lock() {
            Some(mut live) => self.cycle(&mut live, source, &[]),
            None => {
                tracing::debug!("refusing cycle: {}", BUSY_REASON);
                CycleResult::Aborted {
                    reason: BUSY_REASON.to_string(),
                }
            }
        }
    }

    /// Delete the current workspace; the session stays usable.
    pub fn shutdown(&self) -> Result<(), WorkspaceError> {
        let mut live = self.live.lock();
        self.scratch.destroy(live.workspace.as_ref())?;
        live.workspace = None;
        live.state = SessionState::Idle;
        tracing::info!("session shut down");
        Ok(())
    }

    fn cycle(&self, live: &mut Live, source: &str, args: &[String]) -> CycleResult {
        tracing::info!("starting cycle for unit {}", self.unit_name);

        if let Some(e) = &self.invalid {
            return self.abort(live, e.to_string());
        }
        if !self.compiler.is_initialized() {
            return self.abort(live, "compiler unavailable: no toolchain was located".to_string());
        }

        if let Err(e) = self.scratch.destroy(live.workspace.as_ref()) {
            tracing::error!("{}", e);
            return self.abort(live, e.to_string());
        }
        live.workspace = None;
        live.state = SessionState::Idle;

        let handle = match self.scratch.create() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("{}", e);
                return self.abort(live, e.to_string());
            }
        };
        live.workspace = Some(handle.clone());
        live.state = SessionState::WorkspaceReady;

        let outcome = match self
            .compiler
            .compile(&self.unit_name, SourceInput::Text(source), handle.path())
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("{}", e);
                live.state = SessionState::Failed;
                return CycleResult::Aborted { reason: e.to_string() };
            }
        };

        match outcome {
            CompileOutcome::Success { warnings, .. } => {
                tracing::debug!("compiled {} with {} warning(s)", self.unit_name, warnings.len());
                live.state = SessionState::Compiled;
            }
            CompileOutcome::Failure { diagnostics } => {
                tracing::info!("cycle finished: compilation failed");
                live.state = SessionState::Failed;
                return CycleResult::CompileFailed { diagnostics };
            }
            CompileOutcome::Unavailable { reason } => {
                live.state = SessionState::Failed;
                return CycleResult::Aborted { reason };
            }
        }

        let artifact = ArtifactLoader::resolve(handle.path(), &self.unit_name);
        let result = match self.executor.execute(&artifact, ENTRY_POINT, args) {
            ExecuteOutcome::Success { captured } => {
                live.state = SessionState::Executed;
                CycleResult::Success { captured }
            }
            ExecuteOutcome::Failed {
                kind,
                reason,
                captured,
            } => {
                live.state = SessionState::Failed;
                CycleResult::RunFailed {
                    kind,
                    reason,
                    captured,
                }
            }
        };
        tracing::info!("cycle finished: {}", result.status_line());
        result
    }

    fn abort(&self, live: &mut Live, reason: String) -> CycleResult {
        tracing::warn!("cycle aborted: {}", reason);
        live.state = SessionState::Failed;
        CycleResult::Aborted { reason }
    }
}

impl Default for CompileRunSession {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Drop for CompileRunSession {
    fn drop(&mut self) {
        let live = self.live.get_mut();
        if let Err(e) = self.scratch.destroy(live.workspace.take().as_ref()) {
            tracing::warn!("{}", e);
        }
    }
}
