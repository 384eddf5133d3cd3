//! Running a resolved unit with its output captured.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::Error;
use crate::interpreter::{ExecutionLimits, Interpreter};
use crate::loader::{ArtifactHandle, UnitLoader};
use crate::stdio::Capture;
use crate::value::Value;

/// Name of the function every runnable unit must define
pub const ENTRY_POINT: &str = "main";

/// Parameters the entry point takes: the argument array
pub const ENTRY_POINT_ARITY: u32 = 1;

/// Why an execution did not complete normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The unit or its entry point could not be loaded
    Load,
    /// The unit threw, faulted or overflowed its call depth
    Runtime,
    /// The time limit elapsed
    Timeout,
}

/// Result of one execution. Captured output is kept on every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Success {
        captured: String,
    },
    Failed {
        kind: FailureKind,
        reason: String,
        captured: String,
    },
}

impl ExecuteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecuteOutcome::Success { .. })
    }

    pub fn captured(&self) -> &str {
        match self {
            ExecuteOutcome::Success { captured } | ExecuteOutcome::Failed { captured, .. } => captured,
        }
    }
}

/// Loads and runs units, one fresh loader per execution.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    limits: ExecutionLimits,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Run `entry_point` of the unit behind `handle` with `args`.
    ///
    /// Everything the unit writes to stdout or stderr is captured for the
    /// duration of the call; the previous output routes are back in place
    /// when this returns, whether the unit succeeded, failed or panicked
    /// the interpreter.
    pub fn execute(&self, handle: &ArtifactHandle, entry_point: &str, args: &[String]) -> ExecuteOutcome {
        tracing::debug!("executing {}.{} from {}", handle.unit(), entry_point, handle.search_root().display());

        run_captured(|| self.load_and_run(handle, entry_point, args))
    }

    fn load_and_run(&self, handle: &ArtifactHandle, entry_point: &str, args: &[String]) -> crate::Result<()> {
        let unit = UnitLoader::new(handle.search_root()).load(handle.unit())?;
        let entry = unit.entry_point(entry_point, ENTRY_POINT_ARITY)?;
        let argv = Value::array(args.iter().map(|arg| Value::string(arg.as_str())).collect());

        Interpreter::new(&unit, self.limits).call(entry, vec![argv])?;
        Ok(())
    }
}

/// Run `body` with output captured, turning its error or panic into a
/// failed outcome.
fn run_captured(body: impl FnOnce() -> crate::Result<()>) -> ExecuteOutcome {
    let capture = Capture::install();
    let result = panic::catch_unwind(AssertUnwindSafe(body));
    let captured = capture.finish();

    match result {
        Ok(Ok(())) => ExecuteOutcome::Success { captured },
        Ok(Err(error)) => {
            let kind = match error {
                Error::Load(_) => FailureKind::Load,
                Error::Runtime { .. } => FailureKind::Runtime,
                Error::Timeout { .. } => FailureKind::Timeout,
            };
            tracing::debug!("execution failed: {:?}", kind);
            ExecuteOutcome::Failed {
                kind,
                reason: error.to_string(),
                captured,
            }
        }
        Err(payload) => {
            let reason = format!("internal interpreter error: {}", panic_message(payload.as_ref()));
            tracing::error!("{}", reason);
            ExecuteOutcome::Failed {
                kind: FailureKind::Runtime,
                reason,
                captured,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdio::{self, Stream};

    #[test]
    fn test_interpreter_panic_becomes_runtime_failure() {
        let outcome = run_captured(|| {
            stdio::write(Stream::Stdout, "before\n").unwrap();
            panic!("slot out of range");
        });

        assert_eq!(
            outcome,
            ExecuteOutcome::Failed {
                kind: FailureKind::Runtime,
                reason: "internal interpreter error: slot out of range".to_string(),
                captured: "before\n".to_string(),
            }
        );

        // The capture was released: a new one starts empty
        let capture = Capture::install();
        stdio::write(Stream::Stdout, "after").unwrap();
        assert_eq!(capture.finish(), "after");
    }

    #[test]
    fn test_errors_keep_their_kind() {
        let outcome = run_captured(|| Err(Error::Load("no unit".to_string())));
        assert!(matches!(outcome, ExecuteOutcome::Failed { kind: FailureKind::Load, .. }));
        assert!(run_captured(|| Ok(())).is_success());
    }
}
