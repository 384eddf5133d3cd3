//! Error types for the Seed runtime.

use std::fmt;
use std::time::Duration;

/// Frames beyond this many are summarised in rendered traces.
const MAX_RENDERED_FRAMES: usize = 32;

/// One entry of a runtime stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub unit: String,
    pub function: String,
    pub file: String,
    pub line: Option<u32>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "at {}.{}({}:{})", self.unit, self.function, self.file, line),
            None => write!(f, "at {}.{}({})", self.unit, self.function, self.file),
        }
    }
}

/// Errors that can occur while loading or running a unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The unit could not be loaded, or it lacks a usable entry point.
    #[error("{0}")]
    Load(String),

    /// A thrown value or a runtime fault, with the trace innermost first.
    #[error("{}", render_failure(.unit, .message, .trace))]
    Runtime {
        unit: String,
        message: String,
        trace: Vec<Frame>,
    },

    /// The wall-clock limit elapsed before the entry point returned.
    #[error("execution of unit {unit} exceeded the time limit of {limit:?}")]
    Timeout { unit: String, limit: Duration },
}

fn render_failure(unit: &str, message: &str, trace: &[Frame]) -> String {
    let mut out = format!("Exception in unit {}: {}", unit, message);
    for frame in trace.iter().take(MAX_RENDERED_FRAMES) {
        out.push_str("\n    ");
        out.push_str(&frame.to_string());
    }
    if trace.len() > MAX_RENDERED_FRAMES {
        out.push_str(&format!("\n    ... {} more", trace.len() - MAX_RENDERED_FRAMES));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str, line: u32) -> Frame {
        Frame {
            unit: "HelloWorld".into(),
            function: function.into(),
            file: "HelloWorld.seed".into(),
            line: Some(line),
        }
    }

    #[test]
    fn test_runtime_error_renders_trace() {
        let err = Error::Runtime {
            unit: "HelloWorld".into(),
            message: "boom".into(),
            trace: vec![frame("fail", 8), frame("main", 4)],
        };
        assert_eq!(
            err.to_string(),
            "Exception in unit HelloWorld: boom\n    at HelloWorld.fail(HelloWorld.seed:8)\n    at HelloWorld.main(HelloWorld.seed:4)"
        );
    }

    #[test]
    fn test_long_traces_are_summarised() {
        let err = Error::Runtime {
            unit: "HelloWorld".into(),
            message: "deep".into(),
            trace: (0..40).map(|_| frame("recurse", 3)).collect(),
        };
        let text = err.to_string();
        assert_eq!(text.lines().count(), 1 + MAX_RENDERED_FRAMES + 1);
        assert!(text.ends_with("... 8 more"));
    }
}
