/// Structured compiler diagnostics
///
/// Every problem the toolchain finds becomes a [`Diagnostic`] with a
/// resolved file position. Diagnostics keep the order in which they were
/// emitted.

use std::fmt;

use conception_parser::{LineIndex, Span};
use serde::Serialize;

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// What kind of problem a diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Source text does not parse.
    Syntax,
    /// Declared unit name and file name disagree.
    NamingContract,
    DuplicateFunction,
    /// A unit function reuses a builtin's name.
    ShadowsBuiltin,
    DuplicateParameter,
    /// `var` declared twice in one scope.
    Redeclared,
    UndefinedVariable,
    UndefinedFunction,
    ArityMismatch,
    /// `break` or `continue` outside a loop.
    LoopControl,
    InvalidAssignment,
    UnusedVariable,
}

impl Category {
    pub fn code(self) -> &'static str {
        match self {
            Category::Syntax => "E0001",
            Category::NamingContract => "E0002",
            Category::DuplicateFunction => "E0003",
            Category::ShadowsBuiltin => "E0004",
            Category::DuplicateParameter => "E0005",
            Category::Redeclared => "E0006",
            Category::UndefinedVariable => "E0007",
            Category::UndefinedFunction => "E0008",
            Category::ArityMismatch => "E0009",
            Category::LoopControl => "E0010",
            Category::InvalidAssignment => "E0011",
            Category::UnusedVariable => "W0001",
        }
    }
}

/// A single diagnostic with a resolved source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}[{}]: {}",
            self.file,
            self.line,
            self.column,
            self.severity,
            self.category.code(),
            self.message
        )
    }
}

/// Collects diagnostics for one source file in emission order.
pub struct DiagnosticSink<'a> {
    file: &'a str,
    index: &'a LineIndex,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DiagnosticSink<'a> {
    pub fn new(file: &'a str, index: &'a LineIndex) -> Self {
        Self {
            file,
            index,
            diagnostics: Vec::new(),
        }
    }

    pub fn error(&mut self, category: Category, span: Span, message: impl Into<String>) {
        self.push(Severity::Error, category, span, message.into());
    }

    pub fn warning(&mut self, category: Category, span: Span, message: impl Into<String>) {
        self.push(Severity::Warning, category, span, message.into());
    }

    fn push(&mut self, severity: Severity, category: Category, span: Span, message: String) {
        let (line, column) = self.index.line_col(span.start);
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            message,
            file: self.file.to_string(),
            line,
            column,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Render diagnostics one per line, in order.
pub fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_position_and_code() {
        let index = LineIndex::new("unit A {\n  oops\n}");
        let mut sink = DiagnosticSink::new("A.seed", &index);
        sink.error(Category::UndefinedVariable, Span::new(11, 15), "undefined variable `oops`");
        sink.warning(Category::UnusedVariable, Span::new(0, 4), "unused");

        assert!(sink.has_errors());
        let diagnostics = sink.into_diagnostics();
        assert_eq!(
            diagnostics[0].to_string(),
            "A.seed:2:3: error[E0007]: undefined variable `oops`"
        );
        assert_eq!(
            render(&diagnostics),
            "A.seed:2:3: error[E0007]: undefined variable `oops`\nA.seed:1:1: warning[W0001]: unused"
        );
    }

    #[test]
    fn test_warnings_alone_are_not_errors() {
        let index = LineIndex::new("");
        let mut sink = DiagnosticSink::new("A.seed", &index);
        sink.warning(Category::UnusedVariable, Span::default(), "unused");
        assert!(!sink.has_errors());
    }
}
