pub mod ast;

// Include generated parser code from lalrpop
#[allow(clippy::all)]
mod seed {
    include!(concat!(env!("OUT_DIR"), "/seed.rs"));
}

pub use ast::*;

use lalrpop_util::lexer::Token;

/// A malformed literal rejected while parsing (bad escape, integer overflow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralError {
    pub message: &'static str,
    pub span: Span,
}

impl LiteralError {
    pub fn new(message: &'static str, span: Span) -> Self {
        Self { message, span }
    }
}

/// Syntax errors reported by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid token")]
    InvalidToken { span: Span },

    #[error("unexpected end of input{}", describe_expected(.expected))]
    UnexpectedEof { span: Span, expected: Vec<String> },

    #[error("unexpected token `{found}`{}", describe_expected(.expected))]
    UnexpectedToken {
        found: String,
        span: Span,
        expected: Vec<String>,
    },

    #[error("{message}")]
    InvalidLiteral { message: String, span: Span },
}

impl ParseError {
    /// Source range the error points at
    pub fn span(&self) -> Span {
        match self {
            ParseError::InvalidToken { span }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::UnexpectedToken { span, .. }
            | ParseError::InvalidLiteral { span, .. } => *span,
        }
    }
}

impl<'input> From<lalrpop_util::ParseError<usize, Token<'input>, LiteralError>> for ParseError {
    fn from(error: lalrpop_util::ParseError<usize, Token<'input>, LiteralError>) -> Self {
        use lalrpop_util::ParseError as Lalrpop;

        match error {
            Lalrpop::InvalidToken { location } => ParseError::InvalidToken {
                span: Span::new(location, location + 1),
            },
            Lalrpop::UnrecognizedEof { location, expected } => ParseError::UnexpectedEof {
                span: Span::new(location, location),
                expected: expected.iter().map(|t| terminal_name(t)).collect(),
            },
            Lalrpop::UnrecognizedToken {
                token: (start, token, end),
                expected,
            } => ParseError::UnexpectedToken {
                found: token.1.to_string(),
                span: Span::new(start, end),
                expected: expected.iter().map(|t| terminal_name(t)).collect(),
            },
            Lalrpop::ExtraToken {
                token: (start, token, end),
            } => ParseError::UnexpectedToken {
                found: token.1.to_string(),
                span: Span::new(start, end),
                expected: Vec::new(),
            },
            Lalrpop::User { error } => ParseError::InvalidLiteral {
                message: error.message.to_string(),
                span: error.span,
            },
        }
    }
}

/// Turn lalrpop's terminal spelling (`"\";\""`, `r#"[0-9]+"#`) into something readable.
fn terminal_name(terminal: &str) -> String {
    if terminal.starts_with('"') && terminal.ends_with('"') && terminal.len() >= 2 {
        return format!("`{}`", &terminal[1..terminal.len() - 1]);
    }
    if terminal.contains("A-Za-z") {
        "identifier".to_string()
    } else if terminal.contains("[0-9]+\\.") {
        "float".to_string()
    } else if terminal.contains("[0-9]") {
        "integer".to_string()
    } else {
        "string".to_string()
    }
}

fn describe_expected(expected: &[String]) -> String {
    match expected {
        [] => String::new(),
        [only] => format!(", expected {}", only),
        _ => format!(", expected one of {}", expected.join(", ")),
    }
}

/// Resolve the escapes of a string literal body (quotes already stripped).
pub(crate) fn unescape(raw: &str) -> Result<String, &'static str> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            _ => return Err("unknown escape sequence in string literal"),
        }
    }
    Ok(out)
}

/// Parse a Seed source file from a string
pub fn parse(input: &str) -> Result<Program<'_>, ParseError> {
    seed::ProgramParser::new()
        .parse(input)
        .map_err(ParseError::from)
}

/// Maps byte offsets to 1-based line and column numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    /// 1-based `(line, column)` of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    pub fn line(&self, offset: usize) -> usize {
        self.line_col(offset).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_body<'a>(program: &'a Program<'a>) -> &'a [Statement<'a>] {
        &program.unit.functions[0].body.statements
    }

    #[test]
    fn test_parse_empty_unit() {
        let result = parse("unit Empty {}");
        assert!(result.is_ok(), "Failed to parse empty unit: {:?}", result);

        let program = result.unwrap();
        assert_eq!(program.unit.name, "Empty");
        assert_eq!(program.unit.functions.len(), 0);
    }

    #[test]
    fn test_parse_hello_world() {
        let input = r#"
            unit HelloWorld {
                fun main(args) {
                    println("Hello, World");
                }
            }
        "#;
        let program = parse(input).expect("hello world should parse");
        assert_eq!(program.unit.name, "HelloWorld");

        let main = &program.unit.functions[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.params.len(), 1);
        assert_eq!(main.params[0].name, "args");

        match &main.body.statements[0].kind {
            StatementKind::Expr(Expr {
                kind: ExprKind::Call { callee, args, .. },
                ..
            }) => {
                assert_eq!(*callee, "println");
                assert_eq!(args.len(), 1);
                assert_eq!(args[0].kind, ExprKind::String("Hello, World".to_string()));
            }
            other => panic!("Expected call statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_multiple_functions() {
        let input = "unit U { fun a() {} fun b(x, y) { return x + y; } }";
        let program = parse(input).expect("should parse");
        assert_eq!(program.unit.functions.len(), 2);
        assert_eq!(program.unit.functions[1].params.len(), 2);
    }

    #[test]
    fn test_precedence() {
        let program = parse("unit U { fun main(args) { var x = 1 + 2 * 3; } }").unwrap();
        match &main_body(&program)[0].kind {
            StatementKind::VarDecl { init, .. } => match &init.kind {
                ExprKind::Binary { op, right, .. } => {
                    assert_eq!(*op, BinOp::Add);
                    assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
                }
                other => panic!("Expected binary, got {:?}", other),
            },
            other => panic!("Expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain_nests() {
        let input = r#"
            unit U {
                fun main(args) {
                    if a { } else if b { } else { }
                }
            }
        "#;
        let program = parse(input).unwrap();
        match &main_body(&program)[0].kind {
            StatementKind::If { else_block: Some(block), .. } => {
                assert_eq!(block.statements.len(), 1);
                assert!(matches!(
                    block.statements[0].kind,
                    StatementKind::If { else_block: Some(_), .. }
                ));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_loops_and_control_flow() {
        let input = r#"
            unit U {
                fun main(args) {
                    for var a in args { if a == "x" { break; } continue; }
                    while false { }
                    throw "boom";
                }
            }
        "#;
        let program = parse(input).unwrap();
        let body = main_body(&program);
        assert!(matches!(body[0].kind, StatementKind::ForIn { var: "a", .. }));
        assert!(matches!(body[1].kind, StatementKind::While { .. }));
        assert!(matches!(body[2].kind, StatementKind::Throw(_)));
    }

    #[test]
    fn test_index_assignment() {
        let program = parse("unit U { fun main(args) { xs[0] = 1; } }").unwrap();
        match &main_body(&program)[0].kind {
            StatementKind::Assign { target, .. } => {
                assert!(matches!(target.kind, ExprKind::Index { .. }));
                assert!(target.is_assignable());
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_comments_are_skipped() {
        let input = "// leading\nunit U { /* block */ fun main(args) { } // trailing\n}";
        assert!(parse(input).is_ok());
    }

    #[test]
    fn test_string_escapes() {
        let program = parse(r#"unit U { fun main(args) { print("a\tb\n\"c\""); } }"#).unwrap();
        match &main_body(&program)[0].kind {
            StatementKind::Expr(Expr {
                kind: ExprKind::Call { args, .. },
                ..
            }) => {
                assert_eq!(args[0].kind, ExprKind::String("a\tb\n\"c\"".to_string()));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_escape_is_literal_error() {
        let err = parse(r#"unit U { fun main(args) { print("\q"); } }"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidLiteral { .. }), "{:?}", err);
    }

    #[test]
    fn test_integer_overflow_is_literal_error() {
        let err = parse("unit U { fun main(args) { var x = 99999999999999999999; } }").unwrap_err();
        assert_eq!(err.to_string(), "integer literal is out of range");
    }

    #[test]
    fn test_missing_semicolon_reports_token() {
        let input = "unit U {\n  fun main(args) {\n    var x = 1\n  }\n}";
        let err = parse(input).unwrap_err();
        match &err {
            ParseError::UnexpectedToken { found, expected, .. } => {
                assert_eq!(found, "}");
                assert!(expected.iter().any(|e| e == "`;`"), "{:?}", expected);
            }
            other => panic!("Expected unexpected token, got {:?}", other),
        }
        let (line, _) = LineIndex::new(input).line_col(err.span().start);
        assert_eq!(line, 4);
    }

    #[test]
    fn test_unexpected_eof() {
        let err = parse("unit U { fun main(args) {").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }), "{:?}", err);
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(1), (1, 2));
        assert_eq!(index.line_col(3), (2, 1));
        assert_eq!(index.line_col(6), (3, 1));
        assert_eq!(index.line_col(8), (4, 2));
    }
}
