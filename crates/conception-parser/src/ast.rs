/// Abstract Syntax Tree types for Seed
///
/// These types represent the parsed structure of a Seed source file.
/// Names borrow from the input (lifetime 'input); string literals are
/// unescaped into owned strings.

/// Byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A complete Seed source file: exactly one unit declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Program<'input> {
    pub unit: UnitDecl<'input>,
}

/// Unit declaration: `unit HelloWorld { fun main(args) { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDecl<'input> {
    pub name: &'input str,
    pub name_span: Span,
    pub functions: Vec<FunctionDecl<'input>>,
}

/// Function declaration: `fun name(params) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl<'input> {
    pub name: &'input str,
    /// Span of the function name
    pub span: Span,
    pub params: Vec<Param<'input>>,
    pub body: Block<'input>,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param<'input> {
    pub name: &'input str,
    pub span: Span,
}

/// Block of statements: `{ stmt1; stmt2; ... }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block<'input> {
    pub statements: Vec<Statement<'input>>,
}

/// A statement together with the source range it covers
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'input> {
    pub kind: StatementKind<'input>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind<'input> {
    /// `var name = init;`
    VarDecl {
        name: &'input str,
        name_span: Span,
        init: Expr<'input>,
    },
    /// `target = value;` where target must be a variable or index expression
    Assign {
        target: Expr<'input>,
        value: Expr<'input>,
    },
    /// `if cond { } else { }`; `else if` nests another `If` in the else block
    If {
        condition: Expr<'input>,
        then_block: Block<'input>,
        else_block: Option<Block<'input>>,
    },
    While {
        condition: Expr<'input>,
        body: Block<'input>,
    },
    /// `for var item in items { }`
    ForIn {
        var: &'input str,
        var_span: Span,
        iter: Expr<'input>,
        body: Block<'input>,
    },
    Return(Option<Expr<'input>>),
    Break,
    Continue,
    Throw(Expr<'input>),
    Expr(Expr<'input>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr<'input> {
    pub kind: ExprKind<'input>,
    pub span: Span,
}

impl<'input> Expr<'input> {
    pub fn new(kind: ExprKind<'input>, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn binary(op: BinOp, left: Expr<'input>, right: Expr<'input>, span: Span) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    pub fn unary(op: UnOp, operand: Expr<'input>, span: Span) -> Self {
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        )
    }

    /// Whether this expression may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(self.kind, ExprKind::Identifier(_) | ExprKind::Index { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind<'input> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Identifier(&'input str),
    Array(Vec<Expr<'input>>),
    /// Call of a unit function or builtin by name: `greet("you")`
    Call {
        callee: &'input str,
        callee_span: Span,
        args: Vec<Expr<'input>>,
    },
    Index {
        object: Box<Expr<'input>>,
        index: Box<Expr<'input>>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr<'input>>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr<'input>>,
        right: Box<Expr<'input>>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}
