/// Semantic checks run between parsing and code generation
///
/// The checker resolves every name, validates call arities and loop
/// control, and enforces the unit naming contract. Code generation only
/// runs on programs that pass without errors.

use std::collections::HashMap;

use conception_bytecode::Builtin;
use conception_parser::ast::*;

use crate::diagnostic::{Category, DiagnosticSink};

struct Local<'input> {
    name: &'input str,
    span: Span,
    read: bool,
    /// Parameters and loop variables never produce unused warnings
    exempt: bool,
}

/// Walks a parsed program and reports problems into a [`DiagnosticSink`].
pub struct Checker<'s, 'a, 'input> {
    sink: &'s mut DiagnosticSink<'a>,
    /// Arity of every unit function, first declaration wins
    functions: HashMap<&'input str, usize>,
    scopes: Vec<Vec<Local<'input>>>,
    loop_depth: usize,
}

impl<'s, 'a, 'input> Checker<'s, 'a, 'input> {
    pub fn new(sink: &'s mut DiagnosticSink<'a>) -> Self {
        Self {
            sink,
            functions: HashMap::new(),
            scopes: Vec::new(),
            loop_depth: 0,
        }
    }

    /// Check `program`, which was read from a file whose stem is `file_unit`.
    pub fn check(mut self, program: &Program<'input>, file_unit: &str) {
        let unit = &program.unit;
        if unit.name != file_unit {
            self.sink.error(
                Category::NamingContract,
                unit.name_span,
                format!(
                    "unit `{}` must be declared in a file named `{}.seed`",
                    unit.name, unit.name
                ),
            );
        }

        for function in &unit.functions {
            if Builtin::from_name(function.name).is_some() {
                self.sink.error(
                    Category::ShadowsBuiltin,
                    function.span,
                    format!("function `{}` shadows a builtin of the same name", function.name),
                );
            } else if self.functions.contains_key(function.name) {
                self.sink.error(
                    Category::DuplicateFunction,
                    function.span,
                    format!("function `{}` is already defined in unit `{}`", function.name, unit.name),
                );
            } else {
                self.functions.insert(function.name, function.params.len());
            }
        }

        for function in &unit.functions {
            self.check_function(function);
        }
    }

    fn check_function(&mut self, function: &FunctionDecl<'input>) {
        self.push_scope();
        for param in &function.params {
            if self.lookup_in_current(param.name) {
                self.sink.error(
                    Category::DuplicateParameter,
                    param.span,
                    format!("parameter `{}` is declared more than once", param.name),
                );
                continue;
            }
            self.declare(param.name, param.span, true);
        }
        self.check_block_statements(&function.body);
        self.pop_scope();
    }

    fn check_block(&mut self, block: &Block<'input>) {
        self.push_scope();
        self.check_block_statements(block);
        self.pop_scope();
    }

    fn check_block_statements(&mut self, block: &Block<'input>) {
        for stmt in &block.statements {
            self.check_statement(stmt);
        }
    }

    fn check_statement(&mut self, stmt: &Statement<'input>) {
        match &stmt.kind {
            StatementKind::VarDecl {
                name,
                name_span,
                init,
            } => {
                self.check_expr(init);
                if self.lookup_in_current(name) {
                    self.sink.error(
                        Category::Redeclared,
                        *name_span,
                        format!("variable `{}` is already declared in this scope", name),
                    );
                } else {
                    self.declare(*name, *name_span, false);
                }
            }
            StatementKind::Assign { target, value } => {
                self.check_expr(value);
                match &target.kind {
                    ExprKind::Identifier(name) => {
                        if !self.resolve(name, false) {
                            self.undefined_variable(name, target.span);
                        }
                    }
                    ExprKind::Index { object, index } => {
                        self.check_expr(object);
                        self.check_expr(index);
                    }
                    _ => self.sink.error(
                        Category::InvalidAssignment,
                        target.span,
                        "left-hand side of `=` must be a variable or an index expression",
                    ),
                }
            }
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.check_expr(condition);
                self.check_block(then_block);
                if let Some(block) = else_block {
                    self.check_block(block);
                }
            }
            StatementKind::While { condition, body } => {
                self.check_expr(condition);
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
            }
            StatementKind::ForIn {
                var,
                var_span,
                iter,
                body,
            } => {
                self.check_expr(iter);
                self.push_scope();
                self.declare(*var, *var_span, true);
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.pop_scope();
            }
            StatementKind::Return(value) => {
                if let Some(expr) = value {
                    self.check_expr(expr);
                }
            }
            StatementKind::Break | StatementKind::Continue => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(stmt.kind, StatementKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    self.sink.error(
                        Category::LoopControl,
                        stmt.span,
                        format!("`{}` outside of a loop", keyword),
                    );
                }
            }
            StatementKind::Throw(expr) | StatementKind::Expr(expr) => self.check_expr(expr),
        }
    }

    fn check_expr(&mut self, expr: &Expr<'input>) {
        match &expr.kind {
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::String(_) => {}
            ExprKind::Identifier(name) => {
                if !self.resolve(name, true) {
                    self.undefined_variable(name, expr.span);
                }
            }
            ExprKind::Array(items) => {
                for item in items {
                    self.check_expr(item);
                }
            }
            ExprKind::Call {
                callee,
                callee_span,
                args,
            } => {
                for arg in args {
                    self.check_expr(arg);
                }
                self.check_call(callee, *callee_span, args.len());
            }
            ExprKind::Index { object, index } => {
                self.check_expr(object);
                self.check_expr(index);
            }
            ExprKind::Unary { operand, .. } => self.check_expr(operand),
            ExprKind::Binary { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
        }
    }

    fn check_call(&mut self, callee: &str, span: Span, argc: usize) {
        if let Some(builtin) = Builtin::from_name(callee) {
            if !builtin.accepts(argc) {
                let (min, max) = builtin.arity();
                let expected = if min == max {
                    format!("{}", min)
                } else {
                    format!("{} to {}", min, max)
                };
                self.sink.error(
                    Category::ArityMismatch,
                    span,
                    format!(
                        "builtin `{}` takes {} argument(s) but {} were supplied",
                        callee, expected, argc
                    ),
                );
            }
            return;
        }

        match self.functions.get(callee) {
            Some(&arity) if arity != argc => self.sink.error(
                Category::ArityMismatch,
                span,
                format!(
                    "function `{}` takes {} argument(s) but {} were supplied",
                    callee, arity, argc
                ),
            ),
            Some(_) => {}
            None => self.sink.error(
                Category::UndefinedFunction,
                span,
                format!("cannot find function `{}` in this unit", callee),
            ),
        }
    }

    fn undefined_variable(&mut self, name: &str, span: Span) {
        self.sink.error(
            Category::UndefinedVariable,
            span,
            format!("cannot find variable `{}` in this scope", name),
        );
    }

    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for local in scope {
            if !local.read && !local.exempt && !local.name.starts_with('_') {
                self.sink.warning(
                    Category::UnusedVariable,
                    local.span,
                    format!("variable `{}` is never read", local.name),
                );
            }
        }
    }

    fn declare(&mut self, name: &'input str, span: Span, exempt: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Local {
                name,
                span,
                read: false,
                exempt,
            });
        }
    }

    fn lookup_in_current(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.iter().any(|local| local.name == name))
    }

    /// Find the innermost binding of `name`, marking it read when `read` is set.
    fn resolve(&mut self, name: &str, read: bool) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(local) = scope.iter_mut().rev().find(|local| local.name == name) {
                local.read |= read;
                return true;
            }
        }
        false
    }
}
