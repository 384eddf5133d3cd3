/// Code generation module
///
/// Transforms a checked Seed AST into a stack machine [`Artifact`].
/// Every local gets its own slot for the lifetime of the function; slots
/// are never reused across sibling scopes.

use std::collections::HashMap;

use conception_bytecode::{Artifact, Builtin, Constant, FunctionCode, Op};
use conception_parser::ast::*;
use conception_parser::LineIndex;

use crate::error::{CompileError, Result};

/// Jump sites of one enclosing loop, patched once the loop is complete
#[derive(Default)]
struct LoopContext {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// Per-function emission state
struct FunctionState<'input> {
    code: Vec<Op>,
    lines: Vec<u32>,
    scopes: Vec<Vec<(&'input str, u32)>>,
    next_slot: u32,
    loops: Vec<LoopContext>,
}

/// Bytecode generator for one unit
pub struct CodeGenerator<'a, 'input> {
    index: &'a LineIndex,
    artifact: Artifact,
    function_ids: HashMap<&'input str, u32>,
    state: FunctionState<'input>,
    line: u32,
}

impl<'a, 'input> CodeGenerator<'a, 'input> {
    /// Create a generator for a unit read from `source_file`
    pub fn new(index: &'a LineIndex, source_file: &str, unit: &str) -> Self {
        Self {
            index,
            artifact: Artifact::new(unit, source_file),
            function_ids: HashMap::new(),
            state: FunctionState::new(),
            line: 1,
        }
    }

    /// Generate the artifact for a program
    pub fn generate(mut self, program: &Program<'input>) -> Result<Artifact> {
        for (id, function) in program.unit.functions.iter().enumerate() {
            self.function_ids.insert(function.name, id as u32);
        }

        for function in &program.unit.functions {
            let code = self.generate_function(function)?;
            self.artifact.functions.push(code);
        }

        Ok(self.artifact)
    }

    fn generate_function(&mut self, function: &FunctionDecl<'input>) -> Result<FunctionCode> {
        self.state = FunctionState::new();
        self.set_line(function.span);

        self.state.scopes.push(Vec::new());
        for param in &function.params {
            self.declare(param.name);
        }
        self.generate_block_statements(&function.body)?;

        // Falling off the end returns null
        self.emit(Op::Null);
        self.emit(Op::Return);

        let state = std::mem::replace(&mut self.state, FunctionState::new());
        Ok(FunctionCode {
            name: function.name.to_string(),
            arity: function.params.len() as u32,
            locals: state.next_slot,
            code: state.code,
            lines: state.lines,
        })
    }

    fn generate_block(&mut self, block: &Block<'input>) -> Result<()> {
        self.state.scopes.push(Vec::new());
        self.generate_block_statements(block)?;
        self.state.scopes.pop();
        Ok(())
    }

    fn generate_block_statements(&mut self, block: &Block<'input>) -> Result<()> {
        for stmt in &block.statements {
            self.generate_statement(stmt)?;
        }
        Ok(())
    }

    fn generate_statement(&mut self, stmt: &Statement<'input>) -> Result<()> {
        self.set_line(stmt.span);
        match &stmt.kind {
            StatementKind::VarDecl { name, init, .. } => {
                self.generate_expr(init)?;
                let slot = self.declare(*name);
                self.emit(Op::Store(slot));
            }
            StatementKind::Assign { target, value } => {
                self.generate_assign(target, value)?;
            }
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.generate_if(condition, then_block, else_block)?;
            }
            StatementKind::While { condition, body } => {
                self.generate_while(condition, body)?;
            }
            StatementKind::ForIn {
                var, iter, body, ..
            } => {
                self.generate_for_in(*var, iter, body)?;
            }
            StatementKind::Return(value) => {
                match value {
                    Some(expr) => self.generate_expr(expr)?,
                    None => self.emit(Op::Null),
                }
                self.emit(Op::Return);
            }
            StatementKind::Break => {
                let site = self.emit_jump_placeholder();
                self.current_loop()?.breaks.push(site);
            }
            StatementKind::Continue => {
                let site = self.emit_jump_placeholder();
                self.current_loop()?.continues.push(site);
            }
            StatementKind::Throw(expr) => {
                self.generate_expr(expr)?;
                self.emit(Op::Throw);
            }
            StatementKind::Expr(expr) => {
                self.generate_expr(expr)?;
                self.emit(Op::Pop);
            }
        }
        Ok(())
    }

    fn generate_assign(&mut self, target: &Expr<'input>, value: &Expr<'input>) -> Result<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                self.generate_expr(value)?;
                let slot = self.resolve(name)?;
                self.emit(Op::Store(slot));
            }
            ExprKind::Index { object, index } => {
                self.generate_expr(object)?;
                self.generate_expr(index)?;
                self.generate_expr(value)?;
                self.emit(Op::StoreIndex);
            }
            _ => {
                return Err(CompileError::Internal(
                    "assignment to a non-assignable expression reached codegen".into(),
                ));
            }
        }
        Ok(())
    }

    fn generate_if(
        &mut self,
        condition: &Expr<'input>,
        then_block: &Block<'input>,
        else_block: &Option<Block<'input>>,
    ) -> Result<()> {
        self.generate_expr(condition)?;
        let skip_then = self.emit_branch_placeholder();
        self.generate_block(then_block)?;

        if let Some(else_blk) = else_block {
            let skip_else = self.emit_jump_placeholder();
            self.patch(skip_then);
            self.generate_block(else_blk)?;
            self.patch(skip_else);
        } else {
            self.patch(skip_then);
        }
        Ok(())
    }

    fn generate_while(&mut self, condition: &Expr<'input>, body: &Block<'input>) -> Result<()> {
        let start = self.offset();
        self.generate_expr(condition)?;
        let exit = self.emit_branch_placeholder();

        self.state.loops.push(LoopContext::default());
        self.generate_block(body)?;
        self.emit(Op::Jump(start));

        let context = self.state.loops.pop().unwrap_or_default();
        self.patch(exit);
        self.patch_all(&context.breaks, self.offset());
        self.patch_all(&context.continues, start);
        Ok(())
    }

    /// `for var x in items { body }` iterates by index over an array or string
    fn generate_for_in(
        &mut self,
        var: &'input str,
        iter: &Expr<'input>,
        body: &Block<'input>,
    ) -> Result<()> {
        self.generate_expr(iter)?;

        self.state.scopes.push(Vec::new());
        let items = self.fresh_slot();
        let cursor = self.fresh_slot();
        let item = self.declare(var);
        self.emit(Op::Store(items));
        let zero = self.constant(Constant::Int(0));
        self.emit(Op::Const(zero));
        self.emit(Op::Store(cursor));

        let start = self.offset();
        self.emit(Op::Load(cursor));
        self.emit(Op::Load(items));
        self.emit(Op::CallBuiltin {
            builtin: Builtin::Len,
            argc: 1,
        });
        self.emit(Op::Lt);
        let exit = self.emit_branch_placeholder();

        self.emit(Op::Load(items));
        self.emit(Op::Load(cursor));
        self.emit(Op::Index);
        self.emit(Op::Store(item));

        self.state.loops.push(LoopContext::default());
        self.generate_block(body)?;
        let context = self.state.loops.pop().unwrap_or_default();

        let step = self.offset();
        let one = self.constant(Constant::Int(1));
        self.emit(Op::Load(cursor));
        self.emit(Op::Const(one));
        self.emit(Op::Add);
        self.emit(Op::Store(cursor));
        self.emit(Op::Jump(start));

        self.patch(exit);
        self.patch_all(&context.breaks, self.offset());
        self.patch_all(&context.continues, step);
        self.state.scopes.pop();
        Ok(())
    }

    fn generate_expr(&mut self, expr: &Expr<'input>) -> Result<()> {
        match &expr.kind {
            ExprKind::Null => self.emit(Op::Null),
            ExprKind::Bool(true) => self.emit(Op::True),
            ExprKind::Bool(false) => self.emit(Op::False),
            ExprKind::Int(n) => {
                let index = self.constant(Constant::Int(*n));
                self.emit(Op::Const(index));
            }
            ExprKind::Float(n) => {
                let index = self.constant(Constant::Float(*n));
                self.emit(Op::Const(index));
            }
            ExprKind::String(s) => {
                let index = self.constant(Constant::Str(s.clone()));
                self.emit(Op::Const(index));
            }
            ExprKind::Identifier(name) => {
                let slot = self.resolve(name)?;
                self.emit(Op::Load(slot));
            }
            ExprKind::Array(items) => {
                for item in items {
                    self.generate_expr(item)?;
                }
                self.emit(Op::Array(items.len() as u32));
            }
            ExprKind::Call { callee, args, .. } => {
                for arg in args {
                    self.generate_expr(arg)?;
                }
                // Attribute the call itself to the line of its name
                self.set_line(expr.span);
                let argc = args.len() as u32;
                if let Some(builtin) = Builtin::from_name(callee) {
                    self.emit(Op::CallBuiltin { builtin, argc });
                } else {
                    let function = *self.function_ids.get(callee).ok_or_else(|| {
                        CompileError::Internal(format!("unresolved function `{}`", callee))
                    })?;
                    self.emit(Op::Call { function, argc });
                }
            }
            ExprKind::Index { object, index } => {
                self.generate_expr(object)?;
                self.generate_expr(index)?;
                self.emit(Op::Index);
            }
            ExprKind::Unary { op, operand } => {
                self.generate_expr(operand)?;
                self.emit(match op {
                    UnOp::Neg => Op::Neg,
                    UnOp::Not => Op::Not,
                });
            }
            ExprKind::Binary { op, left, right } => {
                self.generate_binary_op(*op, left, right)?;
            }
        }
        Ok(())
    }

    fn generate_binary_op(&mut self, op: BinOp, left: &Expr<'input>, right: &Expr<'input>) -> Result<()> {
        match op {
            BinOp::And => return self.generate_and(left, right),
            BinOp::Or => return self.generate_or(left, right),
            _ => {}
        }

        self.generate_expr(left)?;
        self.generate_expr(right)?;
        self.emit(match op {
            BinOp::Add => Op::Add,
            BinOp::Sub => Op::Sub,
            BinOp::Mul => Op::Mul,
            BinOp::Div => Op::Div,
            BinOp::Rem => Op::Rem,
            BinOp::Eq => Op::Eq,
            BinOp::NotEq => Op::NotEq,
            BinOp::Lt => Op::Lt,
            BinOp::LtEq => Op::LtEq,
            BinOp::Gt => Op::Gt,
            BinOp::GtEq => Op::GtEq,
            BinOp::And | BinOp::Or => unreachable!("short-circuit operators handled above"),
        });
        Ok(())
    }

    /// `a && b` → boolean, `b` evaluated only when `a` is true
    fn generate_and(&mut self, left: &Expr<'input>, right: &Expr<'input>) -> Result<()> {
        self.generate_expr(left)?;
        let left_false = self.emit_branch_placeholder();
        self.generate_expr(right)?;
        let right_false = self.emit_branch_placeholder();
        self.emit(Op::True);
        let done = self.emit_jump_placeholder();
        self.patch(left_false);
        self.patch(right_false);
        self.emit(Op::False);
        self.patch(done);
        Ok(())
    }

    /// `a || b` → boolean, `b` evaluated only when `a` is false
    fn generate_or(&mut self, left: &Expr<'input>, right: &Expr<'input>) -> Result<()> {
        self.generate_expr(left)?;
        let try_right = self.emit_branch_placeholder();
        self.emit(Op::True);
        let done_left = self.emit_jump_placeholder();
        self.patch(try_right);
        self.generate_expr(right)?;
        let is_false = self.emit_branch_placeholder();
        self.emit(Op::True);
        let done_right = self.emit_jump_placeholder();
        self.patch(is_false);
        self.emit(Op::False);
        self.patch(done_left);
        self.patch(done_right);
        Ok(())
    }

    fn current_loop(&mut self) -> Result<&mut LoopContext> {
        self.state
            .loops
            .last_mut()
            .ok_or_else(|| CompileError::Internal("loop control outside of a loop reached codegen".into()))
    }

    fn constant(&mut self, constant: Constant) -> u32 {
        let pool = &mut self.artifact.constants;
        if let Some(existing) = pool.iter().position(|c| *c == constant) {
            return existing as u32;
        }
        pool.push(constant);
        (pool.len() - 1) as u32
    }

    fn declare(&mut self, name: &'input str) -> u32 {
        let slot = self.fresh_slot();
        if let Some(scope) = self.state.scopes.last_mut() {
            scope.push((name, slot));
        }
        slot
    }

    fn fresh_slot(&mut self) -> u32 {
        let slot = self.state.next_slot;
        self.state.next_slot += 1;
        slot
    }

    fn resolve(&self, name: &str) -> Result<u32> {
        self.state
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(local, _)| *local == name)
            .map(|(_, slot)| *slot)
            .ok_or_else(|| CompileError::Internal(format!("unresolved variable `{}`", name)))
    }

    fn set_line(&mut self, span: Span) {
        self.line = self.index.line(span.start) as u32;
    }

    fn emit(&mut self, op: Op) {
        self.state.code.push(op);
        self.state.lines.push(self.line);
    }

    fn offset(&self) -> u32 {
        self.state.code.len() as u32
    }

    fn emit_jump_placeholder(&mut self) -> usize {
        self.emit(Op::Jump(u32::MAX));
        self.state.code.len() - 1
    }

    fn emit_branch_placeholder(&mut self) -> usize {
        self.emit(Op::JumpIfFalse(u32::MAX));
        self.state.code.len() - 1
    }

    /// Point the jump at `site` to the current offset
    fn patch(&mut self, site: usize) {
        let target = self.offset();
        self.patch_to(site, target);
    }

    fn patch_all(&mut self, sites: &[usize], target: u32) {
        for &site in sites {
            self.patch_to(site, target);
        }
    }

    fn patch_to(&mut self, site: usize, target: u32) {
        match &mut self.state.code[site] {
            Op::Jump(t) | Op::JumpIfFalse(t) => *t = target,
            _ => {}
        }
    }
}

impl FunctionState<'_> {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            lines: Vec::new(),
            scopes: Vec::new(),
            next_slot: 0,
            loops: Vec::new(),
        }
    }
}
