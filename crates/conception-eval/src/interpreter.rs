//! The Seed stack machine.
//!
//! Locals and temporaries share one value stack: a call frame owns the
//! slots from its `base` upward, with parameters in the first slots.

use std::time::{Duration, Instant};

use conception_bytecode::{Builtin, Op};

use crate::error::{Error, Frame};
use crate::loader::LoadedUnit;
use crate::stdio::{self, Stream};
use crate::value::{Value, COMPARE_DEPTH};
use crate::Result;

/// Instructions executed between two clock checks
const CLOCK_INTERVAL: u64 = 256;

/// Bounds on one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Wall-clock budget of the whole execution; `None` runs unbounded.
    pub timeout: Option<Duration>,
    /// Deepest allowed nesting of calls, the entry point included.
    pub max_call_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10)),
            max_call_depth: 1024,
        }
    }
}

struct CallFrame {
    function: usize,
    ip: usize,
    base: usize,
}

/// Runs functions of one loaded unit.
pub struct Interpreter<'u> {
    unit: &'u LoadedUnit,
    limits: ExecutionLimits,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    started: Instant,
    steps: u64,
}

impl<'u> Interpreter<'u> {
    pub fn new(unit: &'u LoadedUnit, limits: ExecutionLimits) -> Self {
        Self {
            unit,
            limits,
            stack: Vec::new(),
            frames: Vec::new(),
            started: Instant::now(),
            steps: 0,
        }
    }

    /// Call the function at `function` with `args` and run it to completion.
    pub fn call(&mut self, function: usize, args: Vec<Value>) -> Result<Value> {
        self.started = Instant::now();
        self.steps = 0;
        self.stack.clear();
        self.frames.clear();

        let argc = args.len();
        self.stack.extend(args);
        self.enter(function, argc)?;
        self.run()
    }

    fn enter(&mut self, function: usize, argc: usize) -> Result<()> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(self.fault(format!(
                "stack overflow: call depth exceeded {}",
                self.limits.max_call_depth
            )));
        }
        let code = self.unit.function(function);
        let Some(base) = self.stack.len().checked_sub(argc) else {
            return Err(self.fault("stack underflow"));
        };
        self.stack.resize(base + code.locals as usize, Value::Null);
        self.frames.push(CallFrame { function, ip: 0, base });
        Ok(())
    }

    fn run(&mut self) -> Result<Value> {
        let unit = self.unit;
        loop {
            self.tick()?;

            let Some(frame) = self.frames.last_mut() else {
                return Err(self.fault("no active call frame"));
            };
            let function = unit.function(frame.function);
            let Some(&op) = function.code.get(frame.ip) else {
                return Err(self.fault("execution ran past the end of the function"));
            };
            frame.ip += 1;
            let base = frame.base;

            match op {
                Op::Const(index) => self.stack.push(unit.constant(index as usize)),
                Op::Null => self.stack.push(Value::Null),
                Op::True => self.stack.push(Value::Bool(true)),
                Op::False => self.stack.push(Value::Bool(false)),
                Op::Load(slot) => {
                    let value = self.stack[base + slot as usize].clone();
                    self.stack.push(value);
                }
                Op::Store(slot) => {
                    let value = self.pop()?;
                    self.stack[base + slot as usize] = value;
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::Array(count) => {
                    let count = count as usize;
                    if count > self.stack.len() {
                        return Err(self.fault("stack underflow"));
                    }
                    let items = self.stack.split_off(self.stack.len() - count);
                    self.stack.push(Value::array(items));
                }
                Op::Index => {
                    let index = self.pop()?;
                    let object = self.pop()?;
                    let value = self.index(&object, &index)?;
                    self.stack.push(value);
                }
                Op::StoreIndex => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let object = self.pop()?;
                    self.store_index(&object, &index, value)?;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Rem => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let value = self.arithmetic(op, left, right)?;
                    self.stack.push(value);
                }
                Op::Lt | Op::LtEq | Op::Gt | Op::GtEq => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let value = self.compare(op, &left, &right)?;
                    self.stack.push(Value::Bool(value));
                }
                Op::Eq | Op::NotEq => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let Some(equal) = left.equals(&right) else {
                        return Err(self.fault(format!(
                            "cannot compare arrays nested deeper than {}",
                            COMPARE_DEPTH
                        )));
                    };
                    self.stack.push(Value::Bool(equal == matches!(op, Op::Eq)));
                }
                Op::Neg => {
                    let value = match self.pop()? {
                        Value::Int(n) => match n.checked_neg() {
                            Some(n) => Value::Int(n),
                            None => return Err(self.fault("integer overflow")),
                        },
                        Value::Float(n) => Value::Float(-n),
                        other => {
                            return Err(self.fault(format!("cannot negate a value of type {}", other.type_name())));
                        }
                    };
                    self.stack.push(value);
                }
                Op::Not => {
                    let value = self.pop()?;
                    let flag = self.condition(&value, "operand of `!`")?;
                    self.stack.push(Value::Bool(!flag));
                }
                Op::Jump(target) => self.jump(target),
                Op::JumpIfFalse(target) => {
                    let value = self.pop()?;
                    if !self.condition(&value, "condition")? {
                        self.jump(target);
                    }
                }
                Op::Call { function, argc } => {
                    self.enter(function as usize, argc as usize)?;
                }
                Op::CallBuiltin { builtin, argc } => {
                    let argc = argc as usize;
                    if argc > self.stack.len() {
                        return Err(self.fault("stack underflow"));
                    }
                    let args = self.stack.split_off(self.stack.len() - argc);
                    let value = self.builtin(builtin, args)?;
                    self.stack.push(value);
                }
                Op::Return => {
                    let value = self.pop()?;
                    self.stack.truncate(base);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(value);
                    }
                    self.stack.push(value);
                }
                Op::Throw => {
                    let value = self.pop()?;
                    return Err(self.fault(value.to_string()));
                }
            }
        }
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps % CLOCK_INTERVAL != 0 {
            return Ok(());
        }
        match self.limits.timeout {
            Some(limit) if self.started.elapsed() > limit => Err(Error::Timeout {
                unit: self.unit.name().to_string(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn jump(&mut self, target: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = target as usize;
        }
    }

    fn pop(&mut self) -> Result<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => Err(self.fault("stack underflow")),
        }
    }

    fn condition(&self, value: &Value, what: &str) -> Result<bool> {
        match value {
            Value::Bool(flag) => Ok(*flag),
            other => Err(self.fault(format!("{} must be a bool, found {}", what, other.type_name()))),
        }
    }

    fn arithmetic(&self, op: Op, left: Value, right: Value) -> Result<Value> {
        if op == Op::Add {
            if let (Value::String(_), _) | (_, Value::String(_)) = (&left, &right) {
                return Ok(Value::string(format!("{}{}", left, right)));
            }
        }

        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                if matches!(op, Op::Div | Op::Rem) && b == 0 {
                    return Err(self.fault("division by zero"));
                }
                let result = match op {
                    Op::Add => a.checked_add(b),
                    Op::Sub => a.checked_sub(b),
                    Op::Mul => a.checked_mul(b),
                    Op::Div => a.checked_div(b),
                    _ => a.checked_rem(b),
                };
                result.map(Value::Int).ok_or_else(|| self.fault("integer overflow"))
            }
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let (a, b) = (as_float(&left), as_float(&right));
                Ok(Value::Float(match op {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    Op::Div => a / b,
                    _ => a % b,
                }))
            }
            _ => Err(self.fault(format!(
                "unsupported operand types for {}: {} and {}",
                symbol(op),
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn compare(&self, op: Op, left: &Value, right: &Value) -> Result<bool> {
        let ordering = match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                as_float(left).partial_cmp(&as_float(right))
            }
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => {
                return Err(self.fault(format!(
                    "cannot compare {} with {} using {}",
                    left.type_name(),
                    right.type_name(),
                    symbol(op)
                )));
            }
        };
        // NaN compares false with everything
        let Some(ordering) = ordering else {
            return Ok(false);
        };
        Ok(match op {
            Op::Lt => ordering.is_lt(),
            Op::LtEq => ordering.is_le(),
            Op::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        })
    }

    fn index(&self, object: &Value, index: &Value) -> Result<Value> {
        let Value::Int(position) = index else {
            return Err(self.fault(format!("index must be an int, found {}", index.type_name())));
        };
        match object {
            Value::Array(items) => {
                let items = items.borrow();
                usize::try_from(*position)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| self.out_of_bounds(*position, items.len()))
            }
            Value::String(s) => usize::try_from(*position)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::string(c.to_string()))
                .ok_or_else(|| self.out_of_bounds(*position, s.chars().count())),
            other => Err(self.fault(format!("cannot index into a value of type {}", other.type_name()))),
        }
    }

    fn store_index(&self, object: &Value, index: &Value, value: Value) -> Result<()> {
        let Value::Array(items) = object else {
            return Err(self.fault(format!("cannot assign into a value of type {}", object.type_name())));
        };
        let Value::Int(position) = index else {
            return Err(self.fault(format!("index must be an int, found {}", index.type_name())));
        };
        let mut items = items.borrow_mut();
        let len = items.len();
        match usize::try_from(*position).ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(self.out_of_bounds(*position, len)),
        }
    }

    fn builtin(&self, builtin: Builtin, args: Vec<Value>) -> Result<Value> {
        let mut args = args.into_iter();
        match builtin {
            Builtin::Print | Builtin::Println | Builtin::Eprint | Builtin::Eprintln => {
                let stream = match builtin {
                    Builtin::Print | Builtin::Println => Stream::Stdout,
                    _ => Stream::Stderr,
                };
                let mut text = args.next().map(|value| value.to_string()).unwrap_or_default();
                if matches!(builtin, Builtin::Println | Builtin::Eprintln) {
                    text.push('\n');
                }
                stdio::write(stream, &text)
                    .map_err(|e| self.fault(format!("failed to write output: {}", e)))?;
                Ok(Value::Null)
            }
            Builtin::Len => match args.next().unwrap_or_default() {
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Array(items) => Ok(Value::Int(items.borrow().len() as i64)),
                other => Err(self.fault(format!("len() does not accept a value of type {}", other.type_name()))),
            },
            Builtin::Str => Ok(Value::string(args.next().unwrap_or_default().to_string())),
            Builtin::Int => match args.next().unwrap_or_default() {
                Value::Int(n) => Ok(Value::Int(n)),
                Value::Bool(flag) => Ok(Value::Int(flag as i64)),
                Value::Float(n) if n.is_finite() && n.trunc() >= i64::MIN as f64 && n.trunc() < i64::MAX as f64 => {
                    Ok(Value::Int(n.trunc() as i64))
                }
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| self.fault(format!("cannot convert {:?} to int", &*s))),
                other => Err(self.fault(format!("cannot convert {} to int", other))),
            },
            Builtin::Push => {
                let target = args.next().unwrap_or_default();
                let value = args.next().unwrap_or_default();
                match target {
                    Value::Array(items) => {
                        items.borrow_mut().push(value);
                        Ok(Value::Null)
                    }
                    other => Err(self.fault(format!("push() needs an array, found {}", other.type_name()))),
                }
            }
        }
    }

    fn out_of_bounds(&self, position: i64, len: usize) -> Error {
        self.fault(format!("index {} out of bounds for length {}", position, len))
    }

    /// A runtime failure carrying the current trace, innermost frame first.
    fn fault(&self, message: impl Into<String>) -> Error {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.unit.function(frame.function);
                Frame {
                    unit: self.unit.name().to_string(),
                    function: function.name.clone(),
                    file: self.unit.source_file().to_string(),
                    line: function.line_at(frame.ip.saturating_sub(1)),
                }
            })
            .collect();
        Error::Runtime {
            unit: self.unit.name().to_string(),
            message: message.into(),
            trace,
        }
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(n) => *n,
        _ => f64::NAN,
    }
}

fn symbol(op: Op) -> &'static str {
    match op {
        Op::Add => "+",
        Op::Sub => "-",
        Op::Mul => "*",
        Op::Div => "/",
        Op::Rem => "%",
        Op::Lt => "<",
        Op::LtEq => "<=",
        Op::Gt => ">",
        Op::GtEq => ">=",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::UnitLoader;
    use conception_compiler::{Compiler, SourceInput};

    fn load(source: &str) -> (tempfile::TempDir, LoadedUnit) {
        let dir = tempfile::tempdir().unwrap();
        let outcome = Compiler::new()
            .compile("T", SourceInput::Text(source), dir.path())
            .unwrap();
        assert!(outcome.is_success(), "{}", outcome.diagnostic_text());
        let unit = UnitLoader::new(dir.path()).load("T").unwrap();
        (dir, unit)
    }

    fn eval(body: &str) -> Result<Value> {
        let source = format!("unit T {{\n fun main(args) {{\n{}\n }}\n}}\n", body);
        let (_dir, unit) = load(&source);
        let entry = unit.entry_point("main", 1)?;
        Interpreter::new(&unit, ExecutionLimits::default()).call(entry, vec![Value::array(vec![])])
    }

    fn eval_ok(body: &str) -> String {
        eval(body).unwrap().to_string()
    }

    fn eval_message(body: &str) -> String {
        match eval(body) {
            Err(Error::Runtime { message, .. }) => message,
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_ok("return 1 + 2 * 3;"), "7");
        assert_eq!(eval_ok("return (1 + 2) * 3;"), "9");
        assert_eq!(eval_ok("return 7 / 2;"), "3");
        assert_eq!(eval_ok("return 7 % 3;"), "1");
        assert_eq!(eval_ok("return 1 + 2.0;"), "3.0");
        assert_eq!(eval_ok("return -(4);"), "-4");
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval_ok(r#"return "n=" + 1;"#), "n=1");
        assert_eq!(eval_ok(r#"return 1.5 + "x";"#), "1.5x");
    }

    #[test]
    fn test_checked_integer_faults() {
        assert_eq!(eval_message("return 1 / 0;"), "division by zero");
        assert_eq!(eval_message("return 5 % 0;"), "division by zero");
        assert_eq!(eval_message("return 9223372036854775807 + 1;"), "integer overflow");
    }

    #[test]
    fn test_conditions_must_be_bool() {
        assert_eq!(eval_message("if 1 { return 1; }"), "condition must be a bool, found int");
        assert_eq!(eval_message("return !0;"), "operand of `!` must be a bool, found int");
    }

    #[test]
    fn test_cyclic_arrays_compare_without_overflow() {
        let body = "var a = [];\n push(a, a);\n var b = [];\n push(b, b);\n return a == b;";
        assert_eq!(eval_ok(body), "true");
        let body = "var a = [];\n push(a, a);\n var b = [1];\n return a != b;";
        assert_eq!(eval_ok(body), "true");
    }

    #[test]
    fn test_deeply_nested_comparison_faults() {
        let body = "var a = null;\n var b = null;\n var i = 0;\n while i < 300 { a = [a]; b = [b]; i = i + 1; }\n return a == b;";
        assert_eq!(eval_message(body), "cannot compare arrays nested deeper than 256");
    }

    #[test]
    fn test_doubly_self_referencing_array_renders_quickly() {
        let started = Instant::now();
        let rendered = eval_ok("var a = [];\n push(a, a);\n push(a, a);\n return str(a);");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(rendered.ends_with("]"));
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(eval_ok("return false && 1 / 0 == 0;"), "false");
        assert_eq!(eval_ok("return true || 1 / 0 == 0;"), "true");
        assert_eq!(eval_ok("return true && false;"), "false");
        assert_eq!(eval_ok("return false || true;"), "true");
    }

    #[test]
    fn test_loops_and_arrays() {
        let body = "var total = 0;\n var items = [1, 2, 3];\n push(items, 4);\n for var n in items {\n if n == 2 { continue; }\n total = total + n;\n }\n var i = 0;\n while true {\n i = i + 1;\n if i > 5 { break; }\n }\n return [total, i, len(items)];";
        assert_eq!(eval_ok(body), "[8, 6, 4]");
    }

    #[test]
    fn test_for_over_string() {
        assert_eq!(
            eval_ok("var out = [];\n for var c in \"héllo\" { push(out, c); }\n return out;"),
            r#"["h", "é", "l", "l", "o"]"#
        );
    }

    #[test]
    fn test_index_assignment_and_bounds() {
        assert_eq!(eval_ok("var a = [1, 2];\n a[1] = 5;\n return a;"), "[1, 5]");
        assert_eq!(
            eval_message("var a = [1];\n return a[3];"),
            "index 3 out of bounds for length 1"
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(eval_ok(r#"return int(" 42 ") + int(2.9) + int(true);"#), "45");
        assert_eq!(eval_ok("return str(3.0) + str(null);"), "3.0null");
        assert_eq!(eval_message(r#"return int("x");"#), r#"cannot convert "x" to int"#);
    }

    #[test]
    fn test_recursion() {
        let source = "unit T {\n fun fib(n) {\n if n < 2 { return n; }\n return fib(n - 1) + fib(n - 2);\n }\n fun main(args) {\n return fib(15);\n }\n}\n";
        let (_dir, unit) = load(source);
        let entry = unit.entry_point("main", 1).unwrap();
        let value = Interpreter::new(&unit, ExecutionLimits::default())
            .call(entry, vec![Value::Null])
            .unwrap();
        assert_eq!(value.to_string(), "610");
    }

    #[test]
    fn test_thrown_value_carries_trace() {
        let source = "unit T {\n fun fail(msg) {\n throw msg;\n }\n fun main(args) {\n fail(\"boom\");\n }\n}\n";
        let (_dir, unit) = load(source);
        let entry = unit.entry_point("main", 1).unwrap();
        let err = Interpreter::new(&unit, ExecutionLimits::default())
            .call(entry, vec![Value::Null])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Exception in unit T: boom\n    at T.fail(T.seed:3)\n    at T.main(T.seed:6)"
        );
    }

    #[test]
    fn test_call_depth_limit() {
        let source = "unit T {\n fun down(n) {\n return down(n + 1);\n }\n fun main(args) {\n down(0);\n }\n}\n";
        let (_dir, unit) = load(source);
        let entry = unit.entry_point("main", 1).unwrap();
        let limits = ExecutionLimits {
            max_call_depth: 50,
            ..ExecutionLimits::default()
        };
        let err = Interpreter::new(&unit, limits)
            .call(entry, vec![Value::Null])
            .unwrap_err();
        match err {
            Error::Runtime { message, trace, .. } => {
                assert_eq!(message, "stack overflow: call depth exceeded 50");
                assert_eq!(trace.len(), 50);
            }
            other => panic!("expected stack overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout() {
        let source = "unit T {\n fun main(args) {\n while true {}\n }\n}\n";
        let (_dir, unit) = load(source);
        let entry = unit.entry_point("main", 1).unwrap();
        let limits = ExecutionLimits {
            timeout: Some(Duration::from_millis(50)),
            ..ExecutionLimits::default()
        };
        let err = Interpreter::new(&unit, limits)
            .call(entry, vec![Value::Null])
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
