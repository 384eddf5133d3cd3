//! Runtime values for the Seed interpreter.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Nesting depth past which arrays render as `[...]`, so self-referencing
/// arrays still print.
const DISPLAY_DEPTH: usize = 32;

/// Array elements rendered before the rest is elided as `...`.
const DISPLAY_ELEMENTS: usize = 10_000;

/// Nesting depth past which array comparison gives up.
pub const COMPARE_DEPTH: usize = 256;

/// Shared, mutable array storage.
pub type Array = Rc<RefCell<Vec<Value>>>;

/// A runtime value in the Seed language.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The null value.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    /// An array; copies of the value share the same storage.
    Array(Array),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Structural equality; ints and floats compare numerically.
    ///
    /// Arrays that contain themselves compare equal when their shapes
    /// match. Returns `None` when arrays nest deeper than [`COMPARE_DEPTH`].
    pub fn equals(&self, other: &Value) -> Option<bool> {
        self.equals_nested(other, 0, &mut HashSet::new())
    }

    fn equals_nested(&self, other: &Value, depth: usize, assumed: &mut HashSet<(usize, usize)>) -> Option<bool> {
        let (a, b) = match (self, other) {
            (Value::Array(a), Value::Array(b)) => (a, b),
            _ => return Some(self.scalar_equals(other)),
        };
        if Rc::ptr_eq(a, b) {
            return Some(true);
        }
        // A pair already being compared counts as equal; any difference
        // found elsewhere still makes the whole comparison false.
        if !assumed.insert((Rc::as_ptr(a) as usize, Rc::as_ptr(b) as usize)) {
            return Some(true);
        }
        if depth >= COMPARE_DEPTH {
            return None;
        }

        let (a, b) = (a.borrow(), b.borrow());
        if a.len() != b.len() {
            return Some(false);
        }
        for (x, y) in a.iter().zip(b.iter()) {
            if !x.equals_nested(y, depth + 1, assumed)? {
                return Some(false);
            }
        }
        Some(true)
    }

    fn scalar_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>, depth: usize, budget: &mut usize) -> fmt::Result {
        match self {
            Value::String(s) if depth > 0 => write!(f, "{:?}", s),
            Value::Array(items) => {
                if depth >= DISPLAY_DEPTH {
                    return f.write_str("[...]");
                }
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if *budget == 0 {
                        f.write_str("...")?;
                        break;
                    }
                    *budget -= 1;
                    item.write_nested(f, depth + 1, budget)?;
                }
                f.write_str("]")
            }
            other => other.write_scalar(f),
        }
    }

    fn write_scalar(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{:.1}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Array(_) => f.write_str("[...]"),
        }
    }
}

/// Strings print raw at the top level and quoted inside arrays.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut budget = DISPLAY_ELEMENTS;
        self.write_nested(f, 0, &mut budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_always_shows_fraction() {
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::Int(3).to_string(), "3");
    }

    #[test]
    fn test_array_display_quotes_strings() {
        let value = Value::array(vec![Value::Int(1), Value::string("a"), Value::Null]);
        assert_eq!(value.to_string(), r#"[1, "a", null]"#);
        assert_eq!(Value::string("a").to_string(), "a");
    }

    #[test]
    fn test_self_referencing_array_display_terminates() {
        let value = Value::array(Vec::new());
        if let Value::Array(items) = &value {
            items.borrow_mut().push(value.clone());
        }
        assert!(value.to_string().contains("[...]"));
    }

    fn self_referencing(copies: usize) -> Value {
        let value = Value::array(Vec::new());
        if let Value::Array(items) = &value {
            for _ in 0..copies {
                items.borrow_mut().push(value.clone());
            }
        }
        value
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Int(2).equals(&Value::Float(2.0)), Some(true));
        assert_eq!(Value::Int(2).equals(&Value::string("2")), Some(false));
        assert_eq!(
            Value::array(vec![Value::Int(1)]).equals(&Value::array(vec![Value::Int(1)])),
            Some(true)
        );
        assert_eq!(Value::Null.equals(&Value::Null), Some(true));
        assert_eq!(Value::Null.equals(&Value::Bool(false)), Some(false));
    }

    #[test]
    fn test_distinct_cyclic_arrays_compare() {
        assert_eq!(self_referencing(1).equals(&self_referencing(1)), Some(true));
        assert_eq!(self_referencing(2).equals(&self_referencing(2)), Some(true));
        assert_eq!(self_referencing(1).equals(&self_referencing(2)), Some(false));
    }

    #[test]
    fn test_deep_nesting_is_not_compared() {
        let nest = || (0..COMPARE_DEPTH + 1).fold(Value::Null, |inner, _| Value::array(vec![inner]));
        assert_eq!(nest().equals(&nest()), None);
    }

    #[test]
    fn test_display_output_is_bounded() {
        let rendered = self_referencing(2).to_string();
        assert!(rendered.len() < 200_000, "rendered {} bytes", rendered.len());
        assert!(rendered.contains("..."));
    }

    #[test]
    fn test_arrays_share_storage() {
        let a = Value::array(vec![]);
        let b = a.clone();
        if let Value::Array(items) = &b {
            items.borrow_mut().push(Value::Int(7));
        }
        assert_eq!(a.to_string(), "[7]");
    }
}
