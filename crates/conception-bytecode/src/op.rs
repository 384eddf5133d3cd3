//! Instruction set of the Seed stack machine.

use serde::{Deserialize, Serialize};

/// Index into a unit's constant pool
pub type ConstIndex = u32;
/// Index of a local slot within a call frame
pub type Slot = u32;
/// Absolute instruction offset within a function
pub type Target = u32;

/// A constant pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Builtin functions every unit can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    Print,
    Println,
    Eprint,
    Eprintln,
    Len,
    Str,
    Int,
    Push,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::Print,
        Builtin::Println,
        Builtin::Eprint,
        Builtin::Eprintln,
        Builtin::Len,
        Builtin::Str,
        Builtin::Int,
        Builtin::Push,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Println => "println",
            Builtin::Eprint => "eprint",
            Builtin::Eprintln => "eprintln",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Push => "push",
        }
    }

    /// Accepted argument counts, inclusive.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Println | Builtin::Eprintln => (0, 1),
            Builtin::Push => (2, 2),
            _ => (1, 1),
        }
    }

    pub fn accepts(self, argc: usize) -> bool {
        let (min, max) = self.arity();
        (min..=max).contains(&argc)
    }
}

/// One stack machine instruction.
///
/// Binary operators pop the right operand first, then the left one, and
/// push the result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Const(ConstIndex),
    Null,
    True,
    False,
    Load(Slot),
    Store(Slot),
    Pop,
    /// Collect the top `n` values into a new array
    Array(u32),
    /// `object[index]`
    Index,
    /// `object[index] = value`; pops all three
    StoreIndex,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Not,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Jump(Target),
    /// Pops a boolean and jumps when it is false
    JumpIfFalse(Target),
    /// Call a function of the same unit by table index
    Call { function: u32, argc: u32 },
    CallBuiltin { builtin: Builtin, argc: u32 },
    /// Return the top of the stack to the caller
    Return,
    /// Raise the top of the stack as an exception
    Throw,
}
