use std::rc::Rc;

use crate::runtime::heap::Handle;

/// One datum on an operand stack or in a local slot.
///
/// The machine carries an explicit tag with every value; each opcode
/// validates the tag it expects and aborts on mismatch instead of
/// reinterpreting bits.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i32),
    Float(f32),
    /// String constant loaded from the pool (tag 2).
    Str(Rc<str>),
    /// Reference to a heap object.
    Obj(Handle),
    /// Reference to a heap array.
    Arr(Handle),
}

impl Value {
    /// Tag name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Obj(_) => "object",
            Value::Arr(_) => "array",
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Float operand: a `Float` directly, or an `Int` reinterpreted as an
    /// IEEE-754 bit pattern (float literals arrive as integer constants).
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(bits) => Some(f32::from_bits(*bits as u32)),
            _ => None,
        }
    }

    /// Identity equality: same-variant bit or handle comparison. Strings
    /// compare by pointer identity, matching the original slot compare.
    /// Values of different kinds are never equal.
    pub fn identity_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Obj(a), Value::Obj(b)) => a == b,
            (Value::Arr(a), Value::Arr(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Str(text) => write!(f, "{}", text),
            Value::Obj(_) => write!(f, "<object>"),
            Value::Arr(_) => write!(f, "<array>"),
        }
    }
}
