use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{CellsId, SpaceId};

/// A value flowing through the model: argument keys, reference payloads,
/// cells results and formula intermediates all use this one type.
///
/// Equality and hashing are *by value* so identical argument tuples always
/// land on the same cache slot. Numbers compare across `Int` and `Number`
/// (`2 == 2.0`); other floats compare by bit pattern.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
    Array(Vec<Value>),
    Space(SpaceId),
    Cells(CellsId),
}

/// Canonical form of a number for equality and hashing: integral floats
/// collapse onto the matching integer, so `2` and `2.0` are one key.
#[derive(PartialEq, Eq, Hash)]
enum NumberKey {
    Int(i64),
    Bits(u64),
}

impl NumberKey {
    fn of_float(n: f64) -> Self {
        // 2^63 is the first float past i64::MAX
        if n.fract() == 0.0 && n >= i64::MIN as f64 && n < 9_223_372_036_854_775_808.0 {
            NumberKey::Int(n as i64)
        } else {
            NumberKey::Bits(n.to_bits())
        }
    }
}

impl Value {
    fn number_key(&self) -> Option<NumberKey> {
        match self {
            Value::Int(i) => Some(NumberKey::Int(*i)),
            Value::Number(n) => Some(NumberKey::of_float(*n)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(_) | Value::Number(_), Value::Int(_) | Value::Number(_)) => {
                self.number_key() == other.number_key()
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Space(a), Value::Space(b)) => a == b,
            (Value::Cells(a), Value::Cells(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Empty => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Int(_) | Value::Number(_) => {
                2u8.hash(state);
                self.number_key().hash(state);
            }
            Value::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Array(a) => {
                4u8.hash(state);
                a.hash(state);
            }
            Value::Space(s) => {
                5u8.hash(state);
                s.hash(state);
            }
            Value::Cells(c) => {
                6u8.hash(state);
                c.hash(state);
            }
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "NONE"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Space(id) => write!(f, "<{id}>"),
            Value::Cells(id) => write!(f, "<{id}>"),
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Space(_) => "space",
            Value::Cells(_) => "cells",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Numeric view used by arithmetic and comparisons. Booleans count as 0/1.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_space(&self) -> Option<SpaceId> {
        match self {
            Value::Space(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_cells(&self) -> Option<CellsId> {
        match self {
            Value::Cells(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Space(_) | Value::Cells(_) => true,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<SpaceId> for Value {
    fn from(id: SpaceId) -> Self {
        Value::Space(id)
    }
}

impl From<CellsId> for Value {
    fn from(id: CellsId) -> Self {
        Value::Cells(id)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fractional_floats_compare_by_bits() {
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
        assert_ne!(Value::Number(1.5), Value::Int(1));
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(f64::INFINITY), Value::Int(i64::MAX));
    }

    #[test]
    fn integral_numbers_share_a_key() {
        let mut set = HashSet::new();
        set.insert(Value::Int(2));
        set.insert(Value::Number(2.0));
        set.insert(Value::Number(-0.0));
        set.insert(Value::Int(0));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Value::Number(2.0)));
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Number(2.0)]),
            Value::Array(vec![Value::Number(1.0), Value::Int(2)])
        );
        assert_ne!(Value::Bool(true), Value::Int(1));
    }

    #[test]
    fn display_matches_formula_literals() {
        assert_eq!(Value::Bool(true).to_string(), "TRUE");
        assert_eq!(Value::Empty.to_string(), "NONE");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1, 2]");
    }
}
