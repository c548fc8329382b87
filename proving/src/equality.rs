//! Deep structural equality.
//!
//! [`Comparator::deep_equal`] compares two [`Value`]s recursively:
//!
//! - Primitives and their boxed wrappers compare by value (`"5"` equals
//!   `Value::boxed("5")`), with `NaN` equal to itself and `0` unequal to `-0`.
//! - Dates compare by instant; invalid dates are never equal.
//! - Patterns compare by source and flags.
//! - Callables compare by identity only.
//! - Sequences compare by length, hole positions and elements.
//! - Maps compare by own keys and values, regardless of key order.
//!
//! Cyclic structures are handled: a container already being compared on the
//! left-hand side is presumed equal.

use crate::{Config, Value};

/// Classification of a value for comparison purposes.
///
/// Boxed wrappers classify as the primitive they wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Undefined,
    Null,
    Text,
    Number,
    Boolean,
    Temporal,
    Pattern,
    Callable,
    Sequence,
    Map,
}

impl Kind {
    pub fn of(value: &Value) -> Kind {
        match value {
            Value::Undefined => Kind::Undefined,
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Boolean,
            Value::Number(_) => Kind::Number,
            Value::Text(_) => Kind::Text,
            Value::Boxed(inner) => Kind::of(inner),
            Value::Date(_) => Kind::Temporal,
            Value::Pattern(_) => Kind::Pattern,
            Value::Callable(_) => Kind::Callable,
            Value::Sequence(_) => Kind::Sequence,
            Value::Map(_) => Kind::Map,
        }
    }
}

/// Recursive equality with cycle detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Comparator {
    compare_last_index: bool,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also require global patterns to agree on their `last_index` cursor.
    pub fn with_last_index(mut self, enabled: bool) -> Self {
        self.compare_last_index = enabled;
        self
    }

    /// True when every adjacent pair in `values` is deeply equal.
    ///
    /// Fewer than two values are trivially equal.
    pub fn equals(&self, values: &[Value]) -> bool {
        values
            .windows(2)
            .all(|pair| self.eq(&pair[0], &pair[1], &mut Vec::new()))
    }

    pub fn deep_equal(&self, left: &Value, right: &Value) -> bool {
        self.eq(left, right, &mut Vec::new())
    }

    fn eq(&self, left: &Value, right: &Value, stack: &mut Vec<usize>) -> bool {
        if left.strict_eq(right) {
            return match left {
                Value::Number(n) if *n == 0.0 => {
                    let other = right.as_number().unwrap_or_default();
                    n.is_sign_negative() == other.is_sign_negative()
                }
                _ => true,
            };
        }
        if left.is_nullish() || right.is_nullish() {
            return false;
        }

        let kind = Kind::of(left);
        if kind != Kind::of(right) {
            return false;
        }
        let (left, right) = (unbox(left), unbox(right));

        match (left, right) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() {
                    b.is_nan()
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => match (a.millis(), b.millis()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Value::Pattern(a), Value::Pattern(b)) => {
                a.source() == b.source()
                    && a.global() == b.global()
                    && a.ignore_case() == b.ignore_case()
                    && a.multiline() == b.multiline()
                    && (!self.compare_last_index || a.last_index() == b.last_index())
            }
            (Value::Sequence(_) | Value::Map(_), _) => self.eq_container(left, right, stack),
            _ => false,
        }
    }

    fn eq_container(&self, left: &Value, right: &Value, stack: &mut Vec<usize>) -> bool {
        let Some(address) = left.address() else {
            return false;
        };
        if stack.contains(&address) {
            return true;
        }
        stack.push(address);

        let result = match (left, right) {
            (Value::Sequence(a), Value::Sequence(b)) => {
                let (a, b) = (a.slots(), b.slots());
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|pair| match pair {
                        (Some(x), Some(y)) => self.eq(x, y, stack),
                        (None, None) => true,
                        _ => false,
                    })
            }
            (Value::Map(a), Value::Map(b)) => {
                let (a, b) = (a.entries(), b.entries());
                a.len() == b.len()
                    && a.iter().all(|(key, x)| {
                        b.iter()
                            .find(|(k, _)| k == key)
                            .is_some_and(|(_, y)| self.eq(x, y, stack))
                    })
            }
            _ => false,
        };

        stack.pop();
        result
    }
}

impl From<&Config> for Comparator {
    fn from(config: &Config) -> Self {
        Comparator::new().with_last_index(config.compares_last_index())
    }
}

fn unbox(value: &Value) -> &Value {
    match value {
        Value::Boxed(inner) => inner,
        other => other,
    }
}

/// Deep equality over adjacent pairs with the default [`Comparator`].
pub fn equals(values: &[Value]) -> bool {
    Comparator::default().equals(values)
}

/// Deep equality of two values with the default [`Comparator`].
pub fn deep_equal(left: &Value, right: &Value) -> bool {
    Comparator::default().deep_equal(left, right)
}
