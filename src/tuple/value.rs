//! SQL scalar type system and the `Value` tagged union.

use std::cmp::Ordering;
use std::fmt;

/// SQL type identifiers, with their fixed-width size in bytes (0 for
/// variable-length types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Timestamp,
    Decimal,
    Varchar,
}

impl TypeId {
    /// Fixed-width size in bytes; `0` for `Varchar`, which is length-prefixed
    /// and stored in the variable area instead.
    pub fn fixed_size(&self) -> usize {
        match self {
            TypeId::Boolean | TypeId::TinyInt => 1,
            TypeId::SmallInt => 2,
            TypeId::Integer | TypeId::Float => 4,
            TypeId::BigInt | TypeId::Double | TypeId::Timestamp | TypeId::Decimal => 8,
            TypeId::Varchar => 0,
        }
    }

    pub fn is_variable_length(&self) -> bool {
        matches!(self, TypeId::Varchar)
    }

    pub fn is_integer_family(&self) -> bool {
        matches!(
            self,
            TypeId::TinyInt | TypeId::SmallInt | TypeId::Integer | TypeId::BigInt
        )
    }

    pub fn is_float_family(&self) -> bool {
        matches!(self, TypeId::Float | TypeId::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer_family() || self.is_float_family() || matches!(self, TypeId::Decimal)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TypeId::Boolean => "BOOLEAN",
            TypeId::TinyInt => "TINYINT",
            TypeId::SmallInt => "SMALLINT",
            TypeId::Integer => "INTEGER",
            TypeId::BigInt => "BIGINT",
            TypeId::Float => "FLOAT",
            TypeId::Double => "DOUBLE",
            TypeId::Timestamp => "TIMESTAMP",
            TypeId::Decimal => "DECIMAL",
            TypeId::Varchar => "VARCHAR",
        };
        write!(f, "{}", name)
    }
}

/// A tagged scalar value (or null). `Null` compares unequal to everything,
/// including itself — callers needing three-valued semantics should use
/// [`Value::sql_eq`] / the expression evaluator rather than `PartialEq`
/// directly when null matters.
#[derive(Debug, Clone)]
pub enum Value {
    Null(TypeId),
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Timestamp(i64),
    Decimal(i64),
    Varchar(String),
}

impl Value {
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Null(t) => *t,
            Value::Boolean(_) => TypeId::Boolean,
            Value::TinyInt(_) => TypeId::TinyInt,
            Value::SmallInt(_) => TypeId::SmallInt,
            Value::Integer(_) => TypeId::Integer,
            Value::BigInt(_) => TypeId::BigInt,
            Value::Float(_) => TypeId::Float,
            Value::Double(_) => TypeId::Double,
            Value::Timestamp(_) => TypeId::Timestamp,
            Value::Decimal(_) => TypeId::Decimal,
            Value::Varchar(_) => TypeId::Varchar,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Safe, non-panicking numeric view used by hot executor paths so they
    /// never unwind on a type mismatch (spec §9 design note).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::TinyInt(v) => Some(*v as f64),
            Value::SmallInt(v) => Some(*v as f64),
            Value::Integer(v) => Some(*v as f64),
            Value::BigInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Timestamp(v) => Some(*v as f64),
            Value::Decimal(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(*v as i64),
            Value::SmallInt(v) => Some(*v as i64),
            Value::Integer(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            Value::Timestamp(v) => Some(*v),
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    /// Three-valued equality: `None` means "unknown" (either side null).
    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        self.sql_cmp(other).map(|o| o == Ordering::Equal)
    }

    /// Three-valued ordering used by comparisons, ORDER BY, and join keys.
    /// `None` propagates null. Integers/floats compare numerically after
    /// promotion; strings lexicographically; booleans `false < true`.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }

    /// Coerces this value into the target fixed-width integer/float type by
    /// truncation/narrowing, as required by UPDATE's SET-value coercion
    /// (spec §4.11). Returns `None` for incompatible coercions.
    pub fn coerce(&self, target: TypeId) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null(target));
        }
        match target {
            TypeId::Boolean => self.as_bool().map(Value::Boolean),
            TypeId::TinyInt => self.as_i64().map(|v| Value::TinyInt(v as i8)),
            TypeId::SmallInt => self.as_i64().map(|v| Value::SmallInt(v as i16)),
            TypeId::Integer => self.as_i64().map(|v| Value::Integer(v as i32)),
            TypeId::BigInt => self.as_i64().map(Value::BigInt),
            TypeId::Float => self.as_f64().map(|v| Value::Float(v as f32)),
            TypeId::Double => self.as_f64().map(Value::Double),
            TypeId::Timestamp => self.as_i64().map(Value::Timestamp),
            TypeId::Decimal => self.as_i64().map(Value::Decimal),
            TypeId::Varchar => match self {
                Value::Varchar(s) => Some(Value::Varchar(s.clone())),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null(_) => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Varchar(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_never_equal() {
        let a = Value::Null(TypeId::Integer);
        let b = Value::Null(TypeId::Integer);
        assert_eq!(a.sql_eq(&b), None);
        assert_eq!(a.sql_eq(&Value::Integer(0)), None);
    }

    #[test]
    fn cross_type_numeric_compare() {
        let a = Value::Integer(3);
        let b = Value::Double(3.0);
        assert_eq!(a.sql_cmp(&b), Some(Ordering::Equal));
    }

    #[test]
    fn bool_order() {
        assert_eq!(
            Value::Boolean(false).sql_cmp(&Value::Boolean(true)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn coerce_truncates() {
        let v = Value::BigInt(300);
        let coerced = v.coerce(TypeId::TinyInt).unwrap();
        assert_eq!(coerced.as_i64(), Some(300i64 as i8 as i64));
    }
}
