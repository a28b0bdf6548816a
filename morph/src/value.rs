//! Value: any value the interpreter can hold in a local, an array element or
//! an instance variable.
//!
//! Immediates (`nil`, booleans, integers, floats, symbols) are stored inline;
//! everything else is a reference with stable identity.
use std::{fmt, sync::Arc};

use crate::{RubyArray, RubyClass, RubyObject, StorageKind, Symbol};

pub type ObjectRef = Arc<RubyObject>;
pub type ClassRef = Arc<RubyClass>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Symbol(Symbol),
    String(Arc<str>),
    Object(ObjectRef),
    Class(ClassRef),
}

impl Value {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// `nil`, `true` and `false` answer their class when asked for a
    /// singleton class.
    #[inline]
    pub fn has_class_as_singleton(&self) -> bool {
        matches!(self, Value::Nil | Value::Boolean(_))
    }

    /// `true` for values that are references to a heap object.
    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::String(_) | Value::Object(_) | Value::Class(_))
    }

    /// The narrowest kind able to hold this value.
    #[inline]
    pub fn natural_kind(&self) -> StorageKind {
        match self {
            Value::Boolean(_) => StorageKind::Boolean,
            Value::Integer(i) if i32::try_from(*i).is_ok() => StorageKind::Int32,
            Value::Integer(_) => StorageKind::Int64,
            Value::Float(_) => StorageKind::Float64,
            _ => StorageKind::Generic,
        }
    }

    /// `true` if a location of `kind` holds this value as is.
    ///
    /// Integers never fit `Float64`: a local or instance variable keeps the
    /// class of the value written to it.
    pub fn fits(&self, kind: StorageKind) -> bool {
        match (kind, self) {
            (StorageKind::Uninitialized, _) => false,
            (StorageKind::Generic, _) => true,
            (StorageKind::Boolean, Value::Boolean(_)) => true,
            (StorageKind::Int32, Value::Integer(i)) => {
                i32::try_from(*i).is_ok()
            }
            (StorageKind::Int64, Value::Integer(_)) => true,
            (StorageKind::Float64, Value::Float(_)) => true,
            _ => false,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float, integers included.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    #[inline]
    pub fn as_class(&self) -> Option<&ClassRef> {
        match self {
            Value::Class(class) => Some(class),
            _ => None,
        }
    }

    /// The array body of this value, if it is an array object.
    pub fn as_array(&self) -> Option<&RubyArray> {
        self.as_object().and_then(|object| object.as_array())
    }

    pub fn string(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

/// Equality follows the language's `==`: numerics compare by value across
/// integer and float, references compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(i), Value::Float(f))
            | (Value::Float(f), Value::Integer(i)) => *i as f64 == *f,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

impl From<ClassRef> for Value {
    fn from(value: ClassRef) -> Self {
        Value::Class(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Symbol(sym) => write!(f, ":{}", sym.as_raw()),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(object) => write!(
                f,
                "#<{}:{:p}>",
                object.logical_class().name(),
                Arc::as_ptr(object)
            ),
            Value::Class(class) => f.write_str(class.name()),
        }
    }
}
