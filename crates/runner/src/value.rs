//! Dynamically typed column and argument values, and their typed conversions.
//!
//! Conversions come in two strictness levels. [`Strictness::Exact`] accepts a
//! value only when its variant is the requested type; it is what the fast
//! projector uses. [`Strictness::Lenient`] widens, narrows with range checks
//! and parses text; it backs the slow projector.

use serde::Serialize;
use sluice_error::{ErrorCode, ErrorContext, SluiceError};
use std::fmt;
use thiserror::Error;

/// A single column or argument value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// The variant tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// The runtime arguments of one call, in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs(Vec<Value>);

impl CallArgs {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// How strictly a column value is converted to a Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Only the matching variant converts.
    Exact,
    /// Casts and parses where the value allows it.
    Lenient,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strictness::Exact => f.write_str("exact"),
            Strictness::Lenient => f.write_str("lenient"),
        }
    }
}

/// Why a single value did not convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    /// The variant cannot represent the target type.
    Cast,
    /// The variant is text that does not parse as the target type.
    Format,
}

/// A column conversion failure, tagged so the mapper can tell it apart from
/// any other projection error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionFailure {
    #[error("column {ordinal}: cannot cast {actual} to {expected}")]
    Cast {
        ordinal: usize,
        expected: &'static str,
        actual: ValueKind,
    },

    #[error("column {ordinal}: '{text}' is not a valid {expected}")]
    Format {
        ordinal: usize,
        expected: &'static str,
        text: String,
    },

    #[error("row shape mismatch: {detail}")]
    Shape { ordinal: usize, detail: String },
}

impl CoercionFailure {
    pub fn ordinal(&self) -> usize {
        match self {
            CoercionFailure::Cast { ordinal, .. }
            | CoercionFailure::Format { ordinal, .. }
            | CoercionFailure::Shape { ordinal, .. } => *ordinal,
        }
    }

    /// Converts into the caller-facing error, naming the projection that was
    /// active when the column failed.
    pub fn to_sluice_error(&self, projection: Option<&str>) -> SluiceError {
        let (expected, actual) = match self {
            CoercionFailure::Cast {
                expected, actual, ..
            } => (expected.to_string(), actual.to_string()),
            CoercionFailure::Format { expected, text, .. } => {
                (expected.to_string(), format!("text '{}'", text))
            }
            CoercionFailure::Shape { detail, .. } => ("row shape".to_string(), detail.clone()),
        };

        SluiceError::new(ErrorCode::CoercionFailed, self.to_string()).with_context(
            ErrorContext::Coercion {
                ordinal: self.ordinal(),
                expected,
                actual,
                projection: projection.map(str::to_string),
            },
        )
    }

    pub(crate) fn from_mismatch(
        mismatch: Mismatch,
        ordinal: usize,
        expected: &'static str,
        value: &Value,
    ) -> Self {
        match (mismatch, value) {
            (Mismatch::Format, Value::Text(text)) => CoercionFailure::Format {
                ordinal,
                expected,
                text: text.clone(),
            },
            _ => CoercionFailure::Cast {
                ordinal,
                expected,
                actual: value.kind(),
            },
        }
    }
}

/// Conversion from a column [`Value`] into a Rust type.
pub trait FromValue: Sized {
    /// Name of the target type, used in error messages.
    const TYPE_NAME: &'static str;

    /// Direct conversion: succeeds only on the matching variant.
    fn from_exact(value: &Value) -> Option<Self>;

    /// Defensive conversion.
    fn from_lenient(value: &Value) -> Result<Self, Mismatch>;

    fn convert(value: &Value, strictness: Strictness) -> Result<Self, Mismatch> {
        match strictness {
            Strictness::Exact => Self::from_exact(value).ok_or(Mismatch::Cast),
            Strictness::Lenient => Self::from_lenient(value),
        }
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn from_exact(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_exact(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Float(x) if x.fract() == 0.0 && *x >= i64::MIN as f64 && *x < i64::MAX as f64 => {
                Ok(*x as i64)
            }
            Value::Text(s) => s.trim().parse().map_err(|_| Mismatch::Format),
            _ => Err(Mismatch::Cast),
        }
    }
}

macro_rules! narrow_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_exact(value: &Value) -> Option<Self> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(*i).ok(),
                        _ => None,
                    }
                }

                fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
                    let wide = i64::from_lenient(value)?;
                    <$ty>::try_from(wide).map_err(|_| Mismatch::Cast)
                }
            }
        )*
    };
}

narrow_int!(i32 => "int32", u32 => "uint32", u64 => "uint64");

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_exact(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
        match value {
            Value::Float(x) => Ok(*x),
            Value::Int(i) => Ok(*i as f64),
            Value::Text(s) => s.trim().parse().map_err(|_| Mismatch::Format),
            _ => Err(Mismatch::Cast),
        }
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_exact(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(true),
                "false" | "f" | "no" | "0" => Ok(false),
                _ => Err(Mismatch::Format),
            },
            _ => Err(Mismatch::Cast),
        }
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "text";

    fn from_exact(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(x) => Ok(x.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|_| Mismatch::Format),
            Value::Null => Err(Mismatch::Cast),
        }
    }
}

impl FromValue for Vec<u8> {
    const TYPE_NAME: &'static str = "bytes";

    fn from_exact(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }

    fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(Mismatch::Cast),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_exact(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_exact(other).map(Some),
        }
    }

    fn from_lenient(value: &Value) -> Result<Self, Mismatch> {
        match value {
            Value::Null => Ok(None),
            other => T::from_lenient(other).map(Some),
        }
    }
}
