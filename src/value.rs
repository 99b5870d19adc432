//! Attribute values stored on resources.
//!
//! Search parameters are evaluated against these values. Multi-valued
//! attributes (several codes, several names) are held as `Value::List` and
//! matched element by element.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Possible values a resource attribute can hold.
///
/// # Examples
///
/// ```
/// use submatch::Value;
///
/// let status = Value::from("final");
/// let count = Value::Int(3);
///
/// assert!(status.is_string());
/// assert_eq!(count.as_float(), Some(3.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// `true` or `false`.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Plain text, including coded `system|code` tokens.
    String(String),
    /// A point in time (dates are stored at midnight UTC).
    Instant(DateTime<Utc>),
    /// A literal reference such as `Patient/42`.
    Reference(String),
    /// Several values for one attribute.
    List(Vec<Value>),
    /// Explicitly empty.
    Null,
}

impl Value {
    /// True for plain strings (not references).
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// The boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Text of a string or reference.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Reference(v) => Some(v),
            _ => None,
        }
    }

    /// The instant, if this is one.
    #[must_use]
    pub const fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Instant(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the scalar values held by this value.
    ///
    /// Lists are flattened one level deep per nesting; `Null` yields nothing.
    #[must_use]
    pub fn scalars(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        collect_scalars(self, &mut out);
        out
    }

    /// True when the value carries no data (null or an empty list).
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.scalars().is_empty()
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Instant(_) => "instant",
            Self::Reference(_) => "reference",
            Self::List(_) => "list",
            Self::Null => "null",
        }
    }
}

fn collect_scalars<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Null => {}
        Value::List(items) => {
            for item in items {
                collect_scalars(item, out);
            }
        }
        other => out.push(other),
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Instant(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Reference(v) => write!(f, "ref:{v}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Instant(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}
