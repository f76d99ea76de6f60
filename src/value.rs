//! Parsed parameter values.

use std::fmt::Display;

use serde::Serialize;

/// A single decoded scalar.
///
/// `Uint`/`Int` hold integer-encoded data, `Float` holds float-encoded or
/// calibrated data, `Str` holds decoded strings and enumeration labels,
/// `Bytes` holds binary fields (and raw string buffers), and `Bool` holds
/// derived booleans.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Uint(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl Value {
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Bool(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Uint(v) => i64::try_from(*v).ok(),
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Numeric view of the value, widening integers to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Uint(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(f64::from(u8::from(*v))),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A parsed parameter: the raw encoded value plus the derived value, if the
/// definition produces one.
///
/// The raw value is the closest representation of the bits in the packet:
/// an integer for integer encodings, the undecoded buffer for strings, and
/// so on. The calibrated value is the result of calibrators, enumeration
/// lookups, or boolean derivation; it is `None` when the definition has no
/// applicable transformation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterValue {
    pub raw: Value,
    pub calibrated: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Set when an enumerated parameter's raw value has no declared label.
    /// The raw integer is still available; no label is synthesized.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unrecognized_enum: bool,
}

impl ParameterValue {
    #[must_use]
    pub fn new(raw: Value) -> Self {
        ParameterValue {
            raw,
            calibrated: None,
            unit: None,
            unrecognized_enum: false,
        }
    }

    /// The derived value when present, the raw value otherwise. This is the
    /// value comparisons and dynamic lengths use by default.
    #[must_use]
    pub fn value(&self) -> &Value {
        self.calibrated.as_ref().unwrap_or(&self.raw)
    }
}

impl Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())?;
        if let Some(unit) = &self.unit {
            write!(f, " {unit}")?;
        }
        Ok(())
    }
}
