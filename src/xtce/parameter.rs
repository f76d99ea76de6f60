//! Parameters and parameter types.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use hifitime::Epoch;

use crate::bits::BitCursor;
use crate::packet::ParseContext;
use crate::value::{ParameterValue, Value};
use crate::xtce::encoding::DataEncoding;
use crate::{Error, Result};

/// The seven XTCE parameter-type kinds.
///
/// The kind decides how the decoded raw value is derived: enumerations map
/// integers to labels, booleans map to true/false, and so on. The bit-level
/// layout always comes from the [`DataEncoding`] on the owning
/// [`ParameterType`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    Integer,
    Float,
    /// Raw integer to label mapping. An unmapped raw value surfaces the
    /// integer with the `unrecognized_enum` flag set; no label is invented.
    Enumerated { labels: HashMap<i64, String> },
    Str,
    Binary,
    Boolean,
    AbsoluteTime {
        epoch: Option<String>,
        offset_from: Option<String>,
    },
    RelativeTime {
        epoch: Option<String>,
        offset_from: Option<String>,
    },
}

/// A named parameter type: kind, unit, and data encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterType {
    pub name: String,
    pub unit: Option<String>,
    pub kind: ParameterKind,
    pub encoding: DataEncoding,
}

impl ParameterType {
    /// Decode one value at the cursor and derive per this type's kind.
    pub fn parse_value(
        &self,
        cursor: &mut BitCursor<'_>,
        ctx: &ParseContext,
    ) -> Result<ParameterValue> {
        let (raw, calibrated) = self.encoding.parse(cursor, ctx)?;
        let mut value = ParameterValue {
            raw,
            calibrated,
            unit: self.unit.clone(),
            unrecognized_enum: false,
        };
        match &self.kind {
            ParameterKind::Enumerated { labels } => {
                // Lookup is always on the raw value, per the XTCE spec.
                let key = value.raw.as_i64().ok_or_else(|| {
                    Error::Evaluation(format!(
                        "enumerated type {} requires an integer encoding",
                        self.name
                    ))
                })?;
                match labels.get(&key) {
                    Some(label) => value.calibrated = Some(Value::Str(label.clone())),
                    None => {
                        value.calibrated = None;
                        value.unrecognized_enum = true;
                    }
                }
            }
            ParameterKind::Boolean => {
                let truthy = value.raw.as_f64().map_or(false, |x| x != 0.0);
                value.calibrated = Some(Value::Bool(truthy));
            }
            _ => {}
        }
        Ok(value)
    }

    /// The reference epoch for a time parameter type, resolved to an
    /// [`Epoch`]. `None` for non-time types and time types without a
    /// declared epoch.
    pub fn reference_epoch(&self) -> Option<Result<Epoch>> {
        match &self.kind {
            ParameterKind::AbsoluteTime { epoch, .. }
            | ParameterKind::RelativeTime { epoch, .. } => {
                epoch.as_deref().map(resolve_epoch)
            }
            _ => None,
        }
    }
}

/// Resolve an XTCE epoch string: a named epoch (`TAI`, `J2000`, `UNIX`,
/// `POSIX`, `GPS`) or a Gregorian date/datetime string.
pub fn resolve_epoch(epoch: &str) -> Result<Epoch> {
    match epoch {
        "TAI" => Ok(Epoch::from_tai_seconds(0.0)),
        "UNIX" | "POSIX" => Ok(Epoch::from_unix_seconds(0.0)),
        "GPS" => Ok(Epoch::from_gpst_seconds(0.0)),
        "J2000" => Ok(Epoch::from_et_seconds(0.0)),
        other => Epoch::from_str(other).map_err(|e| {
            Error::Definition(format!("unresolvable epoch string {other:?}: {e}"))
        }),
    }
}

/// `<xtce:Parameter>`: a named instance of a parameter type.
///
/// Parameters are shared between containers by reference; every entry list
/// naming `MY_PARAM` points at the same instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub parameter_type: Arc<ParameterType>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, parameter_type: Arc<ParameterType>) -> Self {
        Parameter {
            name: name.into(),
            parameter_type,
            short_description: None,
            long_description: None,
        }
    }
}
