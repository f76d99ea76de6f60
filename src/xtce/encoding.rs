//! Data encodings: the bit-level layout of each parameter.

use serde::{Deserialize, Serialize};

use crate::bits::{decode_signed, float_from_bits, BitCursor, Signedness};
use crate::packet::ParseContext;
use crate::value::Value;
use crate::xtce::calibrator::{Calibrator, ContextCalibrator};
use crate::xtce::criteria::{lookup_first, DiscreteLookup};
use crate::{Error, Result};

/// Byte order between the bytes of a multi-byte integer or float field.
/// Bit ordering within a byte is always MSB-first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// `mostSignificantByteFirst` (big-endian); the XTCE default.
    #[default]
    MostSignificantFirst,
    /// `leastSignificantByteFirst`; bytes are reversed before decoding.
    LeastSignificantFirst,
}

/// `<xtce:LinearAdjustment>`: `adjusted = intercept + slope * x`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearAdjustment {
    pub slope: i64,
    pub intercept: i64,
}

impl LinearAdjustment {
    #[must_use]
    pub fn apply(&self, x: i64) -> i64 {
        self.intercept + self.slope * x
    }
}

/// `<xtce:DynamicValue>`: a size taken from a parameter parsed earlier in
/// the same packet, with an optional linear adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicValue {
    pub parameter: String,
    pub use_calibrated: bool,
    pub adjustment: Option<LinearAdjustment>,
}

impl DynamicValue {
    /// Resolve to a bit count against the current context.
    ///
    /// # Errors
    /// [`Error::Evaluation`] if the parameter has not been parsed yet, is
    /// not numeric, or resolves to a negative or fractional bit count.
    pub fn resolve(&self, ctx: &ParseContext) -> Result<usize> {
        let pv = ctx.get(&self.parameter).ok_or_else(|| {
            Error::Evaluation(format!(
                "dynamic size references parameter {} which has not been parsed yet",
                self.parameter
            ))
        })?;
        let value = if self.use_calibrated {
            pv.value()
        } else {
            &pv.raw
        };
        let x = value.as_f64().ok_or_else(|| {
            Error::Evaluation(format!(
                "dynamic size parameter {} is not numeric: {value:?}",
                self.parameter
            ))
        })?;
        if x.fract() != 0.0 {
            return Err(Error::Evaluation(format!(
                "dynamic size parameter {} resolved to non-integer {x}",
                self.parameter
            )));
        }
        let adjusted = match self.adjustment {
            Some(adj) => adj.apply(x as i64),
            None => x as i64,
        };
        usize::try_from(adjusted).map_err(|_| {
            Error::Evaluation(format!(
                "dynamic size for parameter {} resolved to negative bit count {adjusted}",
                self.parameter
            ))
        })
    }
}

/// `<xtce:SizeInBits>` in its three forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SizeInBits {
    Fixed(usize),
    Dynamic(DynamicValue),
    /// Ordered `<xtce:DiscreteLookupList>`; the first match wins.
    Lookup(Vec<DiscreteLookup>),
}

impl SizeInBits {
    pub fn resolve(&self, ctx: &ParseContext) -> Result<usize> {
        match self {
            SizeInBits::Fixed(nbits) => Ok(*nbits),
            SizeInBits::Dynamic(dynamic) => dynamic.resolve(ctx),
            SizeInBits::Lookup(lookups) => {
                let nbits = lookup_first(lookups, ctx, None)?;
                if nbits < 0.0 || nbits.fract() != 0.0 {
                    return Err(Error::Evaluation(format!(
                        "discrete size lookup resolved to invalid bit count {nbits}"
                    )));
                }
                Ok(nbits as usize)
            }
        }
    }
}

/// `<xtce:IntegerDataEncoding>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerDataEncoding {
    pub size_bits: usize,
    pub signedness: Signedness,
    pub byte_order: ByteOrder,
    pub default_calibrator: Option<Calibrator>,
    pub context_calibrators: Vec<ContextCalibrator>,
}

impl IntegerDataEncoding {
    /// Plain unsigned big-endian encoding with no calibrators.
    #[must_use]
    pub fn unsigned(size_bits: usize) -> Self {
        IntegerDataEncoding {
            size_bits,
            signedness: Signedness::Unsigned,
            byte_order: ByteOrder::default(),
            default_calibrator: None,
            context_calibrators: Vec::new(),
        }
    }
}

/// `<xtce:FloatDataEncoding>`, IEEE 754 only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatDataEncoding {
    /// 16, 32, or 64; validated at load time.
    pub size_bits: usize,
    pub byte_order: ByteOrder,
    pub default_calibrator: Option<Calibrator>,
    pub context_calibrators: Vec<ContextCalibrator>,
}

/// Character set of a string parameter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Be,
    Utf16Le,
}

impl Charset {
    /// Width of one code unit in bytes. Termination characters are matched
    /// at code-unit granularity.
    #[must_use]
    pub fn unit_len(self) -> usize {
        match self {
            Charset::Utf8 => 1,
            Charset::Utf16Be | Charset::Utf16Le => 2,
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Evaluation(format!("invalid utf-8 string field: {e}"))),
            Charset::Utf16Be | Charset::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::Evaluation(format!(
                        "utf-16 string field has odd byte length {}",
                        bytes.len()
                    )));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match self {
                        Charset::Utf16Be => u16::from_be_bytes([pair[0], pair[1]]),
                        _ => u16::from_le_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                String::from_utf16(&units)
                    .map_err(|e| Error::Evaluation(format!("invalid utf-16 string field: {e}")))
            }
        }
    }
}

/// `<xtce:StringDataEncoding>`
///
/// `raw_length` sizes the raw buffer read from the packet. Within that
/// buffer the derived string is delimited by a leading length field or a
/// termination character; with neither, the whole buffer is the string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringDataEncoding {
    pub charset: Charset,
    pub raw_length: SizeInBits,
    /// Encoded termination character, one code unit long. Consumed from
    /// the derived string but the raw buffer retains it.
    pub termination: Option<Vec<u8>>,
    /// Width of a leading field holding the derived string length in bits.
    pub leading_size_bits: Option<usize>,
}

/// `<xtce:BinaryDataEncoding>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryDataEncoding {
    pub size: SizeInBits,
}

/// Tagged union over the four encoding forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataEncoding {
    Integer(IntegerDataEncoding),
    Float(FloatDataEncoding),
    Str(StringDataEncoding),
    Binary(BinaryDataEncoding),
}

impl DataEncoding {
    /// Read one value at the cursor, resolving any dynamic sizes against
    /// `ctx`, and apply calibrators. Returns the raw value and the
    /// calibrated value if one was produced.
    pub fn parse(
        &self,
        cursor: &mut BitCursor<'_>,
        ctx: &ParseContext,
    ) -> Result<(Value, Option<Value>)> {
        match self {
            DataEncoding::Integer(enc) => {
                let mut bits = cursor.read_uint(enc.size_bits)?;
                if enc.byte_order == ByteOrder::LeastSignificantFirst {
                    bits = reverse_bytes(bits, enc.size_bits);
                }
                let raw = match enc.signedness {
                    Signedness::Unsigned => Value::Uint(bits),
                    signed => Value::Int(decode_signed(bits, enc.size_bits, signed)),
                };
                let calibrated = calibrate(
                    &enc.context_calibrators,
                    enc.default_calibrator.as_ref(),
                    ctx,
                    &raw,
                )?;
                Ok((raw, calibrated))
            }
            DataEncoding::Float(enc) => {
                let mut bits = cursor.read_uint(enc.size_bits)?;
                if enc.byte_order == ByteOrder::LeastSignificantFirst {
                    bits = reverse_bytes(bits, enc.size_bits);
                }
                let raw = Value::Float(float_from_bits(bits, enc.size_bits)?);
                let calibrated = calibrate(
                    &enc.context_calibrators,
                    enc.default_calibrator.as_ref(),
                    ctx,
                    &raw,
                )?;
                Ok((raw, calibrated))
            }
            DataEncoding::Str(enc) => {
                let buffer = cursor.read_bytes(enc.raw_length.resolve(ctx)?)?;
                let decoded = decode_string(enc, &buffer)?;
                Ok((Value::Bytes(buffer), Some(Value::Str(decoded))))
            }
            DataEncoding::Binary(enc) => {
                let nbits = enc.size.resolve(ctx)?;
                Ok((Value::Bytes(cursor.read_bytes(nbits)?), None))
            }
        }
    }
}

/// First matching context calibrator, else the default, else nothing.
fn calibrate(
    context_calibrators: &[ContextCalibrator],
    default: Option<&Calibrator>,
    ctx: &ParseContext,
    raw: &Value,
) -> Result<Option<Value>> {
    let x = match raw.as_f64() {
        Some(x) => x,
        None => return Ok(None),
    };
    for candidate in context_calibrators {
        if candidate.matches(ctx, raw)? {
            return Ok(Some(Value::Float(candidate.calibrator.calibrate(x)?)));
        }
    }
    match default {
        Some(calibrator) => Ok(Some(Value::Float(calibrator.calibrate(x)?))),
        None => Ok(None),
    }
}

fn decode_string(enc: &StringDataEncoding, buffer: &[u8]) -> Result<String> {
    if let Some(lead_bits) = enc.leading_size_bits {
        let mut inner = BitCursor::new(buffer);
        let strlen_bits = inner.read_uint(lead_bits)? as usize;
        if strlen_bits % 8 != 0 {
            return Err(Error::Evaluation(format!(
                "leading string length of {strlen_bits} bits is not a whole number of bytes"
            )));
        }
        let bytes = inner.read_bytes(strlen_bits)?;
        return enc.charset.decode(&bytes);
    }
    if let Some(term) = &enc.termination {
        // Match at code-unit boundaries so a terminator byte inside a
        // multi-byte character cannot split the string.
        let step = enc.charset.unit_len();
        let end = (0..buffer.len().saturating_sub(term.len() - 1))
            .step_by(step)
            .find(|&at| &buffer[at..at + term.len()] == term.as_slice())
            .ok_or_else(|| {
                Error::Evaluation(format!(
                    "termination character {term:02x?} not found in string buffer"
                ))
            })?;
        return enc.charset.decode(&buffer[..end]);
    }
    enc.charset.decode(buffer)
}

/// Reverse the `ceil(nbits / 8)` low bytes of `bits`.
fn reverse_bytes(bits: u64, nbits: usize) -> u64 {
    let nbytes = nbits.div_ceil(8);
    let mut out = 0u64;
    for i in 0..nbytes {
        out = (out << 8) | (bits >> (8 * i)) & 0xff;
    }
    out
}
