//! Bit-level reads over a packet buffer.
//!
//! Fields in CCSDS user data start at arbitrary bit offsets and have
//! arbitrary bit widths, so all extraction goes through [`BitCursor`],
//! which tracks a bit position over a borrowed byte slice. Bit ordering is
//! always MSB-first; byte order for multi-byte encodings is handled by the
//! encoding layer by reversing bytes before decoding.

use crate::{Error, Result};

/// Interpretation of the sign bits of an integer field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Signedness {
    #[default]
    Unsigned,
    TwosComplement,
    OnesComplement,
    SignMagnitude,
}

/// Cursor over one packet's bytes with bit granularity.
///
/// Reads extract bits `[position, position + nbits)` and advance the
/// cursor. Any read past the end of the buffer fails with
/// [`Error::BitRead`] and leaves the position unchanged.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitCursor<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        BitCursor { data, pos: 0 }
    }

    /// Current position in bits from the start of the buffer.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bits left between the cursor and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    pub fn skip(&mut self, nbits: usize) -> Result<()> {
        self.check(nbits)?;
        self.pos += nbits;
        Ok(())
    }

    fn check(&self, nbits: usize) -> Result<()> {
        if self.pos + nbits > self.data.len() * 8 {
            return Err(Error::BitRead {
                position: self.pos,
                requested: nbits,
                size: self.data.len() * 8,
            });
        }
        Ok(())
    }

    /// Read `nbits` (at most 64) as a big-endian unsigned integer.
    pub fn read_uint(&mut self, nbits: usize) -> Result<u64> {
        debug_assert!(nbits <= 64, "read_uint supports at most 64 bits");
        self.check(nbits)?;
        let mut val = 0u64;
        let mut remaining = nbits;
        while remaining > 0 {
            let byte = self.data[self.pos / 8];
            let offset = self.pos % 8;
            let take = (8 - offset).min(remaining);
            let chunk = (byte >> (8 - offset - take)) & ((1u16 << take) - 1) as u8;
            val = (val << take) | u64::from(chunk);
            self.pos += take;
            remaining -= take;
        }
        Ok(val)
    }

    /// Read `nbits` (at most 64) as a signed integer per `signedness`.
    pub fn read_int(&mut self, nbits: usize, signedness: Signedness) -> Result<i64> {
        let raw = self.read_uint(nbits)?;
        Ok(decode_signed(raw, nbits, signedness))
    }

    /// Read `nbits` as bytes.
    ///
    /// Returns `ceil(nbits / 8)` bytes. When `nbits` is not a whole number
    /// of bytes, the final byte is right-padded with zero bits. Byte-aligned
    /// whole-byte reads are a straight slice copy.
    pub fn read_bytes(&mut self, nbits: usize) -> Result<Vec<u8>> {
        self.check(nbits)?;
        if self.pos % 8 == 0 && nbits % 8 == 0 {
            // Aligned fast path: the dominant case for binary blobs.
            let start = self.pos / 8;
            let out = self.data[start..start + nbits / 8].to_vec();
            self.pos += nbits;
            return Ok(out);
        }
        let mut out = Vec::with_capacity(nbits.div_ceil(8));
        let mut taken = 0;
        while taken < nbits {
            let take = (nbits - taken).min(8);
            let b = self.read_uint(take)? as u8;
            // Partial final byte keeps its bits in the high positions.
            out.push(b << (8 - take));
            taken += take;
        }
        Ok(out)
    }

    /// Read an IEEE 754 float of 16, 32, or 64 bits.
    pub fn read_float(&mut self, nbits: usize) -> Result<f64> {
        let raw = self.read_uint(nbits)?;
        float_from_bits(raw, nbits)
    }
}

/// Interpret the low `nbits` of `raw` per `signedness`.
#[must_use]
pub fn decode_signed(raw: u64, nbits: usize, signedness: Signedness) -> i64 {
    if nbits == 0 {
        return 0;
    }
    let sign_bit = 1u64 << (nbits - 1);
    match signedness {
        Signedness::Unsigned => raw as i64,
        Signedness::TwosComplement => {
            if nbits < 64 && raw & sign_bit != 0 {
                raw as i64 - (1i64 << nbits)
            } else {
                raw as i64
            }
        }
        Signedness::OnesComplement => {
            if raw & sign_bit != 0 {
                let mask = if nbits == 64 { u64::MAX } else { (1u64 << nbits) - 1 };
                -((!raw & mask) as i64)
            } else {
                raw as i64
            }
        }
        Signedness::SignMagnitude => {
            let magnitude = (raw & !sign_bit) as i64;
            if raw & sign_bit != 0 {
                -magnitude
            } else {
                magnitude
            }
        }
    }
}

/// Decode the low `nbits` of `raw` as an IEEE 754 value.
pub fn float_from_bits(raw: u64, nbits: usize) -> Result<f64> {
    match nbits {
        16 => Ok(half_to_f64(raw as u16)),
        32 => Ok(f64::from(f32::from_bits(raw as u32))),
        64 => Ok(f64::from_bits(raw)),
        other => Err(Error::Evaluation(format!(
            "unsupported float width {other}, must be 16, 32, or 64 bits"
        ))),
    }
}

// IEEE 754 binary16. Rust has no stable f16, so widen by hand.
fn half_to_f64(bits: u16) -> f64 {
    let sign = if bits >> 15 == 1 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let fraction = f64::from(bits & 0x3ff);
    let magnitude = match exponent {
        0 => fraction * 2f64.powi(-24),
        0x1f => {
            if fraction == 0.0 {
                f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    };
    sign * magnitude
}
