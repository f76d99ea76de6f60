//! Packet-level types: the CCSDS primary header, the ordered parse
//! context, and the decoded packet handed to consumers.

use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

use crate::bits::BitCursor;
use crate::value::ParameterValue;
use crate::{Error, Result};

pub type Apid = u16;

/// Default names for the seven primary-header parameters, in bit order.
pub const HEADER_FIELDS: [&str; 7] = [
    "VERSION",
    "TYPE",
    "SEC_HDR_FLG",
    "PKT_APID",
    "SEQ_FLGS",
    "SRC_SEQ_CTR",
    "PKT_LEN",
];

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets: 6 bytes,
/// big-endian, bit-packed.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    /// Packet grouping. See the `SEQ_*` values.
    pub sequence_flags: u8,
    pub sequence_count: u16,
    /// User-data length in bytes, minus one.
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Size of a `PrimaryHeader`
    pub const LEN: usize = 6;
    /// Maximum sequence count value (14 bits)
    pub const SEQ_MAX: u16 = 16383;
    /// Packet is a part of a packet group, but not first and not last
    pub const SEQ_CONTINUATION: u8 = 0;
    /// Packet is the first packet in a packet group
    pub const SEQ_FIRST: u8 = 1;
    /// Packet is the last packet in a packet group
    pub const SEQ_LAST: u8 = 2;
    /// Packet is not part of a packet group, i.e., standalone.
    pub const SEQ_UNSEGMENTED: u8 = 3;

    /// Decode from the leading 6 bytes of `buf`.
    ///
    /// The header is a bit-packed big-endian structure, so the fields are
    /// pulled through [`BitCursor`] in declaration order.
    ///
    /// # Errors
    /// [`Error::NotEnoughData`] if `buf` holds fewer than 6 bytes.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: buf.len(),
                minimum: Self::LEN,
            });
        }
        let mut bits = BitCursor::new(&buf[..Self::LEN]);
        let version = bits.read_uint(3)? as u8;
        let type_flag = bits.read_uint(1)? as u8;
        let has_secondary_header = bits.read_uint(1)? == 1;
        let apid = bits.read_uint(11)? as Apid;
        let sequence_flags = bits.read_uint(2)? as u8;
        let sequence_count = bits.read_uint(14)? as u16;
        let len_minus1 = bits.read_uint(16)? as u16;

        Ok(PrimaryHeader {
            version,
            type_flag,
            has_secondary_header,
            apid,
            sequence_flags,
            sequence_count,
            len_minus1,
        })
    }

    /// Total packet size in bytes, header included: `7 + PKT_LEN`.
    #[must_use]
    pub fn packet_len(&self) -> usize {
        Self::LEN + self.len_minus1 as usize + 1
    }
}

/// Ordered mapping of parameter name to parsed value for one packet.
///
/// Entries keep insertion order, which equals declaration order in the
/// definition; lookups by name are O(1). Re-inserting a name replaces the
/// value but keeps the original position.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    entries: Vec<(String, ParameterValue)>,
    index: HashMap<String, usize>,
    aliases: HashMap<String, String>,
}

impl ParseContext {
    #[must_use]
    pub fn new() -> Self {
        ParseContext::default()
    }

    /// A context that renames parameters on insertion. Lookups resolve
    /// through the same map, so references by either name agree.
    #[must_use]
    pub fn with_aliases(aliases: HashMap<String, String>) -> Self {
        ParseContext {
            aliases,
            ..ParseContext::default()
        }
    }

    fn resolve<'n>(&'n self, name: &'n str) -> &'n str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    pub fn insert(&mut self, name: &str, value: ParameterValue) {
        let name = self.resolve(name).to_string();
        match self.index.get(&name) {
            Some(&at) => self.entries[at].1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        let name = self.resolve(name);
        self.index.get(name).map(|&at| &self.entries[at].1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(self.resolve(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion (declaration) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for ParseContext {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A fully parsed packet.
///
/// Holds the decoded primary header, all packet bytes, and the ordered
/// parameter mapping. The first seven entries of the mapping are the
/// primary-header parameters; the rest are user data.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedPacket {
    pub header: PrimaryHeader,
    /// All packet bytes, including the 6 header bytes.
    pub data: Vec<u8>,
    pub fields: ParseContext,
    /// Bits left unconsumed after the final container matched. Nonzero
    /// means the definition and the packet length disagree.
    pub trailing_bits: usize,
}

impl ParsedPacket {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.fields.get(name)
    }

    /// The seven primary-header fields, in bit order.
    pub fn header_fields(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.fields.iter().take(HEADER_FIELDS.len())
    }

    /// Every field after the primary header, in declaration order.
    pub fn user_data_fields(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.fields.iter().skip(HEADER_FIELDS.len())
    }

    /// Packet bytes after the primary header.
    #[must_use]
    pub fn user_data(&self) -> &[u8] {
        &self.data[PrimaryHeader::LEN..]
    }
}
