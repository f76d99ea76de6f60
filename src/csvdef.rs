//! Flat CSV packet definitions.
//!
//! A fixed-structure fallback for missions without an XTCE document. Each
//! row describes one field of one packet:
//!
//! ```text
//! Packet,APID,ItemName,DataType
//! HK,100,VOLTAGE,U12
//! HK,100,TEMP,I16
//! SCI,101,SAMPLE,F32
//! ```
//!
//! `Packet` may be spelled `Container` and `DataType` may be spelled
//! `Type`. Data types are a letter plus a bit width: `U` (unsigned
//! integer), `I` (signed integer), `D` (discrete, stored unsigned), `F`
//! (IEEE float), `C` (UTF-8 characters, width a multiple of 8).
//!
//! The result is an ordinary [`PacketDefinition`]: an abstract
//! `CCSDSPacket` root declaring the seven header parameters, with one
//! concrete inheritor per packet name restricted on `PKT_APID`. Rows that
//! re-declare header fields are skipped; the root already provides them.
//! Inheritance between CSV packets and dynamic field lengths are not
//! expressible in this format.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use crate::bits::Signedness;
use crate::packet::HEADER_FIELDS;
use crate::xtce::container::{ContainerEntry, SequenceContainer};
use crate::xtce::criteria::{CompareOp, Comparison, MatchCriteria};
use crate::xtce::encoding::{
    ByteOrder, Charset, DataEncoding, FloatDataEncoding, IntegerDataEncoding, SizeInBits,
    StringDataEncoding,
};
use crate::xtce::parameter::{Parameter, ParameterKind, ParameterType};
use crate::xtce::{PacketDefinition, DEFAULT_ROOT_CONTAINER};
use crate::{Error, Result};

/// Widths of the seven primary-header fields, matching
/// [`HEADER_FIELDS`].
const HEADER_WIDTHS: [usize; 7] = [3, 1, 1, 11, 2, 14, 16];

/// Build a [`PacketDefinition`] from CSV text.
///
/// # Errors
/// [`Error::Definition`] for missing columns, unparseable data types, or
/// packets whose rows disagree on APID.
pub fn load<R: Read>(reader: R) -> Result<PacketDefinition> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let position = |names: &[&str]| -> Result<usize> {
        headers
            .iter()
            .position(|h| names.contains(&h))
            .ok_or_else(|| {
                Error::Definition(format!(
                    "CSV definition is missing a {} column",
                    names.join(" or ")
                ))
            })
    };
    let packet_col = position(&["Packet", "Container"])?;
    let apid_col = position(&["APID"])?;
    let name_col = position(&["ItemName"])?;
    let type_col = position(&["DataType", "Type"])?;

    // One entry list per packet name, in file order.
    let mut order: Vec<String> = Vec::new();
    let mut packets: HashMap<String, (u16, Vec<ContainerEntry>)> = HashMap::new();
    let mut parameters: HashMap<String, Arc<Parameter>> = HashMap::new();

    for (row_index, row) in csv_reader.records().enumerate() {
        let row = row?;
        let field = |col: usize| -> Result<&str> {
            row.get(col).filter(|v| !v.is_empty()).ok_or_else(|| {
                Error::Definition(format!("CSV row {} is missing a value", row_index + 2))
            })
        };
        let packet_name = field(packet_col)?.to_string();
        let apid: u16 = field(apid_col)?.parse().map_err(|_| {
            Error::Definition(format!(
                "CSV row {}: APID {:?} is not an integer",
                row_index + 2,
                row.get(apid_col).unwrap_or_default()
            ))
        })?;
        let item_name = field(name_col)?;
        if HEADER_FIELDS.contains(&item_name) {
            continue;
        }
        let parameter = match parameters.get(item_name) {
            Some(p) => Arc::clone(p),
            None => {
                let ptype = parameter_type_from_str(field(type_col)?, item_name)?;
                let p = Arc::new(Parameter::new(item_name, Arc::new(ptype)));
                parameters.insert(item_name.to_string(), Arc::clone(&p));
                p
            }
        };

        let entry = packets.entry(packet_name.clone()).or_insert_with(|| {
            order.push(packet_name.clone());
            (apid, Vec::new())
        });
        if entry.0 != apid {
            return Err(Error::Definition(format!(
                "CSV packet {packet_name} maps to both APID {} and APID {apid}",
                entry.0
            )));
        }
        entry.1.push(ContainerEntry::Parameter(parameter));
    }

    if order.is_empty() {
        return Err(Error::Definition("CSV definition has no rows".into()));
    }

    let mut containers = vec![header_container()];
    for packet_name in order {
        let (apid, entries) = packets.remove(&packet_name).expect("collected above");
        containers.push(SequenceContainer {
            name: packet_name,
            entries,
            base_container: Some(DEFAULT_ROOT_CONTAINER.to_string()),
            restriction_criteria: vec![MatchCriteria::Comparison(
                Comparison::new("PKT_APID", CompareOp::Eq, apid.to_string()).use_raw(),
            )],
            ..SequenceContainer::default()
        });
    }

    PacketDefinition::from_parts(containers, None)
}

/// The abstract CCSDS primary-header root every CSV packet inherits.
fn header_container() -> SequenceContainer {
    let entries = HEADER_FIELDS
        .iter()
        .zip(HEADER_WIDTHS)
        .map(|(name, width)| {
            let ptype = ParameterType {
                name: format!("{name}_Type"),
                unit: None,
                kind: ParameterKind::Integer,
                encoding: DataEncoding::Integer(IntegerDataEncoding::unsigned(width)),
            };
            ContainerEntry::Parameter(Arc::new(Parameter::new(*name, Arc::new(ptype))))
        })
        .collect();
    SequenceContainer {
        is_abstract: true,
        ..SequenceContainer::new(DEFAULT_ROOT_CONTAINER, entries)
    }
}

/// Map a CSV data type such as `U12`, `I16`, `F32`, or `C64` to a
/// parameter type.
fn parameter_type_from_str(dtype: &str, item_name: &str) -> Result<ParameterType> {
    let split = dtype
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| Error::Definition(format!("CSV data type {dtype:?} has no bit width")))?;
    let (letter, width_text) = dtype.split_at(split);
    let width: usize = width_text
        .parse()
        .map_err(|_| Error::Definition(format!("CSV data type {dtype:?} has a bad bit width")))?;
    if width == 0 {
        return Err(Error::Definition(format!(
            "CSV data type {dtype:?} has zero width"
        )));
    }

    let (kind, encoding) = match letter {
        "U" | "D" => (
            ParameterKind::Integer,
            DataEncoding::Integer(IntegerDataEncoding::unsigned(width)),
        ),
        "I" => (
            ParameterKind::Integer,
            DataEncoding::Integer(IntegerDataEncoding {
                signedness: Signedness::TwosComplement,
                ..IntegerDataEncoding::unsigned(width)
            }),
        ),
        "F" => {
            if !matches!(width, 16 | 32 | 64) {
                return Err(Error::Definition(format!(
                    "CSV float type {dtype:?} must be 16, 32, or 64 bits"
                )));
            }
            (
                ParameterKind::Float,
                DataEncoding::Float(FloatDataEncoding {
                    size_bits: width,
                    byte_order: ByteOrder::default(),
                    default_calibrator: None,
                    context_calibrators: Vec::new(),
                }),
            )
        }
        "C" => {
            if width % 8 != 0 {
                return Err(Error::Definition(format!(
                    "CSV character type {dtype:?} must be a whole number of bytes"
                )));
            }
            (
                ParameterKind::Str,
                DataEncoding::Str(StringDataEncoding {
                    charset: Charset::Utf8,
                    raw_length: SizeInBits::Fixed(width),
                    termination: None,
                    leading_size_bits: None,
                }),
            )
        }
        other => {
            return Err(Error::Definition(format!(
                "unsupported CSV data type letter {other:?} in {dtype:?}"
            )))
        }
    };

    Ok(ParameterType {
        name: format!("{item_name}_Type"),
        unit: None,
        kind,
        encoding,
    })
}
