//! Build a [`PacketDefinition`] from an XTCE element tree.
//!
//! Elements are matched on local name, so any namespace prefix for the
//! XTCE schema works. The load order follows the document structure:
//! `ParameterTypeSet` first, then `ParameterSet` resolving type
//! references, then `ContainerSet` resolving parameter references.

use std::collections::HashMap;
use std::sync::Arc;

use roxmltree::{Document, Node};

use crate::bits::Signedness;
use crate::xtce::calibrator::{
    Calibrator, ContextCalibrator, PolynomialCalibrator, PolynomialCoefficient, SplineCalibrator,
    SplineOrder, SplinePoint,
};
use crate::xtce::container::{ContainerEntry, SequenceContainer};
use crate::xtce::criteria::{
    BooleanExpression, CompareOp, Comparison, Condition, DiscreteLookup, MatchCriteria, Operand,
    ParameterRef,
};
use crate::xtce::encoding::{
    BinaryDataEncoding, ByteOrder, Charset, DataEncoding, DynamicValue, FloatDataEncoding,
    IntegerDataEncoding, LinearAdjustment, SizeInBits, StringDataEncoding,
};
use crate::xtce::parameter::{Parameter, ParameterKind, ParameterType};
use crate::xtce::PacketDefinition;
use crate::{Error, Result};

pub(super) fn load(doc: &Document) -> Result<PacketDefinition> {
    let space_system = doc.root_element();
    if space_system.tag_name().name() != "SpaceSystem" {
        return Err(definition_error(format!(
            "expected SpaceSystem root element, got {}",
            space_system.tag_name().name()
        )));
    }
    let telemetry = require_child(space_system, "TelemetryMetaData")?;

    let mut types: HashMap<String, Arc<ParameterType>> = HashMap::new();
    if let Some(type_set) = child(telemetry, "ParameterTypeSet") {
        for node in elements(type_set) {
            let ptype = parse_parameter_type(node)?;
            if types.contains_key(&ptype.name) {
                return Err(definition_error(format!(
                    "duplicate parameter type name {}",
                    ptype.name
                )));
            }
            types.insert(ptype.name.clone(), Arc::new(ptype));
        }
    }

    let mut parameters: HashMap<String, Arc<Parameter>> = HashMap::new();
    if let Some(parameter_set) = child(telemetry, "ParameterSet") {
        for node in elements(parameter_set) {
            let parameter = parse_parameter(node, &types)?;
            if parameters.contains_key(&parameter.name) {
                return Err(definition_error(format!(
                    "duplicate parameter name {}",
                    parameter.name
                )));
            }
            parameters.insert(parameter.name.clone(), Arc::new(parameter));
        }
    }

    let container_set = require_child(telemetry, "ContainerSet")?;
    let mut containers = Vec::new();
    for node in elements(container_set) {
        containers.push(parse_container(node, &parameters)?);
    }

    PacketDefinition::from_parts(containers, space_system.attribute("name").map(String::from))
}

fn definition_error(msg: impl Into<String>) -> Error {
    Error::Definition(msg.into())
}

fn elements<'a>(node: Node<'a, 'a>) -> impl Iterator<Item = Node<'a, 'a>> {
    node.children().filter(Node::is_element)
}

fn child<'a>(node: Node<'a, 'a>, name: &'static str) -> Option<Node<'a, 'a>> {
    elements(node).find(|n| n.tag_name().name() == name)
}

fn require_child<'a>(node: Node<'a, 'a>, name: &'static str) -> Result<Node<'a, 'a>> {
    child(node, name).ok_or_else(|| {
        definition_error(format!(
            "{} element is missing required child {name}",
            node.tag_name().name()
        ))
    })
}

fn children<'a>(node: Node<'a, 'a>, name: &'static str) -> impl Iterator<Item = Node<'a, 'a>> {
    elements(node).filter(move |n| n.tag_name().name() == name)
}

fn require_attr<'a>(node: Node<'a, '_>, name: &'static str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        definition_error(format!(
            "{} element is missing required attribute {name}",
            node.tag_name().name()
        ))
    })
}

fn parse_attr<T: std::str::FromStr>(node: Node, name: &'static str) -> Result<T> {
    let text = require_attr(node, name)?;
    text.parse().map_err(|_| {
        definition_error(format!(
            "attribute {name}={text:?} on {} is not a valid {}",
            node.tag_name().name(),
            std::any::type_name::<T>()
        ))
    })
}

fn bool_attr(node: Node, name: &str, default: bool) -> bool {
    node.attribute(name)
        .map_or(default, |v| v.eq_ignore_ascii_case("true"))
}

// ------------------------------------------------------------------------
// Parameter types

fn parse_parameter_type(node: Node) -> Result<ParameterType> {
    let tag = node.tag_name().name();
    let name = require_attr(node, "name")?.to_string();

    match tag {
        "IntegerParameterType" | "FloatParameterType" | "StringParameterType"
        | "BinaryParameterType" | "BooleanParameterType" | "EnumeratedParameterType" => {
            let unit = parse_units(node)?;
            let encoding = parse_data_encoding(node, tag)?;
            let kind = match tag {
                "IntegerParameterType" => ParameterKind::Integer,
                "FloatParameterType" => ParameterKind::Float,
                "StringParameterType" => {
                    if !matches!(encoding, DataEncoding::Str(_)) {
                        return Err(definition_error(format!(
                            "string parameter type {name} requires a StringDataEncoding"
                        )));
                    }
                    ParameterKind::Str
                }
                "BinaryParameterType" => {
                    if !matches!(encoding, DataEncoding::Binary(_)) {
                        return Err(definition_error(format!(
                            "binary parameter type {name} requires a BinaryDataEncoding"
                        )));
                    }
                    ParameterKind::Binary
                }
                "BooleanParameterType" => ParameterKind::Boolean,
                _ => ParameterKind::Enumerated {
                    labels: parse_enumeration_list(node)?,
                },
            };
            Ok(ParameterType {
                name,
                unit,
                kind,
                encoding,
            })
        }
        "AbsoluteTimeParameterType" | "RelativeTimeParameterType" => {
            parse_time_parameter_type(node, tag, name)
        }
        "ArrayParameterType" | "AggregateParameterType" => Err(definition_error(format!(
            "unsupported parameter type element {tag} (parameter type {name})"
        ))),
        other => Err(definition_error(format!(
            "unrecognized parameter type element {other}"
        ))),
    }
}

fn parse_units(node: Node) -> Result<Option<String>> {
    let Some(unit_set) = child(node, "UnitSet") else {
        return Ok(None);
    };
    let units: Vec<&str> = children(unit_set, "Unit")
        .filter_map(|u| u.text())
        .collect();
    if units.len() > 1 {
        return Err(definition_error(
            "multiple Unit elements in a UnitSet (compound units) are not supported",
        ));
    }
    Ok(units.first().map(|u| (*u).to_string()))
}

fn parse_data_encoding(parent: Node, context: &str) -> Result<DataEncoding> {
    // The encoding may be nested (time types wrap it in an Encoding
    // element), so search the subtree.
    let found = parent.descendants().filter(Node::is_element).find(|n| {
        matches!(
            n.tag_name().name(),
            "IntegerDataEncoding" | "FloatDataEncoding" | "StringDataEncoding"
                | "BinaryDataEncoding"
        )
    });
    let node = found.ok_or_else(|| {
        definition_error(format!("no data encoding element found for {context}"))
    })?;
    match node.tag_name().name() {
        "IntegerDataEncoding" => parse_integer_encoding(node),
        "FloatDataEncoding" => parse_float_encoding(node),
        "StringDataEncoding" => parse_string_encoding(node),
        _ => parse_binary_encoding(node),
    }
}

fn parse_byte_order(node: Node) -> Result<ByteOrder> {
    match node.attribute("byteOrder") {
        None | Some("mostSignificantByteFirst") => Ok(ByteOrder::MostSignificantFirst),
        Some("leastSignificantByteFirst") => Ok(ByteOrder::LeastSignificantFirst),
        Some(other) => Err(definition_error(format!(
            "unrecognized byteOrder {other:?}"
        ))),
    }
}

fn parse_integer_encoding(node: Node) -> Result<DataEncoding> {
    let size_bits: usize = parse_attr(node, "sizeInBits")?;
    if size_bits == 0 || size_bits > 64 {
        return Err(definition_error(format!(
            "IntegerDataEncoding sizeInBits must be 1..=64, got {size_bits}"
        )));
    }
    let signedness = match node.attribute("encoding").unwrap_or("unsigned") {
        "unsigned" => Signedness::Unsigned,
        // "signed" is not valid XTCE but is common in flight software
        // documents; "twosCompliment" is a long-lived typo in the wild.
        "signed" | "twosComplement" | "twosCompliment" => Signedness::TwosComplement,
        "onesComplement" => Signedness::OnesComplement,
        "signMagnitude" => Signedness::SignMagnitude,
        other => {
            return Err(definition_error(format!(
                "unrecognized integer encoding {other:?}"
            )))
        }
    };
    Ok(DataEncoding::Integer(IntegerDataEncoding {
        size_bits,
        signedness,
        byte_order: parse_byte_order(node)?,
        default_calibrator: parse_default_calibrator(node)?,
        context_calibrators: parse_context_calibrators(node)?,
    }))
}

fn parse_float_encoding(node: Node) -> Result<DataEncoding> {
    let size_bits: usize = parse_attr(node, "sizeInBits")?;
    if !matches!(size_bits, 16 | 32 | 64) {
        return Err(definition_error(format!(
            "FloatDataEncoding sizeInBits must be 16, 32, or 64, got {size_bits}"
        )));
    }
    match node.attribute("encoding").unwrap_or("IEEE754") {
        "IEEE754" | "IEEE754_1985" => {}
        other => {
            return Err(definition_error(format!(
                "unsupported float encoding {other:?}, only IEEE754 is supported"
            )))
        }
    }
    Ok(DataEncoding::Float(FloatDataEncoding {
        size_bits,
        byte_order: parse_byte_order(node)?,
        default_calibrator: parse_default_calibrator(node)?,
        context_calibrators: parse_context_calibrators(node)?,
    }))
}

fn parse_string_encoding(node: Node) -> Result<DataEncoding> {
    let charset = match node.attribute("encoding").unwrap_or("UTF-8") {
        "UTF-8" | "US-ASCII" => Charset::Utf8,
        "UTF-16BE" => Charset::Utf16Be,
        "UTF-16LE" => Charset::Utf16Le,
        "UTF-16" => match node.attribute("byteOrder") {
            None | Some("mostSignificantByteFirst") => Charset::Utf16Be,
            Some("leastSignificantByteFirst") => Charset::Utf16Le,
            Some(other) => {
                return Err(definition_error(format!(
                    "unrecognized byteOrder {other:?} for UTF-16 string"
                )))
            }
        },
        other => {
            return Err(definition_error(format!(
                "unsupported string encoding {other:?}"
            )))
        }
    };

    // The size element also hosts the derived-string delimiters.
    let (size_node, raw_length) = if let Some(size) = child(node, "SizeInBits") {
        let fixed = require_child(size, "Fixed")?;
        let value = require_child(fixed, "FixedValue")?;
        let nbits: usize = parse_text(value)?;
        (size, SizeInBits::Fixed(nbits))
    } else if let Some(variable) = child(node, "Variable") {
        (variable, parse_variable_size(variable)?)
    } else {
        return Err(definition_error(
            "StringDataEncoding requires a SizeInBits or Variable element",
        ));
    };

    let termination = match child(size_node, "TerminationChar") {
        Some(term) => {
            let hex = term.text().unwrap_or_default().trim();
            let bytes = decode_hex(hex)?;
            if bytes.len() != charset.unit_len() {
                return Err(definition_error(format!(
                    "termination character {hex:?} must be one code unit ({} bytes) in the string charset",
                    charset.unit_len()
                )));
            }
            Some(bytes)
        }
        None => None,
    };
    let leading_size_bits = match child(size_node, "LeadingSize") {
        Some(leading) => {
            let nbits: usize = parse_attr(leading, "sizeInBitsOfSizeTag")?;
            if nbits == 0 || nbits > 64 {
                return Err(definition_error(format!(
                    "LeadingSize sizeInBitsOfSizeTag must be 1..=64, got {nbits}"
                )));
            }
            Some(nbits)
        }
        None => None,
    };
    if termination.is_some() && leading_size_bits.is_some() {
        return Err(definition_error(
            "string encoding declares both a termination character and a leading size",
        ));
    }

    Ok(DataEncoding::Str(StringDataEncoding {
        charset,
        raw_length,
        termination,
        leading_size_bits,
    }))
}

fn parse_binary_encoding(node: Node) -> Result<DataEncoding> {
    let size_node = require_child(node, "SizeInBits")?;
    if let Some(fixed) = child(size_node, "FixedValue") {
        return Ok(DataEncoding::Binary(BinaryDataEncoding {
            size: SizeInBits::Fixed(parse_text(fixed)?),
        }));
    }
    Ok(DataEncoding::Binary(BinaryDataEncoding {
        size: parse_variable_size(size_node)?,
    }))
}

/// Parse a DynamicValue or DiscreteLookupList child of `node` into a size.
fn parse_variable_size(node: Node) -> Result<SizeInBits> {
    if let Some(dynamic) = child(node, "DynamicValue") {
        return Ok(SizeInBits::Dynamic(parse_dynamic_value(dynamic)?));
    }
    if let Some(lookup_list) = child(node, "DiscreteLookupList") {
        let lookups = children(lookup_list, "DiscreteLookup")
            .map(parse_discrete_lookup)
            .collect::<Result<Vec<_>>>()?;
        if lookups.is_empty() {
            return Err(definition_error("empty DiscreteLookupList"));
        }
        return Ok(SizeInBits::Lookup(lookups));
    }
    Err(definition_error(format!(
        "{} element requires a DynamicValue or DiscreteLookupList",
        node.tag_name().name()
    )))
}

fn parse_dynamic_value(node: Node) -> Result<DynamicValue> {
    let param_ref = require_child(node, "ParameterInstanceRef")?;
    let adjustment = match child(node, "LinearAdjustment") {
        Some(adj) => Some(LinearAdjustment {
            slope: adj
                .attribute("slope")
                .map_or(Ok(0), str::parse)
                .map_err(|_| definition_error("LinearAdjustment slope is not an integer"))?,
            intercept: adj
                .attribute("intercept")
                .map_or(Ok(0), str::parse)
                .map_err(|_| definition_error("LinearAdjustment intercept is not an integer"))?,
        }),
        None => None,
    };
    Ok(DynamicValue {
        parameter: require_attr(param_ref, "parameterRef")?.to_string(),
        use_calibrated: bool_attr(param_ref, "useCalibratedValue", true),
        adjustment,
    })
}

fn parse_text<T: std::str::FromStr>(node: Node) -> Result<T> {
    let text = node.text().unwrap_or_default().trim();
    text.parse().map_err(|_| {
        definition_error(format!(
            "{} text {text:?} is not a valid {}",
            node.tag_name().name(),
            std::any::type_name::<T>()
        ))
    })
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(definition_error(format!(
            "invalid hex termination character {hex:?}"
        )));
    }
    Ok((0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("validated hex"))
        .collect())
}

// ------------------------------------------------------------------------
// Calibrators

fn parse_default_calibrator(encoding_node: Node) -> Result<Option<Calibrator>> {
    match child(encoding_node, "DefaultCalibrator") {
        Some(node) => Ok(Some(parse_calibrator(node)?)),
        None => Ok(None),
    }
}

/// Parse the calibrator child of `node` (a DefaultCalibrator or Calibrator
/// wrapper element).
fn parse_calibrator(node: Node) -> Result<Calibrator> {
    if let Some(poly) = child(node, "PolynomialCalibrator") {
        let coefficients = children(poly, "Term")
            .map(|term| {
                Ok(PolynomialCoefficient {
                    coefficient: parse_attr(term, "coefficient")?,
                    exponent: parse_attr(term, "exponent")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if coefficients.is_empty() {
            return Err(definition_error("PolynomialCalibrator has no Term elements"));
        }
        return Ok(Calibrator::Polynomial(PolynomialCalibrator { coefficients }));
    }
    if let Some(spline) = child(node, "SplineCalibrator") {
        let points = children(spline, "SplinePoint")
            .map(|p| {
                Ok(SplinePoint {
                    raw: parse_attr(p, "raw")?,
                    calibrated: parse_attr(p, "calibrated")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let order = match spline.attribute("order").unwrap_or("0") {
            "0" => SplineOrder::Flat,
            "1" => SplineOrder::Linear,
            other => {
                return Err(definition_error(format!(
                    "spline calibrators of order {other} are not supported"
                )))
            }
        };
        let extrapolate = bool_attr(spline, "extrapolate", false);
        return Ok(Calibrator::Spline(SplineCalibrator::new(
            points,
            order,
            extrapolate,
        )?));
    }
    if child(node, "MathOperationCalibrator").is_some() {
        return Err(definition_error(
            "MathOperationCalibrator is not supported",
        ));
    }
    Err(definition_error(format!(
        "{} has no supported calibrator child",
        node.tag_name().name()
    )))
}

fn parse_context_calibrators(encoding_node: Node) -> Result<Vec<ContextCalibrator>> {
    let Some(list) = child(encoding_node, "ContextCalibratorList") else {
        return Ok(Vec::new());
    };
    children(list, "ContextCalibrator")
        .map(|node| {
            let context_match = require_child(node, "ContextMatch")?;
            let criteria = parse_match_criteria(context_match)?;
            let calibrator = parse_calibrator(require_child(node, "Calibrator")?)?;
            Ok(ContextCalibrator {
                criteria,
                calibrator,
            })
        })
        .collect()
}

// ------------------------------------------------------------------------
// Match criteria

/// Parse the match-criteria child of a ContextMatch or RestrictionCriteria
/// element.
fn parse_match_criteria(node: Node) -> Result<Vec<MatchCriteria>> {
    if child(node, "CustomAlgorithm").is_some() {
        return Err(definition_error(
            "CustomAlgorithm match criteria are not supported",
        ));
    }
    if let Some(list) = child(node, "ComparisonList") {
        let comparisons = children(list, "Comparison")
            .map(parse_comparison)
            .collect::<Result<Vec<_>>>()?;
        return Ok(vec![MatchCriteria::ComparisonList(comparisons)]);
    }
    if let Some(comparison) = child(node, "Comparison") {
        return Ok(vec![MatchCriteria::Comparison(parse_comparison(
            comparison,
        )?)]);
    }
    if let Some(expr) = child(node, "BooleanExpression") {
        return Ok(vec![MatchCriteria::BooleanExpression(
            parse_boolean_expression(expr)?,
        )]);
    }
    Err(definition_error(format!(
        "{} contains no Comparison, ComparisonList, or BooleanExpression",
        node.tag_name().name()
    )))
}

fn parse_comparison(node: Node) -> Result<Comparison> {
    Ok(Comparison {
        parameter: require_attr(node, "parameterRef")?.to_string(),
        op: CompareOp::from_xtce(node.attribute("comparisonOperator").unwrap_or("=="))?,
        value: require_attr(node, "value")?.to_string(),
        use_calibrated: bool_attr(node, "useCalibratedValue", true),
    })
}

fn parse_boolean_expression(node: Node) -> Result<BooleanExpression> {
    if let Some(condition) = child(node, "Condition") {
        return Ok(BooleanExpression::Condition(parse_condition(condition)?));
    }
    if let Some(anded) = child(node, "ANDedConditions") {
        return parse_junction(anded, true);
    }
    if let Some(ored) = child(node, "ORedConditions") {
        return parse_junction(ored, false);
    }
    Err(definition_error(
        "BooleanExpression contains no Condition, ANDedConditions, or ORedConditions",
    ))
}

/// ANDed/ORed condition sets nest each other, per the XTCE schema.
fn parse_junction(node: Node, and: bool) -> Result<BooleanExpression> {
    let mut terms = Vec::new();
    for element in elements(node) {
        match element.tag_name().name() {
            "Condition" => terms.push(BooleanExpression::Condition(parse_condition(element)?)),
            "ANDedConditions" => terms.push(parse_junction(element, true)?),
            "ORedConditions" => terms.push(parse_junction(element, false)?),
            other => {
                return Err(definition_error(format!(
                    "unexpected element {other} in conditions list"
                )))
            }
        }
    }
    if terms.is_empty() {
        return Err(definition_error("empty conditions list"));
    }
    Ok(if and {
        BooleanExpression::AllOf(terms)
    } else {
        BooleanExpression::AnyOf(terms)
    })
}

fn parse_condition(node: Node) -> Result<Condition> {
    let op = CompareOp::from_xtce(
        require_child(node, "ComparisonOperator")?
            .text()
            .unwrap_or_default()
            .trim(),
    )?;
    let refs: Vec<Node> = children(node, "ParameterInstanceRef").collect();
    let parse_ref = |n: Node| -> Result<ParameterRef> {
        Ok(ParameterRef {
            parameter: require_attr(n, "parameterRef")?.to_string(),
            use_calibrated: bool_attr(n, "useCalibratedValue", true),
        })
    };
    match refs.len() {
        1 => {
            let value = require_child(node, "Value")?;
            Ok(Condition {
                left: parse_ref(refs[0])?,
                op,
                right: Operand::Literal(value.text().unwrap_or_default().trim().to_string()),
            })
        }
        2 => Ok(Condition {
            left: parse_ref(refs[0])?,
            op,
            right: Operand::Parameter(parse_ref(refs[1])?),
        }),
        n => Err(definition_error(format!(
            "Condition requires one or two ParameterInstanceRef elements, got {n}"
        ))),
    }
}

fn parse_discrete_lookup(node: Node) -> Result<DiscreteLookup> {
    let value: f64 = parse_attr(node, "value")?;
    let criteria = if let Some(list) = child(node, "ComparisonList") {
        children(list, "Comparison")
            .map(parse_comparison)
            .collect::<Result<Vec<_>>>()?
    } else if let Some(comparison) = child(node, "Comparison") {
        vec![parse_comparison(comparison)?]
    } else {
        return Err(definition_error(
            "DiscreteLookup requires a Comparison or ComparisonList",
        ));
    };
    Ok(DiscreteLookup { criteria, value })
}

// ------------------------------------------------------------------------
// Time parameter types

fn parse_time_parameter_type(node: Node, tag: &str, name: String) -> Result<ParameterType> {
    let mut encoding = parse_data_encoding(node, tag)?;

    let mut unit = None;
    if let Some(encoding_element) = child(node, "Encoding") {
        unit = encoding_element.attribute("units").map(String::from);
        // Encoding-level scale and offset become a linear default
        // calibrator on the wrapped numeric encoding.
        let offset: Option<f64> = match encoding_element.attribute("offset") {
            Some(text) => Some(text.parse().map_err(|_| {
                definition_error(format!("time Encoding offset {text:?} is not numeric"))
            })?),
            None => None,
        };
        let scale: Option<f64> = match encoding_element.attribute("scale") {
            Some(text) => Some(text.parse().map_err(|_| {
                definition_error(format!("time Encoding scale {text:?} is not numeric"))
            })?),
            None => None,
        };
        if offset.is_some() || scale.is_some() {
            let mut coefficients = Vec::new();
            if let Some(offset) = offset {
                coefficients.push(PolynomialCoefficient {
                    coefficient: offset,
                    exponent: 0,
                });
            }
            coefficients.push(PolynomialCoefficient {
                coefficient: scale.unwrap_or(1.0),
                exponent: 1,
            });
            let calibrator = Calibrator::Polynomial(PolynomialCalibrator { coefficients });
            match &mut encoding {
                DataEncoding::Integer(enc) => enc.default_calibrator = Some(calibrator),
                DataEncoding::Float(enc) => enc.default_calibrator = Some(calibrator),
                _ => {
                    return Err(definition_error(format!(
                        "time parameter type {name} requires a numeric encoding"
                    )))
                }
            }
        }
    }

    let mut epoch = None;
    let mut offset_from = None;
    if let Some(reference_time) = child(node, "ReferenceTime") {
        epoch = child(reference_time, "Epoch")
            .and_then(|e| e.text())
            .map(|t| t.trim().to_string());
        offset_from = match child(reference_time, "OffsetFrom") {
            Some(n) => Some(require_attr(n, "parameterRef")?.to_string()),
            None => None,
        };
    }

    let kind = if tag == "AbsoluteTimeParameterType" {
        ParameterKind::AbsoluteTime { epoch, offset_from }
    } else {
        ParameterKind::RelativeTime { epoch, offset_from }
    };
    Ok(ParameterType {
        name,
        unit,
        kind,
        encoding,
    })
}

fn parse_enumeration_list(node: Node) -> Result<HashMap<i64, String>> {
    let list = require_child(node, "EnumerationList")?;
    let mut labels = HashMap::new();
    for enumeration in children(list, "Enumeration") {
        let value: i64 = parse_attr(enumeration, "value")?;
        let label = require_attr(enumeration, "label")?.to_string();
        labels.insert(value, label);
    }
    if labels.is_empty() {
        return Err(definition_error("EnumerationList has no Enumeration elements"));
    }
    Ok(labels)
}

// ------------------------------------------------------------------------
// Parameters and containers

fn parse_parameter(node: Node, types: &HashMap<String, Arc<ParameterType>>) -> Result<Parameter> {
    let name = require_attr(node, "name")?.to_string();
    let type_name = require_attr(node, "parameterTypeRef")?;
    let parameter_type = types.get(type_name).cloned().ok_or_else(|| {
        definition_error(format!(
            "parameter {name} references unknown parameter type {type_name}"
        ))
    })?;
    Ok(Parameter {
        name,
        parameter_type,
        short_description: node.attribute("shortDescription").map(String::from),
        long_description: child(node, "LongDescription")
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string()),
    })
}

fn parse_container(
    node: Node,
    parameters: &HashMap<String, Arc<Parameter>>,
) -> Result<SequenceContainer> {
    if node.tag_name().name() != "SequenceContainer" {
        return Err(definition_error(format!(
            "unexpected element {} in ContainerSet",
            node.tag_name().name()
        )));
    }
    let name = require_attr(node, "name")?.to_string();

    let mut base_container = None;
    let mut restriction_criteria = Vec::new();
    if let Some(base) = child(node, "BaseContainer") {
        base_container = Some(require_attr(base, "containerRef")?.to_string());
        if let Some(restriction) = child(base, "RestrictionCriteria") {
            restriction_criteria = parse_match_criteria(restriction)?;
        }
    }

    let entry_list = require_child(node, "EntryList")?;
    let mut entries = Vec::new();
    for entry in elements(entry_list) {
        match entry.tag_name().name() {
            "ParameterRefEntry" => {
                let parameter_name = require_attr(entry, "parameterRef")?;
                let parameter = parameters.get(parameter_name).cloned().ok_or_else(|| {
                    definition_error(format!(
                        "container {name} references unknown parameter {parameter_name}"
                    ))
                })?;
                entries.push(ContainerEntry::Parameter(parameter));
            }
            "ContainerRefEntry" => {
                entries.push(ContainerEntry::Container(
                    require_attr(entry, "containerRef")?.to_string(),
                ));
            }
            other => {
                return Err(definition_error(format!(
                    "unsupported entry element {other} in container {name}"
                )))
            }
        }
    }

    Ok(SequenceContainer {
        name,
        entries,
        base_container,
        restriction_criteria,
        is_abstract: bool_attr(node, "abstract", false),
        inheritors: Vec::new(),
        short_description: node.attribute("shortDescription").map(String::from),
        long_description: child(node, "LongDescription")
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string()),
    })
}
