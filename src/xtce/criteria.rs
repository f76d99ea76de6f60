//! Match criteria: comparisons, boolean expressions, and discrete lookups
//! evaluated against the partially parsed packet.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::packet::ParseContext;
use crate::value::Value;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Parse an XTCE operator. Both the symbolic forms the XML schema
    /// allows (`==`, `&lt;=`, ...) and the word forms seen in flight
    /// software documents (`eq`, `leq`, ...) are accepted.
    pub fn from_xtce(s: &str) -> Result<Self> {
        match s {
            "==" | "eq" => Ok(CompareOp::Eq),
            "!=" | "neq" => Ok(CompareOp::Ne),
            "<" | "&lt;" | "lt" => Ok(CompareOp::Lt),
            "<=" | "&lt;=" | "leq" => Ok(CompareOp::Le),
            ">" | "&gt;" | "gt" => Ok(CompareOp::Gt),
            ">=" | "&gt;=" | "geq" => Ok(CompareOp::Ge),
            other => Err(Error::Definition(format!(
                "unrecognized comparison operator {other:?}"
            ))),
        }
    }

    fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// `<xtce:Comparison>`: one parameter against a literal.
///
/// The literal is stored as written in the document and coerced to the
/// referenced parameter's type at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub parameter: String,
    pub op: CompareOp,
    pub value: String,
    /// Compare against the calibrated value (default) or the raw value.
    pub use_calibrated: bool,
}

impl Comparison {
    pub fn new(parameter: impl Into<String>, op: CompareOp, value: impl Into<String>) -> Self {
        Comparison {
            parameter: parameter.into(),
            op,
            value: value.into(),
            use_calibrated: true,
        }
    }

    #[must_use]
    pub fn use_raw(mut self) -> Self {
        self.use_calibrated = false;
        self
    }

    /// Evaluate against the parse context.
    ///
    /// `current` is the raw value of the parameter currently being parsed;
    /// a comparison inside a context calibrator may reference that
    /// parameter before it has been inserted into the context.
    ///
    /// # Errors
    /// [`Error::Evaluation`] if the referenced parameter has not been
    /// parsed and no current value applies, or if the literal cannot be
    /// coerced to the parameter's type.
    pub fn evaluate(&self, ctx: &ParseContext, current: Option<&Value>) -> Result<bool> {
        let target = match ctx.get(&self.parameter) {
            Some(pv) => {
                if self.use_calibrated {
                    pv.value()
                } else {
                    &pv.raw
                }
            }
            // Self-reference: always the raw value, calibration has not
            // happened yet.
            None => current.ok_or_else(|| {
                Error::Evaluation(format!(
                    "comparison references parameter {} which has not been parsed yet",
                    self.parameter
                ))
            })?,
        };
        let ord = compare_literal(target, &self.value)?;
        Ok(self.op.matches(ord))
    }
}

/// Order `value` against a literal coerced to `value`'s type.
fn compare_literal(value: &Value, literal: &str) -> Result<Ordering> {
    let coerce_err = || {
        Error::Evaluation(format!(
            "cannot coerce literal {literal:?} for comparison with {value:?}"
        ))
    };
    match value {
        Value::Uint(_) | Value::Int(_) => {
            let lhs = value.as_i64().map(i128::from).unwrap_or_else(|| {
                // Uint above i64::MAX.
                i128::from(value.as_u64().expect("integer value"))
            });
            let rhs: i128 = literal.trim().parse().map_err(|_| coerce_err())?;
            Ok(lhs.cmp(&rhs))
        }
        Value::Float(lhs) => {
            let rhs: f64 = literal.trim().parse().map_err(|_| coerce_err())?;
            lhs.partial_cmp(&rhs).ok_or_else(|| {
                Error::Evaluation(format!("cannot order {lhs} against {rhs}"))
            })
        }
        Value::Str(lhs) => Ok(lhs.as_str().cmp(literal)),
        Value::Bool(lhs) => {
            let rhs = match literal.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(coerce_err()),
            };
            Ok(lhs.cmp(&rhs))
        }
        Value::Bytes(_) => Err(Error::Evaluation(format!(
            "binary parameter cannot be compared against literal {literal:?}"
        ))),
    }
}

/// Order two already-parsed values, widening mixed numerics to `f64`.
fn compare_values(left: &Value, right: &Value) -> Result<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => {
            let (a, b) = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(Error::Evaluation(format!(
                        "cannot compare {left:?} with {right:?}"
                    )))
                }
            };
            a.partial_cmp(&b)
                .ok_or_else(|| Error::Evaluation(format!("cannot order {a} against {b}")))
        }
    }
}

/// One side of an `<xtce:Condition>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRef {
    pub parameter: String,
    pub use_calibrated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Parameter(ParameterRef),
    Literal(String),
}

/// `<xtce:Condition>`: parameter-vs-parameter or parameter-vs-literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: ParameterRef,
    pub op: CompareOp,
    pub right: Operand,
}

impl Condition {
    pub fn evaluate(&self, ctx: &ParseContext) -> Result<bool> {
        let lookup = |r: &ParameterRef| -> Result<Value> {
            let pv = ctx.get(&r.parameter).ok_or_else(|| {
                Error::Evaluation(format!(
                    "condition references parameter {} which has not been parsed yet",
                    r.parameter
                ))
            })?;
            Ok(if r.use_calibrated {
                pv.value().clone()
            } else {
                pv.raw.clone()
            })
        };

        let left = lookup(&self.left)?;
        let ord = match &self.right {
            Operand::Parameter(r) => compare_values(&left, &lookup(r)?)?,
            Operand::Literal(lit) => compare_literal(&left, lit)?,
        };
        Ok(self.op.matches(ord))
    }
}

/// `<xtce:BooleanExpression>`: a tree of ANDed and ORed conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BooleanExpression {
    Condition(Condition),
    /// `<xtce:ANDedConditions>`
    AllOf(Vec<BooleanExpression>),
    /// `<xtce:ORedConditions>`
    AnyOf(Vec<BooleanExpression>),
}

impl BooleanExpression {
    pub fn evaluate(&self, ctx: &ParseContext) -> Result<bool> {
        match self {
            BooleanExpression::Condition(c) => c.evaluate(ctx),
            BooleanExpression::AllOf(terms) => {
                for term in terms {
                    if !term.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            BooleanExpression::AnyOf(terms) => {
                for term in terms {
                    if term.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Restriction criteria and context-calibrator matches: any of the three
/// supported XTCE match forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchCriteria {
    Comparison(Comparison),
    /// ANDed list of comparisons.
    ComparisonList(Vec<Comparison>),
    BooleanExpression(BooleanExpression),
}

impl MatchCriteria {
    pub fn evaluate(&self, ctx: &ParseContext, current: Option<&Value>) -> Result<bool> {
        match self {
            MatchCriteria::Comparison(c) => c.evaluate(ctx, current),
            MatchCriteria::ComparisonList(list) => {
                for c in list {
                    if !c.evaluate(ctx, current)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            MatchCriteria::BooleanExpression(expr) => expr.evaluate(ctx),
        }
    }
}

/// `<xtce:DiscreteLookup>`: yields `value` when all criteria match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteLookup {
    pub criteria: Vec<Comparison>,
    pub value: f64,
}

impl DiscreteLookup {
    pub fn evaluate(&self, ctx: &ParseContext, current: Option<&Value>) -> Result<Option<f64>> {
        for criterion in &self.criteria {
            if !criterion.evaluate(ctx, current)? {
                return Ok(None);
            }
        }
        Ok(Some(self.value))
    }
}

/// Evaluate an ordered lookup list; the first match wins.
///
/// # Errors
/// [`Error::Evaluation`] if no entry matches.
pub fn lookup_first(
    lookups: &[DiscreteLookup],
    ctx: &ParseContext,
    current: Option<&Value>,
) -> Result<f64> {
    for lookup in lookups {
        if let Some(v) = lookup.evaluate(ctx, current)? {
            return Ok(v);
        }
    }
    Err(Error::Evaluation(
        "no entry in discrete lookup list matched the parsed data".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ParameterValue;

    fn ctx_with(name: &str, value: Value) -> ParseContext {
        let mut ctx = ParseContext::new();
        ctx.insert(name, ParameterValue::new(value));
        ctx
    }

    #[test]
    fn compare_integers() {
        let ctx = ctx_with("APID", Value::Uint(1424));
        let cmp = Comparison::new("APID", CompareOp::Eq, "1424");
        assert!(cmp.evaluate(&ctx, None).unwrap());

        let cmp = Comparison::new("APID", CompareOp::Lt, "1500");
        assert!(cmp.evaluate(&ctx, None).unwrap());

        let cmp = Comparison::new("APID", CompareOp::Ne, "1424");
        assert!(!cmp.evaluate(&ctx, None).unwrap());
    }

    #[test]
    fn compare_against_negative_literal() {
        let ctx = ctx_with("T", Value::Int(-40));
        let cmp = Comparison::new("T", CompareOp::Le, "-10");
        assert!(cmp.evaluate(&ctx, None).unwrap());
    }

    #[test]
    fn compare_strings_exact() {
        let ctx = ctx_with("MODE", Value::Str("SAFE".into()));
        assert!(Comparison::new("MODE", CompareOp::Eq, "SAFE")
            .evaluate(&ctx, None)
            .unwrap());
        assert!(!Comparison::new("MODE", CompareOp::Eq, "SCIENCE")
            .evaluate(&ctx, None)
            .unwrap());
    }

    #[test]
    fn unparsed_parameter_is_an_error_not_false() {
        let ctx = ParseContext::new();
        let cmp = Comparison::new("MISSING", CompareOp::Eq, "1");
        assert!(matches!(
            cmp.evaluate(&ctx, None),
            Err(Error::Evaluation(_))
        ));
    }

    #[test]
    fn self_reference_uses_current_raw_value() {
        let ctx = ParseContext::new();
        let cmp = Comparison::new("SELF", CompareOp::Gt, "10").use_raw();
        assert!(cmp.evaluate(&ctx, Some(&Value::Uint(11))).unwrap());
        assert!(!cmp.evaluate(&ctx, Some(&Value::Uint(9))).unwrap());
    }

    #[test]
    fn uncoercible_literal_is_an_error() {
        let ctx = ctx_with("N", Value::Uint(1));
        let cmp = Comparison::new("N", CompareOp::Eq, "not-a-number");
        assert!(matches!(
            cmp.evaluate(&ctx, None),
            Err(Error::Evaluation(_))
        ));
    }

    #[test]
    fn raw_vs_calibrated_selection() {
        let mut ctx = ParseContext::new();
        ctx.insert(
            "V",
            ParameterValue {
                calibrated: Some(Value::Float(99.5)),
                ..ParameterValue::new(Value::Uint(2))
            },
        );
        assert!(Comparison::new("V", CompareOp::Gt, "50")
            .evaluate(&ctx, None)
            .unwrap());
        assert!(Comparison::new("V", CompareOp::Eq, "2")
            .use_raw()
            .evaluate(&ctx, None)
            .unwrap());
    }

    #[test]
    fn boolean_expression_nesting() {
        let mut ctx = ParseContext::new();
        ctx.insert("A", ParameterValue::new(Value::Uint(1)));
        ctx.insert("B", ParameterValue::new(Value::Uint(2)));

        let cond = |param: &str, lit: &str| {
            BooleanExpression::Condition(Condition {
                left: ParameterRef {
                    parameter: param.into(),
                    use_calibrated: true,
                },
                op: CompareOp::Eq,
                right: Operand::Literal(lit.into()),
            })
        };

        // (A == 1 AND (B == 5 OR B == 2))
        let expr = BooleanExpression::AllOf(vec![
            cond("A", "1"),
            BooleanExpression::AnyOf(vec![cond("B", "5"), cond("B", "2")]),
        ]);
        assert!(expr.evaluate(&ctx).unwrap());

        let expr = BooleanExpression::AllOf(vec![cond("A", "1"), cond("B", "5")]);
        assert!(!expr.evaluate(&ctx).unwrap());
    }

    #[test]
    fn condition_parameter_vs_parameter() {
        let mut ctx = ParseContext::new();
        ctx.insert("X", ParameterValue::new(Value::Uint(3)));
        ctx.insert("Y", ParameterValue::new(Value::Float(3.0)));
        let cond = Condition {
            left: ParameterRef {
                parameter: "X".into(),
                use_calibrated: true,
            },
            op: CompareOp::Eq,
            right: Operand::Parameter(ParameterRef {
                parameter: "Y".into(),
                use_calibrated: true,
            }),
        };
        assert!(cond.evaluate(&ctx).unwrap());
    }

    #[test]
    fn discrete_lookup_first_match_wins() {
        let ctx = ctx_with("SEL", Value::Uint(2));
        let lookups = vec![
            DiscreteLookup {
                criteria: vec![Comparison::new("SEL", CompareOp::Eq, "1")],
                value: 16.0,
            },
            DiscreteLookup {
                criteria: vec![Comparison::new("SEL", CompareOp::Ge, "2")],
                value: 32.0,
            },
            DiscreteLookup {
                criteria: vec![Comparison::new("SEL", CompareOp::Eq, "2")],
                value: 64.0,
            },
        ];
        assert_eq!(lookup_first(&lookups, &ctx, None).unwrap(), 32.0);
    }

    #[test]
    fn discrete_lookup_no_match_is_an_error() {
        let ctx = ctx_with("SEL", Value::Uint(9));
        let lookups = vec![DiscreteLookup {
            criteria: vec![Comparison::new("SEL", CompareOp::Eq, "1")],
            value: 16.0,
        }];
        assert!(matches!(
            lookup_first(&lookups, &ctx, None),
            Err(Error::Evaluation(_))
        ));
    }
}
