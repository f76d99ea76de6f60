//! Calibrators: raw-to-engineering-unit transformations.

use serde::{Deserialize, Serialize};

use crate::packet::ParseContext;
use crate::value::Value;
use crate::xtce::criteria::MatchCriteria;
use crate::{Error, Result};

/// One `<xtce:Term>` of a polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolynomialCoefficient {
    pub coefficient: f64,
    pub exponent: i32,
}

/// `<xtce:PolynomialCalibrator>`: `y = sum(c_i * x^e_i)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialCalibrator {
    pub coefficients: Vec<PolynomialCoefficient>,
}

impl PolynomialCalibrator {
    /// Convenience constructor from dense coefficients `[c0, c1, c2, ...]`
    /// where the index is the exponent.
    #[must_use]
    pub fn from_dense(coefficients: &[f64]) -> Self {
        PolynomialCalibrator {
            coefficients: coefficients
                .iter()
                .enumerate()
                .map(|(exponent, &coefficient)| PolynomialCoefficient {
                    coefficient,
                    exponent: exponent as i32,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn calibrate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .map(|t| t.coefficient * x.powi(t.exponent))
            .sum()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplineOrder {
    /// Nearest lower point within range; nearest point when extrapolating.
    #[default]
    Flat,
    /// Linear interpolation between bracketing points; the end segments
    /// extend when extrapolating.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplinePoint {
    pub raw: f64,
    pub calibrated: f64,
}

/// `<xtce:SplineCalibrator>`: piecewise interpolation over ordered points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineCalibrator {
    points: Vec<SplinePoint>,
    pub order: SplineOrder,
    pub extrapolate: bool,
}

impl SplineCalibrator {
    /// Points are sorted by raw value on construction.
    ///
    /// # Errors
    /// [`Error::Definition`] with fewer than two points.
    pub fn new(mut points: Vec<SplinePoint>, order: SplineOrder, extrapolate: bool) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::Definition(format!(
                "spline calibrator requires at least 2 points, got {}",
                points.len()
            )));
        }
        points.sort_by(|a, b| a.raw.total_cmp(&b.raw));
        Ok(SplineCalibrator {
            points,
            order,
            extrapolate,
        })
    }

    #[must_use]
    pub fn points(&self) -> &[SplinePoint] {
        &self.points
    }

    /// # Errors
    /// [`Error::Evaluation`] when `x` falls outside the points and
    /// extrapolation is disabled.
    pub fn calibrate(&self, x: f64) -> Result<f64> {
        let points = &self.points;
        let first = points[0];
        let last = points[points.len() - 1];

        if x < first.raw || x > last.raw {
            if !self.extrapolate {
                return Err(Error::Evaluation(format!(
                    "value {x} is outside the spline range [{}, {}] and extrapolation is disabled",
                    first.raw, last.raw
                )));
            }
            return Ok(match self.order {
                SplineOrder::Flat => {
                    if x < first.raw {
                        first.calibrated
                    } else {
                        last.calibrated
                    }
                }
                SplineOrder::Linear => {
                    if x < first.raw {
                        interpolate(points[0], points[1], x)
                    } else {
                        interpolate(points[points.len() - 2], last, x)
                    }
                }
            });
        }

        // Index of the first point with raw > x; x is bracketed by
        // [upper - 1, upper].
        let upper = points
            .partition_point(|p| p.raw <= x)
            .min(points.len() - 1);
        Ok(match self.order {
            SplineOrder::Flat => points[upper - 1].calibrated,
            SplineOrder::Linear => interpolate(points[upper - 1], points[upper], x),
        })
    }
}

fn interpolate(p0: SplinePoint, p1: SplinePoint, x: f64) -> f64 {
    let slope = (p1.calibrated - p0.calibrated) / (p1.raw - p0.raw);
    p0.calibrated + slope * (x - p0.raw)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Calibrator {
    Polynomial(PolynomialCalibrator),
    Spline(SplineCalibrator),
}

impl Calibrator {
    pub fn calibrate(&self, x: f64) -> Result<f64> {
        match self {
            Calibrator::Polynomial(c) => Ok(c.calibrate(x)),
            Calibrator::Spline(c) => c.calibrate(x),
        }
    }
}

/// `<xtce:ContextCalibrator>`: a calibrator guarded by match criteria over
/// previously parsed parameters (or the value currently being parsed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextCalibrator {
    pub criteria: Vec<MatchCriteria>,
    pub calibrator: Calibrator,
}

impl ContextCalibrator {
    pub fn matches(&self, ctx: &ParseContext, current: &Value) -> Result<bool> {
        for criterion in &self.criteria {
            if !criterion.evaluate(ctx, Some(current))? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polynomial_constant() {
        let cal = PolynomialCalibrator::from_dense(&[7.5]);
        assert_eq!(cal.calibrate(0.0), 7.5);
        assert_eq!(cal.calibrate(-12345.0), 7.5);
    }

    #[test]
    fn polynomial_quadratic() {
        // 1.0 + 2.0*x + 0.5*x^2 at x=10 -> 71.0
        let cal = PolynomialCalibrator::from_dense(&[1.0, 2.0, 0.5]);
        assert_eq!(cal.calibrate(10.0), 71.0);
    }

    #[test]
    fn polynomial_sparse_terms() {
        let cal = PolynomialCalibrator {
            coefficients: vec![PolynomialCoefficient {
                coefficient: 3.0,
                exponent: 2,
            }],
        };
        assert_eq!(cal.calibrate(4.0), 48.0);
    }

    fn spline(order: SplineOrder, extrapolate: bool) -> SplineCalibrator {
        SplineCalibrator::new(
            vec![
                SplinePoint {
                    raw: 0.0,
                    calibrated: 0.0,
                },
                SplinePoint {
                    raw: 10.0,
                    calibrated: 100.0,
                },
                SplinePoint {
                    raw: 20.0,
                    calibrated: 50.0,
                },
            ],
            order,
            extrapolate,
        )
        .unwrap()
    }

    #[test]
    fn spline_linear_interpolation() {
        let cal = spline(SplineOrder::Linear, false);
        assert_eq!(cal.calibrate(5.0).unwrap(), 50.0);
        assert_eq!(cal.calibrate(15.0).unwrap(), 75.0);
        assert_eq!(cal.calibrate(0.0).unwrap(), 0.0);
        assert_eq!(cal.calibrate(20.0).unwrap(), 50.0);
    }

    #[test]
    fn spline_flat_takes_lower_point() {
        let cal = spline(SplineOrder::Flat, false);
        assert_eq!(cal.calibrate(9.9).unwrap(), 0.0);
        assert_eq!(cal.calibrate(10.0).unwrap(), 100.0);
        assert_eq!(cal.calibrate(20.0).unwrap(), 100.0);
    }

    #[test]
    fn spline_out_of_range_errors_without_extrapolation() {
        let cal = spline(SplineOrder::Linear, false);
        assert!(matches!(cal.calibrate(-1.0), Err(Error::Evaluation(_))));
        assert!(matches!(cal.calibrate(21.0), Err(Error::Evaluation(_))));
    }

    #[test]
    fn spline_extrapolation_policies() {
        let flat = spline(SplineOrder::Flat, true);
        assert_eq!(flat.calibrate(-5.0).unwrap(), 0.0);
        assert_eq!(flat.calibrate(99.0).unwrap(), 100.0);

        let linear = spline(SplineOrder::Linear, true);
        assert_eq!(linear.calibrate(-1.0).unwrap(), -10.0);
        // Last segment slope is -5 per unit.
        assert_eq!(linear.calibrate(22.0).unwrap(), 40.0);
    }

    #[test]
    fn spline_sorts_points() {
        let cal = SplineCalibrator::new(
            vec![
                SplinePoint {
                    raw: 10.0,
                    calibrated: 1.0,
                },
                SplinePoint {
                    raw: 0.0,
                    calibrated: 0.0,
                },
            ],
            SplineOrder::Linear,
            false,
        )
        .unwrap();
        assert_eq!(cal.calibrate(5.0).unwrap(), 0.5);
    }

    #[test]
    fn spline_requires_two_points() {
        assert!(matches!(
            SplineCalibrator::new(
                vec![SplinePoint {
                    raw: 0.0,
                    calibrated: 0.0
                }],
                SplineOrder::Flat,
                false
            ),
            Err(Error::Definition(_))
        ));
    }
}
