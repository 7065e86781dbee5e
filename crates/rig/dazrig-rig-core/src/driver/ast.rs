//! Structured driver expressions. Text is produced only at the host boundary
//! (see [`super::text`]); everything before that works on this tree.

use std::collections::BTreeSet;

use hashbrown::HashMap;

/// Denominator of [`DriverExpr::WeightedSum`] coefficients.
pub const COEFF_SCALE: i64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum DriverExpr {
    /// `(c1*A+c2*B)/1000` with integer coefficients already truncated.
    WeightedSum(Vec<(i64, String)>),
    /// Plain dot product of weights and variables; the input of a curve.
    Dot(Vec<(f64, String)>),
    /// Piecewise-linear (or stepped) curve over ascending knots.
    Piecewise {
        input: Box<DriverExpr>,
        points: Vec<(f64, f64)>,
        stepped: bool,
    },
    /// `min(1,max(0,inner))`
    Clamp01(Box<DriverExpr>),
    Product(Vec<DriverExpr>),
    Sum(Vec<DriverExpr>),
    /// Expression text already present on the host driver.
    Raw(String),
}

impl DriverExpr {
    /// Evaluate with the same semantics as the emitted text. `None` when the
    /// tree contains host text or an unbound variable.
    pub fn evaluate(&self, vars: &HashMap<String, f64>) -> Option<f64> {
        Some(match self {
            DriverExpr::WeightedSum(terms) => {
                let mut acc = 0.0;
                for (c, v) in terms {
                    acc += *c as f64 * vars.get(v)?;
                }
                acc / COEFF_SCALE as f64
            }
            DriverExpr::Dot(terms) => {
                let mut acc = 0.0;
                for (w, v) in terms {
                    acc += w * vars.get(v)?;
                }
                acc
            }
            DriverExpr::Piecewise {
                input,
                points,
                stepped,
            } => piecewise_value(input.evaluate(vars)?, points, *stepped),
            DriverExpr::Clamp01(inner) => inner.evaluate(vars)?.clamp(0.0, 1.0),
            DriverExpr::Product(factors) => {
                let mut acc = 1.0;
                for f in factors {
                    acc *= f.evaluate(vars)?;
                }
                acc
            }
            DriverExpr::Sum(parts) => {
                let mut acc = 0.0;
                for p in parts {
                    acc += p.evaluate(vars)?;
                }
                acc
            }
            DriverExpr::Raw(_) => return None,
        })
    }

    /// Variable names referenced by the tree.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            DriverExpr::WeightedSum(terms) => out.extend(terms.iter().map(|(_, v)| v.as_str())),
            DriverExpr::Dot(terms) => out.extend(terms.iter().map(|(_, v)| v.as_str())),
            DriverExpr::Piecewise { input, .. } => input.collect_variables(out),
            DriverExpr::Clamp01(inner) => inner.collect_variables(out),
            DriverExpr::Product(items) | DriverExpr::Sum(items) => {
                for item in items {
                    item.collect_variables(out);
                }
            }
            DriverExpr::Raw(_) => {}
        }
    }
}

/// Curve lookup shared by evaluation and rendering: below the first knot the
/// first value, past the last knot the last value, otherwise the segment line
/// `k*x + (y_i - k*x_i)` ending at the first knot greater than `x`.
pub fn piecewise_value(x: f64, points: &[(f64, f64)], stepped: bool) -> f64 {
    let Some(&(x0, y0)) = points.first() else {
        return 0.0;
    };
    if x < x0 {
        return y0;
    }
    for i in 1..points.len() {
        let (xp, yp) = points[i - 1];
        let (xi, yi) = points[i];
        if x < xi {
            if stepped || xi == xp {
                return yp;
            }
            let k = (yi - yp) / (xi - xp);
            return k * x + (yi - k * xi);
        }
    }
    points[points.len() - 1].1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn weighted_sum_divides_by_scale() {
        let e = DriverExpr::WeightedSum(vec![(500, "A".into()), (-250, "C".into())]);
        let v = e.evaluate(&vars(&[("A", 2.0), ("C", 4.0)])).unwrap();
        assert_relative_eq!(v, 0.0);
        assert!(e.evaluate(&vars(&[("A", 1.0)])).is_none());
    }

    #[test]
    fn clamped_product_stays_in_unit_range() {
        let e = DriverExpr::Product(vec![
            DriverExpr::Clamp01(Box::new(DriverExpr::Dot(vec![(2.0, "D".into())]))),
            DriverExpr::Clamp01(Box::new(DriverExpr::Dot(vec![(-1.0, "E".into())]))),
        ]);
        for (d, ev) in [(0.2, -0.5), (3.0, 2.0), (-1.0, -4.0)] {
            let v = e.evaluate(&vars(&[("D", d), ("E", ev)])).unwrap();
            assert!((0.0..=1.0).contains(&v));
        }
        assert_eq!(e.variables().into_iter().collect::<Vec<_>>(), vec!["D", "E"]);
    }

    #[test]
    fn piecewise_first_segment() {
        let points = [(0.0, 0.0), (0.5, 1.0), (1.0, 0.0)];
        assert_relative_eq!(piecewise_value(0.25, &points, false), 0.5);
        assert_relative_eq!(piecewise_value(-3.0, &points, false), 0.0);
        assert_relative_eq!(piecewise_value(1.5, &points, false), 0.0);
    }
}
