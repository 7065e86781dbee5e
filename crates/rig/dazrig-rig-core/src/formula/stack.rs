//! Symbolic interpreter for DSON formula stack programs.
//!
//! Values on the stack stay symbolic: a channel reference multiplied by a
//! constant remains `coeff * channel`, which is exactly what a driver needs.
//! Programs that would combine two channels are reported as unsupported rather
//! than approximated.

use std::fmt;

use dazrig_api_core::{ChannelPath, Operand, Operation};

use super::driven::SplineCurve;

#[derive(Debug, Clone, PartialEq)]
pub enum StackItem {
    Const(f64),
    Knot(Vec<f64>),
    Channel { path: ChannelPath, coeff: f64 },
    Spline { input: ChannelPath, curve: SplineCurve },
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackItem::Const(v) => write!(f, "{v}"),
            StackItem::Knot(k) => write!(f, "knot{k:?}"),
            StackItem::Channel { path, coeff } => write!(f, "{coeff}*{}", path.key()),
            StackItem::Spline { input, .. } => write!(f, "spline({})", input.key()),
        }
    }
}

/// Why a program could not be reduced.
#[derive(Debug, Clone, PartialEq)]
pub enum StackError {
    /// Stack imbalance, underflow or bad operands; the input data is broken.
    Malformed(String),
    UnknownOp(String),
    /// Valid DSON that has no linear/piecewise driver form.
    Unsupported(String),
}

fn pop(stack: &mut Vec<StackItem>, op: &str) -> Result<StackItem, StackError> {
    stack
        .pop()
        .ok_or_else(|| StackError::Malformed(format!("stack underflow at '{op}'")))
}

fn binary(op: &Operation, a: StackItem, b: StackItem) -> Result<StackItem, StackError> {
    use StackItem::{Channel, Const};
    let unsupported = |a: &StackItem, b: &StackItem| {
        StackError::Unsupported(format!("'{}' of {a} and {b}", op.tag()))
    };
    Ok(match (op, a, b) {
        (Operation::Add, Const(x), Const(y)) => Const(x + y),
        (Operation::Sub, Const(x), Const(y)) => Const(x - y),
        (Operation::Mult, Const(x), Const(y)) => Const(x * y),
        (Operation::Mult, Channel { path, coeff }, Const(k))
        | (Operation::Mult, Const(k), Channel { path, coeff }) => Channel {
            path,
            coeff: coeff * k,
        },
        (Operation::Div, _, Const(k)) if k == 0.0 => {
            return Err(StackError::Malformed("division by zero".into()))
        }
        (Operation::Div, Const(x), Const(y)) => Const(x / y),
        (Operation::Div, Channel { path, coeff }, Const(k)) => Channel {
            path,
            coeff: coeff / k,
        },
        (_, a, b) => return Err(unsupported(&a, &b)),
    })
}

fn spline(op: &Operation, stack: &mut Vec<StackItem>) -> Result<StackItem, StackError> {
    let tag = op.tag();
    let count = match pop(stack, tag)? {
        StackItem::Const(n) if n >= 0.0 && n.fract() == 0.0 && n <= stack.len() as f64 => {
            n as usize
        }
        StackItem::Const(n) if n >= 0.0 && n.fract() == 0.0 => {
            return Err(StackError::Malformed(format!(
                "'{tag}' wants {n} knots but the stack holds {}",
                stack.len()
            )))
        }
        other => {
            return Err(StackError::Malformed(format!(
                "'{tag}' expects a knot count, found {other}"
            )))
        }
    };
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        match pop(stack, tag)? {
            StackItem::Knot(k) if k.len() >= 2 => points.push((k[0], k[1])),
            other => {
                return Err(StackError::Malformed(format!(
                    "'{tag}' expects {count} knots, found {other}"
                )))
            }
        }
    }
    points.reverse();
    let stepped = matches!(op, Operation::SplineConstant);
    match pop(stack, tag)? {
        StackItem::Channel { path, coeff } => {
            if coeff == 0.0 {
                return Err(StackError::Unsupported(format!(
                    "'{tag}' over a zero-scaled input"
                )));
            }
            // spline(coeff * x) == spline'(x) with knots x / coeff
            let points = points.into_iter().map(|(x, y)| (x / coeff, y)).collect();
            Ok(StackItem::Spline {
                input: path,
                curve: SplineCurve::new(points, stepped),
            })
        }
        StackItem::Const(x) => Ok(StackItem::Const(
            SplineCurve::new(points, stepped).evaluate(x),
        )),
        other => Err(StackError::Malformed(format!(
            "'{tag}' input must be a value, found {other}"
        ))),
    }
}

/// Run `operations` and return the single remaining stack item.
pub fn run_program(operations: &[Operation]) -> Result<StackItem, StackError> {
    let mut stack: Vec<StackItem> = Vec::with_capacity(operations.len());
    for op in operations {
        match op {
            Operation::Push(Operand::Const(v)) => stack.push(StackItem::Const(*v)),
            Operation::Push(Operand::Knot(k)) => stack.push(StackItem::Knot(k.clone())),
            Operation::Push(Operand::Ref(path)) => stack.push(StackItem::Channel {
                path: path.clone(),
                coeff: 1.0,
            }),
            Operation::Add | Operation::Sub | Operation::Mult | Operation::Div => {
                let b = pop(&mut stack, op.tag())?;
                let a = pop(&mut stack, op.tag())?;
                stack.push(binary(op, a, b)?);
            }
            Operation::SplineConstant | Operation::SplineLinear | Operation::SplineTcb => {
                let item = spline(op, &mut stack)?;
                stack.push(item);
            }
            Operation::Unknown(tag) => return Err(StackError::UnknownOp(tag.clone())),
        }
    }
    if stack.len() != 1 {
        return Err(StackError::Malformed(format!(
            "stack holds {} values after evaluation",
            stack.len()
        )));
    }
    match stack.pop() {
        Some(StackItem::Knot(_)) => Err(StackError::Malformed(
            "formula reduces to a bare spline knot".into(),
        )),
        Some(item) => Ok(item),
        None => Err(StackError::Malformed("empty program".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dazrig_api_core::{Channel, Component};

    fn url(s: &str) -> Operation {
        Operation::Push(Operand::Ref(ChannelPath::parse(s).unwrap()))
    }

    fn val(v: f64) -> Operation {
        Operation::Push(Operand::Const(v))
    }

    fn knot(x: f64, y: f64) -> Operation {
        Operation::Push(Operand::Knot(vec![x, y, 0.0, 0.0, 0.0]))
    }

    #[test]
    fn push_push_mult_scales_channel() {
        let item = run_program(&[url("#lShldr?rotation/x"), val(0.5), Operation::Mult]).unwrap();
        match item {
            StackItem::Channel { path, coeff } => {
                assert_eq!(path.entity, "lShldr");
                assert_eq!(path.channel, Channel::Rotation);
                assert_eq!(path.component, Component::X);
                assert_eq!(coeff, 0.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn constant_first_mult_and_div() {
        let item = run_program(&[
            val(2.0),
            url("#lShldr?rotation/z"),
            Operation::Mult,
            val(4.0),
            Operation::Div,
        ])
        .unwrap();
        assert!(matches!(item, StackItem::Channel { coeff, .. } if coeff == 0.5));
    }

    #[test]
    fn spline_collects_sorted_knots() {
        let item = run_program(&[
            url("#lThigh?rotation/x"),
            knot(90.0, 1.0),
            knot(0.0, 0.0),
            val(2.0),
            Operation::SplineTcb,
        ])
        .unwrap();
        match item {
            StackItem::Spline { input, curve } => {
                assert_eq!(input.entity, "lThigh");
                assert_eq!(curve.points, vec![(0.0, 0.0), (90.0, 1.0)]);
                assert!(!curve.stepped);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn imbalanced_stack_is_malformed() {
        let err = run_program(&[url("#a?value"), val(1.0)]).unwrap_err();
        assert!(matches!(err, StackError::Malformed(m) if m.contains("2 values")));
        let err = run_program(&[val(1.0), Operation::Mult]).unwrap_err();
        assert!(matches!(err, StackError::Malformed(m) if m.contains("underflow")));
        let err = run_program(&[]).unwrap_err();
        assert!(matches!(err, StackError::Malformed(_)));
    }

    #[test]
    fn bad_knot_count_is_malformed() {
        let err = run_program(&[
            url("#lThigh?rotation/x"),
            knot(0.0, 0.0),
            val(3.0),
            Operation::SplineLinear,
        ])
        .unwrap_err();
        assert!(matches!(err, StackError::Malformed(_)));
    }

    #[test]
    fn huge_knot_count_is_malformed() {
        let err = run_program(&[
            url("#b?rotation/x"),
            knot(0.0, 0.0),
            val(1e300),
            Operation::SplineLinear,
        ])
        .unwrap_err();
        assert!(matches!(err, StackError::Malformed(m) if m.contains("knots")));
    }

    #[test]
    fn channel_products_are_unsupported() {
        let err = run_program(&[url("#a?value"), url("#b?value"), Operation::Mult]).unwrap_err();
        assert!(matches!(err, StackError::Unsupported(_)));
    }

    #[test]
    fn unknown_op_is_reported() {
        let err = run_program(&[val(1.0), Operation::Unknown("pow".into())]).unwrap_err();
        assert_eq!(err, StackError::UnknownOp("pow".into()));
    }
}
