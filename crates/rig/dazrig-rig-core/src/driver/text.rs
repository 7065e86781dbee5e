//! Rendering driver trees to host expression text under a length budget.

use super::ast::{DriverExpr, COEFF_SCALE};

/// Decimal places used for curve knots and slopes.
const CURVE_DECIMALS: usize = 4;

const CLAMP_OPEN: &str = "min(1,max(0,";
const CLAMP_CLOSE: &str = "))";

/// Expression text ready for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub text: String,
    /// Terms, factors or segments were dropped to fit the budget.
    pub truncated: bool,
}

/// Fixed-point number with trailing zeros stripped ("0.5", "-12", "0").
pub fn fmt_num(v: f64) -> String {
    let s = format!("{:.*}", CURVE_DECIMALS, v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn push_signed(out: &mut String, negative: bool, body: &str) {
    if negative {
        out.push('-');
    } else if !out.is_empty() {
        out.push('+');
    }
    out.push_str(body);
}

fn weighted_terms(terms: &[(i64, String)]) -> String {
    let mut out = String::new();
    for (c, v) in terms {
        push_signed(&mut out, *c < 0, &format!("{}*{v}", c.unsigned_abs()));
    }
    out
}

fn render_dot(terms: &[(f64, String)]) -> String {
    match terms {
        [] => "0".to_string(),
        [(w, v)] if *w == 1.0 => v.clone(),
        [(w, v)] if *w == -1.0 => format!("-{v}"),
        _ => {
            let mut out = String::new();
            for (w, v) in terms {
                push_signed(&mut out, *w < 0.0, &format!("{}*{v}", fmt_num(w.abs())));
            }
            format!("({out})")
        }
    }
}

fn segment(x: &str, prev: (f64, f64), next: (f64, f64), stepped: bool) -> String {
    let (xp, yp) = prev;
    let (xi, yi) = next;
    if stepped || xi == xp {
        return fmt_num(yp);
    }
    let k = (yi - yp) / (xi - xp);
    let b = yi - k * xi;
    if fmt_num(k) == "0" {
        return fmt_num(b);
    }
    let mut out = format!("{}*{x}", fmt_num(k));
    let b_text = fmt_num(b.abs());
    if b_text != "0" {
        out.push(if b < 0.0 { '-' } else { '+' });
        out.push_str(&b_text);
    }
    out
}

fn render_piecewise(input: &DriverExpr, points: &[(f64, f64)], stepped: bool) -> String {
    let Some(&(x0, y0)) = points.first() else {
        return "0".to_string();
    };
    if points.len() == 1 {
        return fmt_num(y0);
    }
    let x = render(input);
    let mut out = format!("({} if {x}<{} else ", fmt_num(y0), fmt_num(x0));
    for i in 1..points.len() {
        out.push_str(&segment(&x, points[i - 1], points[i], stepped));
        out.push_str(&format!(" if {x}<{} else ", fmt_num(points[i].0)));
    }
    out.push_str(&fmt_num(points[points.len() - 1].1));
    out.push(')');
    out
}

/// Render a child of a sum or product, parenthesising forms that would
/// otherwise bind wrongly.
fn render_operand(expr: &DriverExpr, in_product: bool) -> String {
    match expr {
        DriverExpr::Raw(text) => format!("({text})"),
        DriverExpr::Sum(_) if in_product => format!("({})", render(expr)),
        _ => render(expr),
    }
}

pub fn render(expr: &DriverExpr) -> String {
    match expr {
        DriverExpr::WeightedSum(terms) if terms.is_empty() => "0".to_string(),
        DriverExpr::WeightedSum(terms) => format!("({})/{COEFF_SCALE}", weighted_terms(terms)),
        DriverExpr::Dot(terms) => render_dot(terms),
        DriverExpr::Piecewise {
            input,
            points,
            stepped,
        } => render_piecewise(input, points, *stepped),
        DriverExpr::Clamp01(inner) => format!("{CLAMP_OPEN}{}{CLAMP_CLOSE}", render(inner)),
        DriverExpr::Product(factors) => factors
            .iter()
            .map(|f| render_operand(f, true))
            .collect::<Vec<_>>()
            .join("*"),
        DriverExpr::Sum(parts) => parts
            .iter()
            .map(|p| render_operand(p, false))
            .collect::<Vec<_>>()
            .join("+"),
        DriverExpr::Raw(text) => text.clone(),
    }
}

/// Cut a signed term list at an operator so the kept prefix is at most `avail`
/// bytes. The last fitting `+` wins over any `-`.
fn cut_terms(inner: &str, avail: usize) -> Option<&str> {
    if inner.len() <= avail {
        return Some(inner);
    }
    let window = &inner[..=avail];
    let cut = window
        .rfind('+')
        .or_else(|| window[1..].rfind('-').map(|p| p + 1))?;
    (cut > 0).then(|| &inner[..cut])
}

/// Structural shrink. `None` when no boundary leaves anything that fits.
fn shrink(expr: &DriverExpr, budget: usize) -> Option<String> {
    match expr {
        DriverExpr::WeightedSum(terms) => {
            let suffix = format!(")/{COEFF_SCALE}");
            let avail = budget.checked_sub(1 + suffix.len())?;
            let inner = weighted_terms(terms);
            cut_terms(&inner, avail).map(|kept| format!("({kept}{suffix}"))
        }
        DriverExpr::Sum(parts) => {
            let mut out = String::new();
            for part in parts {
                let sep = usize::from(!out.is_empty());
                let text = render_operand(part, false);
                if out.len() + sep + text.len() <= budget {
                    if sep == 1 {
                        out.push('+');
                    }
                    out.push_str(&text);
                    continue;
                }
                let room = budget.saturating_sub(out.len() + sep);
                if let Some(partial) = shrink(part, room) {
                    if sep == 1 {
                        out.push('+');
                    }
                    out.push_str(&partial);
                }
                break;
            }
            (!out.is_empty()).then_some(out)
        }
        DriverExpr::Product(factors) => {
            let mut out = String::new();
            for factor in factors {
                let sep = usize::from(!out.is_empty());
                let text = render_operand(factor, true);
                if out.len() + sep + text.len() > budget {
                    if out.is_empty() {
                        return shrink(factor, budget);
                    }
                    break;
                }
                if sep == 1 {
                    out.push('*');
                }
                out.push_str(&text);
            }
            (!out.is_empty()).then_some(out)
        }
        DriverExpr::Piecewise {
            input,
            points,
            stepped,
        } => (1..points.len()).rev().find_map(|n| {
            let text = render_piecewise(input, &points[..n], *stepped);
            (text.len() <= budget).then_some(text)
        }),
        DriverExpr::Clamp01(inner) => {
            let room = budget.checked_sub(CLAMP_OPEN.len() + CLAMP_CLOSE.len())?;
            shrink(inner, room).map(|s| format!("{CLAMP_OPEN}{s}{CLAMP_CLOSE}"))
        }
        DriverExpr::Dot(_) | DriverExpr::Raw(_) => None,
    }
}

fn hard_cut(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }
    let mut end = budget;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Render `expr` in at most `budget` bytes. Over-long trees are shrunk at term,
/// factor or segment boundaries; with no usable boundary the text is hard-cut.
pub fn emit(expr: &DriverExpr, budget: usize) -> Emitted {
    let full = render(expr);
    if full.len() <= budget {
        return Emitted {
            text: full,
            truncated: false,
        };
    }
    let text = match shrink(expr, budget) {
        Some(text) => hard_cut(&text, budget),
        None => {
            log::debug!("no term boundary within {budget} bytes; cutting expression");
            hard_cut(&full, budget)
        }
    };
    Emitted {
        text,
        truncated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(terms: &[(i64, &str)]) -> DriverExpr {
        DriverExpr::WeightedSum(terms.iter().map(|(c, v)| (*c, v.to_string())).collect())
    }

    #[test]
    fn numbers_strip_trailing_zeros() {
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(-12.0), "-12");
        assert_eq!(fmt_num(-0.00001), "0");
        assert_eq!(fmt_num(1.23456), "1.2346");
    }

    #[test]
    fn renders_weighted_sum() {
        assert_eq!(render(&ws(&[(500, "A"), (-250, "C")])), "(500*A-250*C)/1000");
        assert_eq!(render(&ws(&[(-8, "D")])), "(-8*D)/1000");
    }

    #[test]
    fn renders_piecewise_chain() {
        let e = DriverExpr::Piecewise {
            input: Box::new(DriverExpr::Dot(vec![(1.0, "A".into())])),
            points: vec![(0.0, 0.0), (0.5, 1.0), (1.0, 0.0)],
            stepped: false,
        };
        assert_eq!(
            render(&e),
            "(0 if A<0 else 2*A if A<0.5 else -2*A+2 if A<1 else 0)"
        );
    }

    #[test]
    fn renders_clamped_product_and_raw_sum() {
        let product = DriverExpr::Product(vec![
            ws(&[(1000, "A")]),
            DriverExpr::Clamp01(Box::new(DriverExpr::Dot(vec![(1.0, "D".into())]))),
        ]);
        assert_eq!(render(&product), "(1000*A)/1000*min(1,max(0,D))");
        let sum = DriverExpr::Sum(vec![DriverExpr::Raw("x if y else z".into()), ws(&[(1, "A")])]);
        assert_eq!(render(&sum), "(x if y else z)+(1*A)/1000");
    }

    #[test]
    fn cut_prefers_plus_boundary() {
        // window ends inside "-2*C"; both '+' and '-' fit, '+' wins
        assert_eq!(cut_terms("1*A+3*B-2*C", 9), Some("1*A"));
        assert_eq!(cut_terms("1*A-3*B-2*C", 9), Some("1*A-3*B"));
        assert_eq!(cut_terms("123456*A", 3), None);
    }

    #[test]
    fn short_expressions_pass_through() {
        let e = ws(&[(500, "A")]);
        let out = emit(&e, 255);
        assert!(!out.truncated);
        assert_eq!(out.text, "(500*A)/1000");
    }

    #[test]
    fn product_drops_trailing_factors() {
        let clamp = |v: &str| DriverExpr::Clamp01(Box::new(DriverExpr::Dot(vec![(1.0, v.into())])));
        let e = DriverExpr::Product(vec![ws(&[(1000, "A")]), clamp("D"), clamp("E")]);
        let out = emit(&e, 40);
        assert!(out.truncated);
        assert_eq!(out.text, "(1000*A)/1000*min(1,max(0,D))");
    }

    #[test]
    fn piecewise_drops_trailing_segments() {
        let e = DriverExpr::Piecewise {
            input: Box::new(DriverExpr::Dot(vec![(1.0, "A".into())])),
            points: vec![(0.0, 0.0), (0.5, 1.0), (1.0, 0.0)],
            stepped: false,
        };
        let out = emit(&e, 40);
        assert!(out.truncated);
        assert_eq!(out.text, "(0 if A<0 else 2*A if A<0.5 else 1)");
    }
}
