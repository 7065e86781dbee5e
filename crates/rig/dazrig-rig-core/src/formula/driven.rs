//! Driven-expression records: the evaluator's output and the synthesizer's input.

use dazrig_api_core::{Channel, ChannelPath};
use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::driver::ast::piecewise_value;

/// Coefficient payload of a [`DrivenExpr`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrivenValue {
    /// Coefficients over the driving bone's x/y/z channel components
    Vector([f64; 3]),
    /// Coefficient of the driving property
    Scalar(f64),
}

impl DrivenValue {
    pub fn scaled(self, k: f64) -> Self {
        match self {
            DrivenValue::Vector(v) => DrivenValue::Vector([v[0] * k, v[1] * k, v[2] * k]),
            DrivenValue::Scalar(s) => DrivenValue::Scalar(s * k),
        }
    }

    /// Component-wise product; a scalar scales every component of a vector.
    pub fn product(self, other: Self) -> Self {
        match (self, other) {
            (DrivenValue::Vector(a), DrivenValue::Vector(b)) => {
                DrivenValue::Vector([a[0] * b[0], a[1] * b[1], a[2] * b[2]])
            }
            (DrivenValue::Vector(_), DrivenValue::Scalar(s)) => self.scaled(s),
            (DrivenValue::Scalar(s), DrivenValue::Vector(_)) => other.scaled(s),
            (DrivenValue::Scalar(a), DrivenValue::Scalar(b)) => DrivenValue::Scalar(a * b),
        }
    }
}

/// Ascending control points of a piecewise curve. Stepped curves hold each
/// value until the next knot; others interpolate linearly. Both clamp outside
/// the knot range.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineCurve {
    pub points: Vec<(f64, f64)>,
    pub stepped: bool,
}

impl SplineCurve {
    pub fn new(mut points: Vec<(f64, f64)>, stepped: bool) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { points, stepped }
    }

    /// Same knots with every y multiplied by `k`.
    pub fn scaled(mut self, k: f64) -> Self {
        for p in &mut self.points {
            p.1 *= k;
        }
        self
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        piecewise_value(x, &self.points, self.stepped)
    }
}

/// Where a driven expression reads its input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DrivingSource {
    Bone { name: String, channel: Channel },
    Prop(String),
}

/// One driven contribution to an output channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DrivenExpr {
    pub value: DrivenValue,
    pub driving_bone: Option<String>,
    pub driving_channel: Channel,
    pub driving_prop: Option<String>,
    /// Curve applied to the linear input `value · source`
    pub spline: Option<SplineCurve>,
    /// Factors of a multiplied stage record; empty for plain expressions
    pub stages: Vec<DrivenExpr>,
}

impl DrivenExpr {
    pub fn from_source(source: &DrivingSource, axis: usize, coeff: f64) -> Self {
        match source {
            DrivingSource::Bone { name, channel } => {
                let mut v = [0.0; 3];
                v[axis.min(2)] = coeff;
                Self::bone(name.clone(), *channel, v)
            }
            DrivingSource::Prop(name) => Self::prop(name.clone(), coeff),
        }
    }

    pub fn bone(name: impl Into<String>, channel: Channel, value: [f64; 3]) -> Self {
        Self {
            value: DrivenValue::Vector(value),
            driving_bone: Some(name.into()),
            driving_channel: channel,
            driving_prop: None,
            spline: None,
            stages: Vec::new(),
        }
    }

    pub fn prop(name: impl Into<String>, coeff: f64) -> Self {
        Self {
            value: DrivenValue::Scalar(coeff),
            driving_bone: None,
            driving_channel: Channel::Value,
            driving_prop: Some(name.into()),
            spline: None,
            stages: Vec::new(),
        }
    }

    pub fn with_spline(mut self, curve: SplineCurve) -> Self {
        self.spline = Some(curve);
        self
    }

    pub fn source(&self) -> Option<DrivingSource> {
        match (&self.driving_bone, &self.driving_prop) {
            (Some(name), _) => Some(DrivingSource::Bone {
                name: name.clone(),
                channel: self.driving_channel,
            }),
            (None, Some(prop)) => Some(DrivingSource::Prop(prop.clone())),
            (None, None) => None,
        }
    }

    /// Plain linear record: no curve, no stage factors.
    pub fn is_linear(&self) -> bool {
        self.spline.is_none() && self.stages.is_empty()
    }

    /// Numeric value against a DAZ-unit pose. Stage records evaluate to the
    /// product of their factors, each clamped to [0, 1].
    pub fn evaluate(&self, pose: &PoseSample) -> f64 {
        if !self.stages.is_empty() {
            return self
                .stages
                .iter()
                .map(|s| s.evaluate(pose).clamp(0.0, 1.0))
                .product();
        }
        let input = match self.value {
            DrivenValue::Vector(v) => {
                let src = self
                    .driving_bone
                    .as_deref()
                    .map(|b| pose.bone(b, self.driving_channel))
                    .unwrap_or_default();
                v[0] * src[0] + v[1] * src[1] + v[2] * src[2]
            }
            DrivenValue::Scalar(k) => {
                k * self.driving_prop.as_deref().map(|p| pose.prop(p)).unwrap_or(0.0)
            }
        };
        match &self.spline {
            Some(curve) => curve.evaluate(input),
            None => input,
        }
    }
}

/// Multiply stage factors into one record. The value is the product of the
/// factor values; bone/prop/curve metadata comes from the first factor only.
pub fn multiply_stages(factors: Vec<DrivenExpr>) -> Option<DrivenExpr> {
    let first = factors.first()?;
    let value = factors
        .iter()
        .skip(1)
        .fold(first.value, |acc, f| acc.product(f.value));
    Some(DrivenExpr {
        value,
        driving_bone: first.driving_bone.clone(),
        driving_channel: first.driving_channel,
        driving_prop: first.driving_prop.clone(),
        spline: first.spline.clone(),
        stages: factors,
    })
}

/// Everything driving one output channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelExprs {
    pub sum: Vec<DrivenExpr>,
    pub product: Option<DrivenExpr>,
}

impl ChannelExprs {
    pub fn is_empty(&self) -> bool {
        self.sum.is_empty() && self.product.is_none()
    }

    pub fn evaluate(&self, pose: &PoseSample) -> f64 {
        let sum: f64 = self.sum.iter().map(|e| e.evaluate(pose)).sum();
        match &self.product {
            None => sum,
            Some(p) if self.sum.is_empty() => p.evaluate(pose),
            Some(p) => sum * p.evaluate(pose),
        }
    }

    /// Reduce to one record for use as a stage factor. A product keeps its
    /// factors. Several sum entries cannot be multiplied through, so they give
    /// `None` and the caller reads the morph's own value instead.
    pub fn collapse(&self) -> Option<DrivenExpr> {
        if self.sum.len() > 1 {
            log::debug!(
                "stage factor has {} summed inputs; reading the morph value",
                self.sum.len()
            );
            return None;
        }
        let mut factors: Vec<DrivenExpr> = self.sum.first().cloned().into_iter().collect();
        if let Some(p) = &self.product {
            factors.extend(p.stages.iter().cloned());
        }
        match factors.len() {
            0 => None,
            1 => factors.pop(),
            _ => multiply_stages(factors),
        }
    }

    /// Bones read by any record, in first-use order.
    pub fn driving_bones(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let product_stages = self.product.iter().flat_map(|p| p.stages.iter());
        for e in self.sum.iter().chain(product_stages) {
            if let Some(b) = e.driving_bone.as_deref() {
                if !out.contains(&b) {
                    out.push(b);
                }
            }
        }
        out
    }
}

/// Output channel → driven records, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ExprTable {
    entries: IndexMap<ChannelPath, ChannelExprs>,
}

impl ExprTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set component `axis` of the linear record for `source`, creating it when
    /// this is the first formula from that source.
    pub fn fold_linear(
        &mut self,
        output: &ChannelPath,
        source: &DrivingSource,
        axis: usize,
        coeff: f64,
    ) {
        let exprs = self.entries.entry(output.clone()).or_default();
        let existing = exprs
            .sum
            .iter_mut()
            .find(|e| e.is_linear() && e.source().as_ref() == Some(source));
        match (existing, source) {
            (Some(expr), DrivingSource::Bone { .. }) => {
                if let DrivenValue::Vector(v) = &mut expr.value {
                    v[axis.min(2)] = coeff;
                }
            }
            (Some(expr), DrivingSource::Prop(_)) => expr.value = DrivenValue::Scalar(coeff),
            (None, _) => exprs.sum.push(DrivenExpr::from_source(source, axis, coeff)),
        }
    }

    /// Curves never merge; each gets its own record.
    pub fn fold_spline(&mut self, output: &ChannelPath, expr: DrivenExpr) {
        self.entries.entry(output.clone()).or_default().sum.push(expr);
    }

    /// Add a factor to the output's product record. Nested products are
    /// flattened so every factor keeps its own source.
    pub fn fold_stage(&mut self, output: &ChannelPath, factor: DrivenExpr) {
        let exprs = self.entries.entry(output.clone()).or_default();
        let mut factors = exprs
            .product
            .take()
            .map(|p| p.stages)
            .unwrap_or_default();
        if factor.stages.is_empty() {
            factors.push(factor);
        } else {
            factors.extend(factor.stages);
        }
        exprs.product = multiply_stages(factors);
    }

    pub fn get(&self, output: &ChannelPath) -> Option<&ChannelExprs> {
        self.entries.get(output)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelPath, &ChannelExprs)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bone channel and property values in DAZ units, for numeric checks.
#[derive(Debug, Clone, Default)]
pub struct PoseSample {
    bones: HashMap<(String, Channel), [f64; 3]>,
    props: HashMap<String, f64>,
}

impl PoseSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bone(mut self, bone: &str, channel: Channel, value: [f64; 3]) -> Self {
        self.bones.insert((bone.to_string(), channel), value);
        self
    }

    pub fn with_prop(mut self, name: &str, value: f64) -> Self {
        self.props.insert(name.to_string(), value);
        self
    }

    pub fn bone(&self, bone: &str, channel: Channel) -> [f64; 3] {
        self.bones
            .get(&(bone.to_string(), channel))
            .copied()
            .unwrap_or_default()
    }

    pub fn prop(&self, name: &str) -> f64 {
        self.props.get(name).copied().unwrap_or(0.0)
    }
}
