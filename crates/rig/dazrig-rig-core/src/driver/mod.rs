//! Driver synthesis: driven-expression records → host driver specifications.
//!
//! Coefficients are converted from DAZ units and axes into engine ones, driving
//! channels are bound to single-letter variables, and the result is kept as a
//! [`DriverExpr`] tree. Only [`DriverSpec::emit`] produces text.

use std::collections::BTreeSet;
use std::fmt;

use dazrig_api_core::{Channel, ChannelPath, Component};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::BuildContext;
use crate::coords::{channel_unit_factor, daz_axis_to_engine};
use crate::formula::{ChannelExprs, DrivenExpr, DrivenValue};

pub mod ast;
pub mod text;
pub mod vars;

pub use ast::{DriverExpr, COEFF_SCALE};
pub use text::{emit, fmt_num, render, Emitted};
use vars::VariablePool;

/// Engine transform channel a driver reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineChannel {
    Location,
    Rotation,
    Scale,
}

impl EngineChannel {
    pub fn from_daz(channel: Channel) -> Option<Self> {
        match channel {
            Channel::Translation => Some(EngineChannel::Location),
            Channel::Rotation => Some(EngineChannel::Rotation),
            Channel::Scale | Channel::GeneralScale => Some(EngineChannel::Scale),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineChannel::Location => "location",
            EngineChannel::Rotation => "rotation_euler",
            EngineChannel::Scale => "scale",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverTarget {
    BoneChannel {
        bone: String,
        channel: EngineChannel,
        index: usize,
    },
    ShapeKey {
        name: String,
    },
}

impl fmt::Display for DriverTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverTarget::BoneChannel {
                bone,
                channel,
                index,
            } => write!(f, "pose.bones[\"{bone}\"].{}[{index}]", channel.as_str()),
            DriverTarget::ShapeKey { name } => write!(f, "key_blocks[\"{name}\"].value"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableSource {
    BoneChannel {
        bone: String,
        channel: EngineChannel,
        index: usize,
    },
    Property {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverVariable {
    pub name: String,
    pub source: VariableSource,
}

/// Expression and variables of a driver already present on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingDriver {
    pub expression: String,
    pub variables: Vec<DriverVariable>,
}

/// A synthesized driver, still structured.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSpec {
    pub target: DriverTarget,
    pub expression: DriverExpr,
    pub variables: Vec<DriverVariable>,
    /// Properties feeding the driver, for issue reports
    pub props: BTreeSet<String>,
    /// Bones feeding the driver, for issue reports
    pub bones: BTreeSet<String>,
}

impl DriverSpec {
    /// Produce host text within `budget` bytes.
    pub fn emit(&self, budget: usize) -> EmittedDriver {
        let Emitted { text, truncated } = emit(&self.expression, budget);
        EmittedDriver {
            target: self.target.clone(),
            text,
            variables: self.variables.clone(),
            truncated,
        }
    }
}

/// Host-boundary form of a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedDriver {
    pub target: DriverTarget,
    pub text: String,
    pub variables: Vec<DriverVariable>,
    pub truncated: bool,
}

/// Recoverable synthesis failure; the driver is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    VariablesExhausted {
        props: BTreeSet<String>,
        bones: BTreeSet<String>,
    },
}

/// Variable bookkeeping for one driver under construction.
struct Binder {
    pool: VariablePool,
    bones: IndexMap<(String, Channel), [String; 3]>,
    props: IndexMap<String, String>,
    variables: Vec<DriverVariable>,
    prop_names: BTreeSet<String>,
    bone_names: BTreeSet<String>,
    exhausted: bool,
}

impl Binder {
    fn new(existing: Option<&ExistingDriver>) -> Self {
        let taken = existing
            .into_iter()
            .flat_map(|e| e.variables.iter().map(|v| v.name.clone()));
        Self {
            pool: VariablePool::new(taken),
            bones: IndexMap::new(),
            props: IndexMap::new(),
            variables: Vec::new(),
            prop_names: BTreeSet::new(),
            bone_names: BTreeSet::new(),
            exhausted: false,
        }
    }

    /// Variable for engine axis `index` of a driving bone channel.
    fn bone_axis(&mut self, bone: &str, channel: Channel, index: usize) -> Option<String> {
        self.bone_names.insert(bone.to_string());
        let key = (bone.to_string(), channel);
        let names = match self.bones.get(&key) {
            Some(names) => names.clone(),
            None => match self.pool.bone_axes() {
                Some(names) => {
                    self.bones.insert(key, names.clone());
                    names
                }
                None => {
                    self.exhausted = true;
                    return None;
                }
            },
        };
        let name = names[index.min(2)].clone();
        if !self.variables.iter().any(|v| v.name == name) {
            let engine = EngineChannel::from_daz(channel).unwrap_or(EngineChannel::Rotation);
            self.variables.push(DriverVariable {
                name: name.clone(),
                source: VariableSource::BoneChannel {
                    bone: bone.to_string(),
                    channel: engine,
                    index,
                },
            });
        }
        Some(name)
    }

    fn prop(&mut self, prop: &str) -> Option<String> {
        self.prop_names.insert(prop.to_string());
        if let Some(name) = self.props.get(prop) {
            return Some(name.clone());
        }
        let Some(name) = self.pool.next() else {
            self.exhausted = true;
            return None;
        };
        self.props.insert(prop.to_string(), name.clone());
        self.variables.push(DriverVariable {
            name: name.clone(),
            source: VariableSource::Property {
                name: prop.to_string(),
            },
        });
        Some(name)
    }
}

/// Converts [`ChannelExprs`] into [`DriverSpec`]s.
#[derive(Debug, Clone, Copy)]
pub struct DriverSynthesizer<'a> {
    ctx: &'a BuildContext,
}

impl<'a> DriverSynthesizer<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }

    /// Host target for a DAZ output channel; `None` for channels with no single
    /// engine property.
    pub fn target(&self, output: &ChannelPath) -> Option<DriverTarget> {
        match output.channel {
            Channel::Value => Some(DriverTarget::ShapeKey {
                name: output.entity.clone(),
            }),
            Channel::GeneralScale => None,
            channel => {
                let engine = EngineChannel::from_daz(channel)?;
                let (index, _) = daz_axis_to_engine(output.component, self.ctx);
                Some(DriverTarget::BoneChannel {
                    bone: output.entity.clone(),
                    channel: engine,
                    index,
                })
            }
        }
    }

    /// Sign and engine index for a DAZ channel component. Scale and scalar
    /// channels swap axes without flipping sign.
    fn axis(&self, channel: Channel, component: Component) -> (usize, f64) {
        let (index, sign) = daz_axis_to_engine(component, self.ctx);
        match channel {
            Channel::Rotation | Channel::Translation => (index, sign),
            _ => (index, 1.0),
        }
    }

    /// Build the driver for `output`. `Ok(None)` when every term is zero or the
    /// output has no engine target.
    pub fn synthesize(
        &self,
        output: &ChannelPath,
        exprs: &ChannelExprs,
        existing: Option<&ExistingDriver>,
    ) -> Result<Option<DriverSpec>, SynthesisError> {
        let Some(target) = self.target(output) else {
            log::log!(
                self.ctx.skip_level(),
                "{}: no engine channel for driven output",
                output.key()
            );
            return Ok(None);
        };
        let (_, out_sign) = self.axis(output.channel, output.component);
        let out_scale = out_sign * channel_unit_factor(output.channel, self.ctx);

        let mut binder = Binder::new(existing);
        let mut terms: Vec<(i64, String)> = Vec::new();
        let mut parts: Vec<DriverExpr> = Vec::new();
        for expr in &exprs.sum {
            if expr.spline.is_some() {
                if let Some(curve) = self.curve(expr, out_scale, &mut binder) {
                    parts.push(curve);
                }
            } else {
                self.linear_terms(expr, out_scale, &mut binder, &mut terms);
            }
        }
        if !terms.is_empty() {
            parts.insert(0, DriverExpr::WeightedSum(terms));
        }

        let mut factors = Vec::new();
        if let Some(product) = &exprs.product {
            for stage in &product.stages {
                match self.factor(stage, &mut binder) {
                    Some(f) => factors.push(DriverExpr::Clamp01(Box::new(f))),
                    None if binder.exhausted => break,
                    None => {
                        log::debug!("{}: zero stage factor, driver elided", output.key());
                        return Ok(None);
                    }
                }
            }
        }

        if binder.exhausted {
            return Err(SynthesisError::VariablesExhausted {
                props: binder.prop_names,
                bones: binder.bone_names,
            });
        }

        let base = match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(DriverExpr::Sum(parts)),
        };
        let expression = match (base, factors.is_empty()) {
            (None, true) => {
                log::debug!("{}: all coefficients are zero, no driver", output.key());
                return Ok(None);
            }
            (Some(base), true) => base,
            (base, false) => DriverExpr::Product(base.into_iter().chain(factors).collect()),
        };
        let mut variables = binder.variables;
        let expression = match existing {
            Some(e) if !e.expression.trim().is_empty() => {
                // the extended text still reads the old variables
                variables.splice(0..0, e.variables.iter().cloned());
                DriverExpr::Sum(vec![DriverExpr::Raw(e.expression.clone()), expression])
            }
            _ => expression,
        };

        Ok(Some(DriverSpec {
            target,
            expression,
            variables,
            props: binder.prop_names,
            bones: binder.bone_names,
        }))
    }

    /// Append `c*var` terms for a linear record, in engine units and axes.
    fn linear_terms(
        &self,
        expr: &DrivenExpr,
        out_scale: f64,
        binder: &mut Binder,
        terms: &mut Vec<(i64, String)>,
    ) {
        for (coeff, var) in self.weights(expr, out_scale, binder) {
            let milli = to_milli(coeff);
            if milli != 0 {
                terms.push((milli, var));
            }
        }
    }

    /// Per-variable weights of `scale * (value · source)` over engine-unit
    /// variables: a DAZ input equals `sign * engine / f_in`.
    fn weights(&self, expr: &DrivenExpr, scale: f64, binder: &mut Binder) -> Vec<(f64, String)> {
        let mut out = Vec::new();
        match (expr.value, &expr.driving_bone, &expr.driving_prop) {
            (DrivenValue::Vector(v), Some(bone), _) => {
                let channel = expr.driving_channel;
                let ratio = scale / channel_unit_factor(channel, self.ctx);
                for (i, k) in v.iter().enumerate() {
                    if *k == 0.0 {
                        continue;
                    }
                    let (index, sign) = self.axis(channel, Component::from_index(i));
                    if let Some(var) = binder.bone_axis(bone, channel, index) {
                        out.push((k * sign * ratio, var));
                    }
                }
            }
            (DrivenValue::Scalar(k), _, Some(prop)) => {
                if k != 0.0 {
                    if let Some(var) = binder.prop(prop) {
                        out.push((k * scale, var));
                    }
                }
            }
            _ => log::debug!("driven record without a usable source skipped"),
        }
        out
    }

    /// Piecewise term. Knot x values stay in DAZ input units by folding the
    /// input conversion into the dot weights; y values take the output scale.
    fn curve(&self, expr: &DrivenExpr, out_scale: f64, binder: &mut Binder) -> Option<DriverExpr> {
        let curve = expr.spline.as_ref()?;
        let points: Vec<(f64, f64)> = curve
            .points
            .iter()
            .map(|&(x, y)| (x, y * out_scale))
            .collect();
        if points.iter().all(|p| fmt_num(p.1) == "0") {
            return None;
        }
        let dot = self.weights(expr, 1.0, binder);
        if dot.is_empty() {
            return None;
        }
        Some(DriverExpr::Piecewise {
            input: Box::new(DriverExpr::Dot(dot)),
            points,
            stepped: curve.stepped,
        })
    }

    /// Stage factor body (clamped by the caller). Factors are unitless morph
    /// values, so no output scaling applies.
    fn factor(&self, stage: &DrivenExpr, binder: &mut Binder) -> Option<DriverExpr> {
        if stage.spline.is_some() {
            return self.curve(stage, 1.0, binder);
        }
        let dot: Vec<(f64, String)> = self
            .weights(stage, 1.0, binder)
            .into_iter()
            .filter(|(w, _)| fmt_num(*w) != "0")
            .collect();
        (!dot.is_empty()).then_some(DriverExpr::Dot(dot))
    }
}

/// Coefficient in thousandths, truncated toward zero. The nudge keeps values
/// like 0.57 from landing on 569 through float error.
fn to_milli(coeff: f64) -> i64 {
    let scaled = coeff * COEFF_SCALE as f64;
    (scaled + scaled.signum() * 1e-6).trunc() as i64
}
