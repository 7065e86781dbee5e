//! Formula evaluation: DSON stack programs folded into driven expressions.
//!
//! Every formula is reduced symbolically by [`stack::run_program`], then routed
//! by its stage into an [`ExprTable`] keyed by output channel. `mult`-stage
//! formulas pull in the referenced morph's own formulas recursively so a
//! corrective can be expressed as a product of clamped factors.

use dazrig_api_core::{Asset, AssetGraph, Channel, ChannelPath, FigureSpec, FormulaSpec, Stage};
use hashbrown::HashMap;

use crate::config::BuildContext;
use crate::error::BuildError;

pub mod driven;
pub mod stack;

pub use driven::{
    multiply_stages, ChannelExprs, DrivenExpr, DrivenValue, DrivingSource, ExprTable, PoseSample,
    SplineCurve,
};
use stack::{run_program, StackError, StackItem};

/// Evaluates formulas in the context of one figure.
pub struct FormulaEvaluator<'a> {
    ctx: &'a BuildContext,
    graph: &'a AssetGraph,
    figure: &'a FigureSpec,
    /// Morph id → its evaluated value channel; `None` when it has no formulas
    resolved: HashMap<String, Option<ChannelExprs>>,
    visiting: Vec<String>,
}

impl<'a> FormulaEvaluator<'a> {
    pub fn new(ctx: &'a BuildContext, graph: &'a AssetGraph, figure: &'a FigureSpec) -> Self {
        Self {
            ctx,
            graph,
            figure,
            resolved: HashMap::new(),
            visiting: Vec::new(),
        }
    }

    pub fn evaluate_all<'f>(
        &mut self,
        formulas: impl IntoIterator<Item = &'f FormulaSpec>,
    ) -> Result<ExprTable, BuildError> {
        let mut table = ExprTable::new();
        for formula in formulas {
            self.evaluate_into(formula, &mut table)?;
        }
        Ok(table)
    }

    /// Fold one formula into `table`. Unresolvable or unsupported formulas are
    /// logged and skipped; malformed programs are errors.
    pub fn evaluate_into(
        &mut self,
        formula: &FormulaSpec,
        table: &mut ExprTable,
    ) -> Result<(), BuildError> {
        let mut output = formula.output.clone();
        output.file.clear();
        let key = output.key();

        if !output.channel.is_drivable() {
            self.skip(format_args!("{key}: channel is not drivable"));
            return Ok(());
        }
        if !self.output_resolves(&output) {
            self.skip(format_args!("{key}: output entity not found"));
            return Ok(());
        }

        let item = match run_program(&formula.operations) {
            Ok(item) => item,
            Err(StackError::Malformed(reason)) => {
                return Err(BuildError::MalformedFormula { output: key, reason })
            }
            Err(StackError::UnknownOp(op)) => {
                return Err(BuildError::UnknownOperation { output: key, op })
            }
            Err(StackError::Unsupported(what)) => {
                self.skip(format_args!("{key}: unsupported formula, {what}"));
                return Ok(());
            }
        };

        match formula.stage {
            Stage::Mult => {
                if let Some(factor) = self.stage_factor(&key, item)? {
                    table.fold_stage(&output, factor);
                }
            }
            Stage::Sum => match item {
                StackItem::Channel { path, coeff } => match self.source(&path) {
                    Some(src) => table.fold_linear(&output, &src, path.component.index(), coeff),
                    None => self.skip(format_args!("{key}: input {} not found", path.key())),
                },
                StackItem::Spline { input, curve } => match self.source(&input) {
                    Some(src) => {
                        let expr = DrivenExpr::from_source(&src, input.component.index(), 1.0);
                        table.fold_spline(&output, expr.with_spline(curve));
                    }
                    None => self.skip(format_args!("{key}: input {} not found", input.key())),
                },
                StackItem::Const(v) => {
                    log::debug!("{key}: constant formula ({v}) has nothing to drive");
                }
                StackItem::Knot(_) => {
                    return Err(BuildError::MalformedFormula {
                        output: key,
                        reason: "formula reduces to a bare spline knot".into(),
                    })
                }
            },
        }
        Ok(())
    }

    fn skip(&self, message: std::fmt::Arguments<'_>) {
        log::log!(self.ctx.skip_level(), "{message}");
    }

    fn output_resolves(&self, output: &ChannelPath) -> bool {
        match self.graph.resolve(self.figure, &output.entity) {
            Some(Asset::Bone { .. }) => output.channel.is_transform(),
            Some(Asset::Morph(_)) => output.channel == Channel::Value,
            _ => false,
        }
    }

    /// Driving source for an input reference, if it names something a driver
    /// variable can read.
    fn source(&self, path: &ChannelPath) -> Option<DrivingSource> {
        match self.graph.resolve(self.figure, &path.entity)? {
            Asset::Bone { bone, .. } if path.channel.is_transform() => Some(DrivingSource::Bone {
                name: bone.name.clone(),
                channel: path.channel,
            }),
            Asset::Morph(morph) if path.channel == Channel::Value => {
                Some(DrivingSource::Prop(morph.id.clone()))
            }
            _ => None,
        }
    }

    fn stage_factor(&mut self, key: &str, item: StackItem) -> Result<Option<DrivenExpr>, BuildError> {
        match item {
            StackItem::Channel { path, coeff } => match self.source(&path) {
                Some(DrivingSource::Prop(id)) => {
                    let factor = match self.morph_exprs(&id)?.and_then(|e| e.collapse()) {
                        Some(expr) => scale_expr(expr, coeff),
                        None => DrivenExpr::prop(id, coeff),
                    };
                    Ok(Some(factor))
                }
                Some(src) => Ok(Some(DrivenExpr::from_source(
                    &src,
                    path.component.index(),
                    coeff,
                ))),
                None => {
                    self.skip(format_args!("{key}: stage input {} not found", path.key()));
                    Ok(None)
                }
            },
            StackItem::Spline { input, curve } => match self.source(&input) {
                Some(src) => Ok(Some(
                    DrivenExpr::from_source(&src, input.component.index(), 1.0).with_spline(curve),
                )),
                None => {
                    self.skip(format_args!("{key}: stage input {} not found", input.key()));
                    Ok(None)
                }
            },
            StackItem::Const(v) => {
                log::debug!("{key}: constant stage factor ({v}) ignored");
                Ok(None)
            }
            StackItem::Knot(_) => Err(BuildError::MalformedFormula {
                output: key.to_string(),
                reason: "stage reduces to a bare spline knot".into(),
            }),
        }
    }

    /// Evaluate a morph's own value formulas, memoised. Re-entering a morph that
    /// is still being evaluated is a cycle.
    fn morph_exprs(&mut self, id: &str) -> Result<Option<ChannelExprs>, BuildError> {
        if let Some(done) = self.resolved.get(id) {
            return Ok(done.clone());
        }
        if let Some(pos) = self.visiting.iter().position(|v| v == id) {
            let mut chain = self.visiting[pos..].to_vec();
            chain.push(id.to_string());
            return Err(BuildError::CyclicFormulaGraph { chain });
        }

        self.visiting.push(id.to_string());
        let graph = self.graph;
        let mut table = ExprTable::new();
        let result = graph
            .formulas_for_output(id)
            .filter(|f| f.output.channel == Channel::Value)
            .try_for_each(|f| self.evaluate_into(f, &mut table));
        self.visiting.pop();
        result?;

        let exprs = table.get(&ChannelPath::value_of(id)).cloned();
        self.resolved.insert(id.to_string(), exprs.clone());
        Ok(exprs)
    }
}

/// `coeff * expr`. A curve scales its y values; a product scales its first
/// factor.
fn scale_expr(mut expr: DrivenExpr, coeff: f64) -> DrivenExpr {
    if coeff == 1.0 {
        return expr;
    }
    if !expr.stages.is_empty() {
        let mut stages = std::mem::take(&mut expr.stages);
        let first = stages.remove(0);
        stages.insert(0, scale_expr(first, coeff));
        return multiply_stages(stages).unwrap_or(expr);
    }
    match expr.spline.take() {
        Some(curve) => expr.spline = Some(curve.scaled(coeff)),
        None => expr.value = expr.value.scaled(coeff),
    }
    expr
}
