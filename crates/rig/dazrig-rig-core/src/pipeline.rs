//! Figure build orchestration: edit pass (bones, rolls, DAZ metadata), then
//! pose pass (rotation modes, locks, drivers).

use dazrig_api_core::{AssetGraph, ChannelLocks, Component, FigureSpec, Value};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::config::BuildContext;
use crate::coords::{daz_axis_to_engine, daz_rotation_order_to_engine, daz_to_engine};
use crate::driver::{DriverSynthesizer, DriverTarget, SynthesisError};
use crate::error::{BuildError, DriverErrorLog, DriverIssueKind};
use crate::formula::FormulaEvaluator;
use crate::host::{BoneRest, EngineLocks, RigHost, RigMode};
use crate::orientation::{BoneGeometry, BoneOrientationSolver, FigurePlanes, RollSource};
use crate::topo::bone_order;

/// Counts for one built figure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureReport {
    pub figure: String,
    pub bones: usize,
    pub plane_rolls: usize,
    pub table_rolls: usize,
    pub default_rolls: usize,
    pub drivers: usize,
    pub truncated: usize,
    /// All-zero or zero-factor drivers that were not created
    pub elided: usize,
    /// Outputs whose target or driving bones were missing on the host
    pub skipped: usize,
    /// Drivers dropped for lack of variable names
    pub abandoned: usize,
}

/// Result of [`RigBuildPipeline::build_scene`]: one host per figure.
#[derive(Debug)]
pub struct SceneBuild<H> {
    pub rigs: Vec<H>,
    pub figures: Vec<FigureReport>,
    pub issues: DriverErrorLog,
}

pub struct RigBuildPipeline<'a> {
    ctx: &'a BuildContext,
    graph: &'a AssetGraph,
}

impl<'a> RigBuildPipeline<'a> {
    pub fn new(ctx: &'a BuildContext, graph: &'a AssetGraph) -> Self {
        Self { ctx, graph }
    }

    /// Build every figure into a fresh host from `make_host`. Driver issues are
    /// collected across figures and logged once, also when a figure fails.
    pub fn build_scene<H, F>(&self, mut make_host: F) -> Result<SceneBuild<H>, BuildError>
    where
        H: RigHost,
        F: FnMut(&FigureSpec) -> H,
    {
        let mut issues = DriverErrorLog::new();
        let mut rigs = Vec::new();
        let mut figures = Vec::new();
        for (index, figure) in self.graph.figures().iter().enumerate() {
            let mut host = make_host(figure);
            match self.build_figure(index, &mut host, &mut issues) {
                Ok(report) => {
                    figures.push(report);
                    rigs.push(host);
                }
                Err(e) => {
                    issues.log_report();
                    return Err(e);
                }
            }
        }
        issues.log_report();
        Ok(SceneBuild {
            rigs,
            figures,
            issues,
        })
    }

    pub fn build_figure<H: RigHost + ?Sized>(
        &self,
        index: usize,
        host: &mut H,
        issues: &mut DriverErrorLog,
    ) -> Result<FigureReport, BuildError> {
        let figure = self
            .graph
            .figures()
            .get(index)
            .ok_or(BuildError::UnknownFigure(index))?;
        let ctx = self.ctx;
        let generation = ctx.generation_for(&figure.name, figure.rig.as_deref());
        log::debug!("building {} ({generation:?})", figure.name);

        let order = bone_order(&figure.bones).map_err(|bones| BuildError::BoneHierarchyCycle {
            figure: figure.name.clone(),
            bones,
        })?;
        let geometry: HashMap<String, BoneGeometry> = figure
            .bones
            .iter()
            .map(|b| {
                let g = BoneGeometry::new(
                    daz_to_engine(b.center_point, ctx),
                    daz_to_engine(b.end_point, ctx),
                );
                (b.name.clone(), g)
            })
            .collect();
        let planes = FigurePlanes::compute(&geometry);
        let solver = BoneOrientationSolver::new(ctx, generation, &planes);

        let mut report = FigureReport {
            figure: figure.name.clone(),
            ..Default::default()
        };

        host.set_mode(RigMode::Edit)?;
        for &i in &order {
            let bone = &figure.bones[i];
            let Some(&g) = geometry.get(&bone.name) else {
                continue;
            };
            let solved = solver.solve(&bone.name, g);
            match solved.source {
                RollSource::Plane(_) => report.plane_rolls += 1,
                RollSource::Table => report.table_rolls += 1,
                RollSource::Default => report.default_rolls += 1,
            }
            let parent = bone.parent.clone().filter(|p| host.has_bone(p));
            host.add_bone(BoneRest {
                name: bone.name.clone(),
                parent,
                head: solved.head,
                tail: solved.tail,
                roll: solved.roll,
                matrix: solved.matrix,
            })?;
            host.set_bone_property(&bone.name, "DazHead", Value::from(bone.center_point))?;
            host.set_bone_property(&bone.name, "DazTail", Value::from(bone.end_point))?;
            host.set_bone_property(&bone.name, "DazOrient", Value::from(bone.orientation))?;
            host.set_bone_property(&bone.name, "DazAngle", Value::f(solved.roll))?;
            host.set_bone_property(
                &bone.name,
                "DazRotMode",
                Value::from(bone.rotation_order.as_str()),
            )?;
            report.bones += 1;
        }

        host.set_mode(RigMode::Pose)?;
        for &i in &order {
            let bone = &figure.bones[i];
            let mode = daz_rotation_order_to_engine(&bone.rotation_order, ctx);
            host.set_rotation_mode(&bone.name, &mode)?;
            host.set_locks(&bone.name, self.engine_locks(&bone.locks))?;
        }

        if ctx.create_drivers {
            self.build_drivers(index, figure, host, issues, &mut report)?;
        }
        host.set_mode(RigMode::Object)?;

        log::debug!(
            "{}: {} bones ({} plane, {} table rolls), {} drivers",
            report.figure,
            report.bones,
            report.plane_rolls,
            report.table_rolls,
            report.drivers
        );
        Ok(report)
    }

    fn engine_locks(&self, locks: &ChannelLocks) -> EngineLocks {
        let mut out = EngineLocks::default();
        for comp in [Component::X, Component::Y, Component::Z] {
            let (index, _) = daz_axis_to_engine(comp, self.ctx);
            out.rotation[index] = locks.rotation[comp.index()];
            out.location[index] = locks.translation[comp.index()];
        }
        out
    }

    fn build_drivers<H: RigHost + ?Sized>(
        &self,
        index: usize,
        figure: &FigureSpec,
        host: &mut H,
        issues: &mut DriverErrorLog,
        report: &mut FigureReport,
    ) -> Result<(), BuildError> {
        let ctx = self.ctx;
        let mut evaluator = FormulaEvaluator::new(ctx, self.graph, figure);
        let table = evaluator.evaluate_all(self.graph.formulas_for_figure(index))?;
        let synth = DriverSynthesizer::new(ctx);

        for (output, exprs) in table.iter() {
            let key = output.key();
            let Some(target) = synth.target(output) else {
                log::log!(ctx.skip_level(), "{key}: no engine target");
                report.skipped += 1;
                continue;
            };
            let target_present = match &target {
                DriverTarget::BoneChannel { bone, .. } => host.has_bone(bone),
                DriverTarget::ShapeKey { name } => host.has_shape_key(name),
            };
            if !target_present {
                log::log!(ctx.skip_level(), "{key}: target {target} missing on host");
                report.skipped += 1;
                continue;
            }
            if let Some(bone) = exprs.driving_bones().into_iter().find(|b| !host.has_bone(b)) {
                log::log!(ctx.skip_level(), "{key}: driving bone {bone} missing on host");
                report.skipped += 1;
                continue;
            }

            let existing = host.existing_driver(&target);
            match synth.synthesize(output, exprs, existing.as_ref()) {
                Ok(Some(spec)) => {
                    let emitted = spec.emit(ctx.expression_budget);
                    if emitted.truncated {
                        issues.record(
                            key.as_str(),
                            DriverIssueKind::ExpressionOverflow,
                            spec.props.iter().map(String::as_str),
                            spec.bones.iter().map(String::as_str),
                        );
                        report.truncated += 1;
                    }
                    host.add_driver(emitted)?;
                    report.drivers += 1;
                }
                Ok(None) => report.elided += 1,
                Err(SynthesisError::VariablesExhausted { props, bones }) => {
                    issues.record(
                        key.as_str(),
                        DriverIssueKind::VariablesExhausted,
                        props.iter().map(String::as_str),
                        bones.iter().map(String::as_str),
                    );
                    report.abandoned += 1;
                }
            }
        }
        Ok(())
    }
}
