use std::f64::consts::FRAC_PI_2;

use anyhow::Result;
use approx::assert_relative_eq;
use dazrig_api_core::{load_scene_file, AssetGraph, ChannelPath, Value};
use dazrig_rig_core::{
    BuildContext, BuildError, DriverIssueKind, DriverTarget, EngineChannel, InMemoryRig,
    RigBuildPipeline, RigMode, SceneBuild, VariableSource,
};
use dazrig_test_fixtures::{contexts, scenes};

const ARM_SHAPE_KEYS: [&str; 2] = ["pJCMForeArmFwd_L", "pJCMElbowCorr"];

fn graph(name: &str) -> Result<AssetGraph> {
    Ok(AssetGraph::new(load_scene_file(scenes::path(name)?)?))
}

fn build(ctx: &BuildContext, graph: &AssetGraph) -> Result<SceneBuild<InMemoryRig>, BuildError> {
    RigBuildPipeline::new(ctx, graph)
        .build_scene(|_| InMemoryRig::new().with_shape_keys(ARM_SHAPE_KEYS))
}

fn bone_target(bone: &str, index: usize) -> DriverTarget {
    DriverTarget::BoneChannel {
        bone: bone.into(),
        channel: EngineChannel::Rotation,
        index,
    }
}

#[test]
fn arm_rig_builds_bones_and_drivers() -> Result<()> {
    let ctx: BuildContext = contexts::load("default")?;
    let graph = graph("arm_rig")?;
    let built = build(&ctx, &graph)?;
    assert_eq!(built.rigs.len(), 1);
    let report = &built.figures[0];
    assert_eq!(report.figure, "Genesis8Female");
    assert_eq!(report.bones, 8);
    assert_eq!(report.plane_rolls, 4);
    assert_eq!(report.table_rolls, 2);
    assert_eq!(report.default_rolls, 2);
    assert_eq!(report.drivers, 4);
    assert_eq!(report.truncated, 0);
    assert_eq!(report.skipped, 0);
    assert!(built.issues.is_empty());

    let rig = &built.rigs[0];
    let names: Vec<&str> = rig.bones().map(|b| b.rest.name.as_str()).collect();
    assert_eq!(names[0], "hip");
    let hand = rig.bone("lHand").unwrap();
    assert_eq!(hand.rest.parent.as_deref(), Some("lForearmBend"));
    assert_relative_eq!(hand.rest.head.x, 6.5, epsilon = 1e-9);
    assert_relative_eq!(hand.rest.head.z, 14.5, epsilon = 1e-9);
    assert_relative_eq!(hand.rest.roll, FRAC_PI_2, epsilon = 1e-9);
    assert_eq!(hand.properties.get("DazOrient"), Some(&Value::vec3(0.0, 0.0, -3.0)));
    assert_relative_eq!(
        hand.properties.get("DazAngle").and_then(Value::as_float).unwrap(),
        FRAC_PI_2,
        epsilon = 1e-9
    );

    let forearm = rig.bone("lForearmBend").unwrap();
    assert_eq!(forearm.locks.rotation, [true, false, false]);
    assert!(forearm.rotation_mode.is_some());

    let coupling = rig.driver(&bone_target("lForearmBend", 2)).unwrap();
    assert_eq!(coupling.text, "(500*C)/1000");
    assert_eq!(
        coupling.variables[0].source,
        VariableSource::BoneChannel {
            bone: "lShldrBend".into(),
            channel: EngineChannel::Rotation,
            index: 2
        }
    );

    let fist = rig.driver(&bone_target("lHand", 1)).unwrap();
    assert_eq!(fist.text, "(-349*D)/1000");

    let jcm = rig
        .driver(&DriverTarget::ShapeKey {
            name: "pJCMForeArmFwd_L".into(),
        })
        .unwrap();
    assert!(jcm.text.contains("-57.2958*B"), "{}", jcm.text);

    let corr = rig
        .driver(&DriverTarget::ShapeKey {
            name: "pJCMElbowCorr".into(),
        })
        .unwrap();
    assert!(corr.text.starts_with("min(1,max(0,"), "{}", corr.text);
    assert!(corr.text.ends_with("*min(1,max(0,D))"), "{}", corr.text);
    assert!(corr.variables.iter().any(|v| v.name == "D"
        && v.source
            == VariableSource::Property {
                name: "pCTRLFist".into()
            }));
    assert!(corr.text.len() <= ctx.expression_budget);
    Ok(())
}

#[test]
fn host_modes_follow_edit_pose_object() -> Result<()> {
    let ctx = BuildContext::default();
    let graph = graph("arm_rig")?;
    let built = build(&ctx, &graph)?;
    assert_eq!(
        built.rigs[0].mode_history(),
        &[RigMode::Edit, RigMode::Pose, RigMode::Object]
    );
    Ok(())
}

#[test]
fn context_fixture_changes_units_and_rolls() -> Result<()> {
    let ctx: BuildContext = contexts::load("centimetres_no_planes")?;
    assert!(!ctx.use_planes);
    let graph = graph("arm_rig")?;
    let built = build(&ctx, &graph)?;
    let report = &built.figures[0];
    assert_eq!(report.plane_rolls, 0);
    assert_eq!(report.table_rolls, 6);
    assert_eq!(report.default_rolls, 2);
    let hand = built.rigs[0].bone("lHand").unwrap();
    assert_relative_eq!(hand.rest.head.x, 65.0, epsilon = 1e-9);
    assert_relative_eq!(hand.rest.head.z, 145.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn drivers_can_be_disabled() -> Result<()> {
    let ctx = BuildContext {
        create_drivers: false,
        ..Default::default()
    };
    let graph = graph("arm_rig")?;
    let built = build(&ctx, &graph)?;
    assert_eq!(built.figures[0].drivers, 0);
    assert_eq!(built.rigs[0].drivers().count(), 0);
    Ok(())
}

#[test]
fn missing_shape_keys_skip_their_drivers() -> Result<()> {
    let ctx = BuildContext::default();
    let graph = graph("arm_rig")?;
    let built = RigBuildPipeline::new(&ctx, &graph).build_scene(|_| InMemoryRig::new())?;
    let report = &built.figures[0];
    assert_eq!(report.drivers, 2);
    assert_eq!(report.skipped, 2);
    Ok(())
}

#[test]
fn cyclic_stage_graph_is_an_error() -> Result<()> {
    let graph = graph("cyclic_stages")?;
    match build(&BuildContext::default(), &graph) {
        Err(BuildError::CyclicFormulaGraph { chain }) => {
            assert!(chain.contains(&"pCorrA".to_string()));
            assert!(chain.contains(&"pCorrB".to_string()));
            assert_eq!(chain.first(), chain.last());
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_stack_is_an_error() -> Result<()> {
    let graph = graph("malformed_stack")?;
    match build(&BuildContext::default(), &graph) {
        Err(BuildError::MalformedFormula { output, .. }) => {
            assert_eq!(output, "abdomen?rotation/x")
        }
        other => panic!("expected a malformed formula error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn bone_cycle_is_an_error() -> Result<()> {
    let graph = graph("bone_cycle")?;
    let err = build(&BuildContext::default(), &graph).unwrap_err();
    assert_eq!(
        err,
        BuildError::BoneHierarchyCycle {
            figure: "Loop".into(),
            bones: vec!["a".into(), "b".into()],
        }
    );
    Ok(())
}

#[test]
fn overflow_and_exhaustion_are_reported_per_output() -> Result<()> {
    let ctx = BuildContext::default();
    let graph = graph("driver_limits")?;
    let built = RigBuildPipeline::new(&ctx, &graph)
        .build_scene(|_| InMemoryRig::new().with_shape_keys(["pWide", "pMany"]))?;
    let report = &built.figures[0];
    assert_eq!(report.drivers, 1);
    assert_eq!(report.truncated, 1);
    assert_eq!(report.abandoned, 1);
    assert_eq!(built.issues.len(), 2);

    let wide_key = ChannelPath::value_of("pWide").key();
    let wide = built.issues.get(&wide_key).unwrap();
    assert_eq!(
        wide.kinds.iter().copied().collect::<Vec<_>>(),
        vec![DriverIssueKind::ExpressionOverflow]
    );
    assert_eq!(wide.props.len(), 40);
    assert!(wide.props.contains("pIn01") && wide.props.contains("pIn40"));
    assert!(wide.bones.is_empty());
    let text = &built.rigs[0]
        .driver(&DriverTarget::ShapeKey { name: "pWide".into() })
        .unwrap()
        .text;
    assert!(text.len() <= ctx.expression_budget, "{}", text.len());
    assert!(text.starts_with("(-1234*D-1234*E"), "{text}");

    let many = built.issues.get(&ChannelPath::value_of("pMany").key()).unwrap();
    assert_eq!(
        many.kinds.iter().copied().collect::<Vec<_>>(),
        vec![DriverIssueKind::VariablesExhausted]
    );
    assert_eq!(many.props.len(), 50);
    assert!(built.rigs[0]
        .driver(&DriverTarget::ShapeKey { name: "pMany".into() })
        .is_none());

    let lines = built.issues.report();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l.contains(&wide_key)));
    Ok(())
}
