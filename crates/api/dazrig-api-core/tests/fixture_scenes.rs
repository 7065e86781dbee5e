use std::io::Write;

use anyhow::Result;
use dazrig_api_core::{
    load_scene_bytes, load_scene_file, parse_scene, Asset, AssetGraph, Channel, Operation, Stage,
};
use dazrig_test_fixtures::scenes;

#[test]
fn every_fixture_scene_parses() -> Result<()> {
    for name in scenes::keys() {
        let scene = load_scene_file(scenes::path(&name)?)?;
        assert!(!scene.figures.is_empty(), "{name} has no figures");
    }
    Ok(())
}

#[test]
fn arm_rig_resolves_bones_and_modifiers() -> Result<()> {
    let graph = AssetGraph::new(parse_scene(&scenes::json("arm_rig")?)?);
    let figure = &graph.figures()[0];
    assert_eq!(figure.bones.len(), 8);
    assert!(matches!(
        graph.resolve(figure, "lForearmBend"),
        Some(Asset::Bone { .. })
    ));
    assert!(matches!(graph.resolve(figure, "pCTRLFist"), Some(Asset::Morph(_))));
    assert!(graph.resolve(figure, "missingBone").is_none());

    let corr: Vec<_> = graph.formulas_for_output("pJCMElbowCorr").collect();
    assert_eq!(corr.len(), 2);
    assert!(corr.iter().all(|f| f.stage == Stage::Mult));
    assert_eq!(corr[0].output.channel, Channel::Value);

    let spline = graph
        .formulas_for_output("pJCMForeArmFwd_L")
        .next()
        .unwrap();
    assert_eq!(spline.operations.last(), Some(&Operation::SplineTcb));
    assert_eq!(graph.formulas_for_figure(0).count(), 7);
    Ok(())
}

#[test]
fn gzip_fixture_matches_plain_json() -> Result<()> {
    let plain = scenes::bytes("arm_rig")?;
    let mut encoder = libflate::gzip::Encoder::new(Vec::new())?;
    encoder.write_all(&plain)?;
    let packed = encoder.finish().into_result()?;
    assert_eq!(load_scene_bytes(&packed)?, load_scene_bytes(&plain)?);
    Ok(())
}
