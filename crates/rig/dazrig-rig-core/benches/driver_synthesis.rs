use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dazrig_api_core::{AssetGraph, Channel, ChannelPath};
use dazrig_rig_core::formula::multiply_stages;
use dazrig_rig_core::{
    BuildContext, ChannelExprs, DrivenExpr, DriverSynthesizer, InMemoryRig, RigBuildPipeline,
    SplineCurve,
};

fn wide_sum(n: usize) -> ChannelExprs {
    let mut exprs = ChannelExprs::default();
    for i in 0..n {
        exprs
            .sum
            .push(DrivenExpr::prop(format!("pCTRL{i}"), 0.25 + i as f64 * 0.37));
    }
    exprs
        .sum
        .push(DrivenExpr::bone("lShldrBend", Channel::Rotation, [0.5, 0.0, -0.25]));
    exprs
}

fn corrective() -> ChannelExprs {
    let curve = SplineCurve::new(vec![(0.0, 0.0), (45.0, 0.4), (135.0, 1.0)], false);
    ChannelExprs {
        sum: Vec::new(),
        product: multiply_stages(vec![
            DrivenExpr::bone("lForearmBend", Channel::Rotation, [0.0, 0.0, 1.0]).with_spline(curve),
            DrivenExpr::prop("pCTRLFist", 1.0),
        ]),
    }
}

fn bench_synthesis(c: &mut Criterion) {
    let ctx = BuildContext::default();
    let synth = DriverSynthesizer::new(&ctx);
    let output = ChannelPath::value_of("pJCMCorrective");

    let mut group = c.benchmark_group("synthesize_and_emit");
    for n in [4usize, 16, 48] {
        let exprs = wide_sum(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &exprs, |b, exprs| {
            b.iter(|| {
                let spec = synth
                    .synthesize(&output, black_box(exprs), None)
                    .expect("variables")
                    .expect("driver");
                black_box(spec.emit(ctx.expression_budget))
            })
        });
    }
    group.finish();

    let exprs = corrective();
    c.bench_function("stage_product", |b| {
        b.iter(|| {
            let spec = synth
                .synthesize(&output, black_box(&exprs), None)
                .expect("variables")
                .expect("driver");
            black_box(spec.emit(ctx.expression_budget))
        })
    });
}

fn bench_scene(c: &mut Criterion) {
    let text = dazrig_test_fixtures::scenes::json("arm_rig").expect("fixture");
    let graph = AssetGraph::new(dazrig_api_core::parse_scene(&text).expect("scene"));
    let ctx = BuildContext::default();
    c.bench_function("build_arm_rig", |b| {
        b.iter(|| {
            RigBuildPipeline::new(&ctx, &graph)
                .build_scene(|_| InMemoryRig::new().with_shape_keys(["pJCMForeArmFwd_L"]))
                .expect("build")
        })
    });
}

criterion_group!(benches, bench_synthesis, bench_scene);
criterion_main!(benches);
