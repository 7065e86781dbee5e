//! dazrig-rig-core: DAZ figure rig reconstruction.
//!
//! Rebuilds bone rest orientation and roll from DAZ bone metadata, evaluates
//! DSON formula programs into driven expressions, and synthesizes host
//! drivers from them. The host application is reached only through
//! [`host::RigHost`].

pub mod config;
pub mod coords;
pub mod driver;
pub mod error;
pub mod formula;
pub mod host;
pub mod orientation;
pub mod pipeline;
pub mod topo;

pub use config::{BuildContext, RigGeneration};
pub use driver::{
    DriverExpr, DriverSpec, DriverSynthesizer, DriverTarget, DriverVariable, EmittedDriver,
    EngineChannel, ExistingDriver, SynthesisError, VariableSource,
};
pub use error::{BuildError, DriverErrorLog, DriverIssue, DriverIssueKind};
pub use formula::{
    ChannelExprs, DrivenExpr, DrivenValue, ExprTable, FormulaEvaluator, PoseSample, SplineCurve,
};
pub use host::{BoneRest, EngineLocks, HostError, InMemoryRig, RigHost, RigMode};
pub use orientation::{BoneGeometry, BoneOrientation, BoneOrientationSolver, RollSource};
pub use pipeline::{FigureReport, RigBuildPipeline, SceneBuild};
