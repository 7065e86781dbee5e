//! dazrig-api-core: channel paths, values and the parsed DAZ asset model.

pub mod asset;
pub mod channel_path;
pub mod json;
pub mod value;

pub use asset::{
    Asset, AssetGraph, BoneSpec, ChannelLocks, FigureSpec, FormulaOwner, FormulaSpec, MorphSpec,
    NodeSpec, Operand, Operation, SceneFile, Stage,
};
pub use channel_path::{Channel, ChannelPath, ChannelPathError, Component};
pub use json::{load_scene_bytes, load_scene_file, parse_scene, JsonError};
pub use value::{Value, ValueKind};
