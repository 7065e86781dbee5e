//! The host application seen from the rig builder.
//!
//! [`RigHost`] is the only surface the pipeline writes through. Hosts enforce
//! their own mode protocol: bones are created in [`RigMode::Edit`], rotation
//! modes, locks and drivers are set in [`RigMode::Pose`].

use dazrig_api_core::Value;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::driver::{DriverTarget, EmittedDriver, ExistingDriver};

pub mod memory;

pub use memory::InMemoryRig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RigMode {
    Object,
    Edit,
    Pose,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum HostError {
    #[error("{operation} requires {expected:?} mode, host is in {actual:?} mode")]
    WrongMode {
        operation: String,
        expected: RigMode,
        actual: RigMode,
    },

    #[error("unknown bone '{0}'")]
    UnknownBone(String),

    #[error("bone '{0}' already exists")]
    DuplicateBone(String),

    #[error("host rejected driver on {target}: {reason}")]
    DriverRejected { target: String, reason: String },
}

/// Engine rest pose of one bone.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneRest {
    pub name: String,
    pub parent: Option<String>,
    pub head: Vector3<f64>,
    pub tail: Vector3<f64>,
    /// Radians about head→tail
    pub roll: f64,
    pub matrix: Matrix3<f64>,
}

/// Lock flags in engine axis order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLocks {
    pub rotation: [bool; 3],
    pub location: [bool; 3],
}

pub trait RigHost {
    fn mode(&self) -> RigMode;
    fn set_mode(&mut self, mode: RigMode) -> Result<(), HostError>;

    /// Edit mode only.
    fn add_bone(&mut self, rest: BoneRest) -> Result<(), HostError>;
    fn has_bone(&self, name: &str) -> bool;
    /// Custom property storage; allowed in any mode.
    fn set_bone_property(&mut self, bone: &str, key: &str, value: Value) -> Result<(), HostError>;

    /// Pose mode only.
    fn set_rotation_mode(&mut self, bone: &str, order: &str) -> Result<(), HostError>;
    /// Pose mode only.
    fn set_locks(&mut self, bone: &str, locks: EngineLocks) -> Result<(), HostError>;

    fn has_shape_key(&self, name: &str) -> bool;
    fn existing_driver(&self, target: &DriverTarget) -> Option<ExistingDriver>;
    /// Pose mode only. Replaces any driver already on the target; the new
    /// driver carries every variable its text reads.
    fn add_driver(&mut self, driver: EmittedDriver) -> Result<(), HostError>;
}
