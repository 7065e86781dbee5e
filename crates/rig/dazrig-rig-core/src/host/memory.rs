//! Headless [`RigHost`] that records everything it is told.

use dazrig_api_core::Value;
use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use super::{BoneRest, EngineLocks, HostError, RigHost, RigMode};
use crate::driver::{DriverTarget, EmittedDriver, ExistingDriver};

#[derive(Debug, Clone, PartialEq)]
pub struct BoneRecord {
    pub rest: BoneRest,
    pub properties: HashMap<String, Value>,
    pub rotation_mode: Option<String>,
    pub locks: EngineLocks,
}

/// In-memory armature, shape-key set and driver table.
#[derive(Debug, Clone)]
pub struct InMemoryRig {
    mode: RigMode,
    bones: IndexMap<String, BoneRecord>,
    shape_keys: HashSet<String>,
    drivers: IndexMap<DriverTarget, EmittedDriver>,
    /// Every mode switch, in order
    mode_history: Vec<RigMode>,
}

impl Default for InMemoryRig {
    fn default() -> Self {
        Self {
            mode: RigMode::Object,
            bones: IndexMap::new(),
            shape_keys: HashSet::new(),
            drivers: IndexMap::new(),
            mode_history: Vec::new(),
        }
    }
}

impl InMemoryRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape_keys<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shape_keys.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn bone(&self, name: &str) -> Option<&BoneRecord> {
        self.bones.get(name)
    }

    /// Bones in creation order.
    pub fn bones(&self) -> impl Iterator<Item = &BoneRecord> {
        self.bones.values()
    }

    pub fn driver(&self, target: &DriverTarget) -> Option<&EmittedDriver> {
        self.drivers.get(target)
    }

    pub fn drivers(&self) -> impl Iterator<Item = &EmittedDriver> {
        self.drivers.values()
    }

    pub fn mode_history(&self) -> &[RigMode] {
        &self.mode_history
    }

    fn require(&self, operation: &str, expected: RigMode) -> Result<(), HostError> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(HostError::WrongMode {
                operation: operation.to_string(),
                expected,
                actual: self.mode,
            })
        }
    }

    fn bone_mut(&mut self, name: &str) -> Result<&mut BoneRecord, HostError> {
        self.bones
            .get_mut(name)
            .ok_or_else(|| HostError::UnknownBone(name.to_string()))
    }
}

impl RigHost for InMemoryRig {
    fn mode(&self) -> RigMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RigMode) -> Result<(), HostError> {
        self.mode = mode;
        self.mode_history.push(mode);
        Ok(())
    }

    fn add_bone(&mut self, rest: BoneRest) -> Result<(), HostError> {
        self.require("add_bone", RigMode::Edit)?;
        if self.bones.contains_key(&rest.name) {
            return Err(HostError::DuplicateBone(rest.name));
        }
        if let Some(parent) = &rest.parent {
            if !self.bones.contains_key(parent) {
                return Err(HostError::UnknownBone(parent.clone()));
            }
        }
        self.bones.insert(
            rest.name.clone(),
            BoneRecord {
                rest,
                properties: HashMap::new(),
                rotation_mode: None,
                locks: EngineLocks::default(),
            },
        );
        Ok(())
    }

    fn has_bone(&self, name: &str) -> bool {
        self.bones.contains_key(name)
    }

    fn set_bone_property(&mut self, bone: &str, key: &str, value: Value) -> Result<(), HostError> {
        self.bone_mut(bone)?.properties.insert(key.to_string(), value);
        Ok(())
    }

    fn set_rotation_mode(&mut self, bone: &str, order: &str) -> Result<(), HostError> {
        self.require("set_rotation_mode", RigMode::Pose)?;
        self.bone_mut(bone)?.rotation_mode = Some(order.to_string());
        Ok(())
    }

    fn set_locks(&mut self, bone: &str, locks: EngineLocks) -> Result<(), HostError> {
        self.require("set_locks", RigMode::Pose)?;
        self.bone_mut(bone)?.locks = locks;
        Ok(())
    }

    fn has_shape_key(&self, name: &str) -> bool {
        self.shape_keys.contains(name)
    }

    fn existing_driver(&self, target: &DriverTarget) -> Option<ExistingDriver> {
        self.drivers.get(target).map(|d| ExistingDriver {
            expression: d.text.clone(),
            variables: d.variables.clone(),
        })
    }

    fn add_driver(&mut self, driver: EmittedDriver) -> Result<(), HostError> {
        self.require("add_driver", RigMode::Pose)?;
        match &driver.target {
            DriverTarget::BoneChannel { bone, .. } if !self.bones.contains_key(bone) => {
                return Err(HostError::UnknownBone(bone.clone()))
            }
            DriverTarget::ShapeKey { name } if !self.shape_keys.contains(name) => {
                return Err(HostError::DriverRejected {
                    target: driver.target.to_string(),
                    reason: format!("no shape key '{name}'"),
                })
            }
            _ => {}
        }
        self.drivers.insert(driver.target.clone(), driver);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverVariable, EngineChannel, VariableSource};
    use nalgebra::{Matrix3, Vector3};

    fn rest(name: &str, parent: Option<&str>) -> BoneRest {
        BoneRest {
            name: name.into(),
            parent: parent.map(str::to_string),
            head: Vector3::zeros(),
            tail: Vector3::z(),
            roll: 0.0,
            matrix: Matrix3::identity(),
        }
    }

    #[test]
    fn bones_need_edit_mode() {
        let mut rig = InMemoryRig::new();
        let err = rig.add_bone(rest("hip", None)).unwrap_err();
        assert!(matches!(err, HostError::WrongMode { expected: RigMode::Edit, .. }));
        rig.set_mode(RigMode::Edit).unwrap();
        rig.add_bone(rest("hip", None)).unwrap();
        rig.add_bone(rest("pelvis", Some("hip"))).unwrap();
        assert_eq!(
            rig.add_bone(rest("hip", None)).unwrap_err(),
            HostError::DuplicateBone("hip".into())
        );
        assert!(rig.set_rotation_mode("hip", "XZY").is_err());
    }

    #[test]
    fn drivers_need_pose_mode_and_target() {
        let mut rig = InMemoryRig::new().with_shape_keys(["pSmile"]);
        rig.set_mode(RigMode::Edit).unwrap();
        rig.add_bone(rest("hip", None)).unwrap();
        let driver = EmittedDriver {
            target: DriverTarget::BoneChannel {
                bone: "hip".into(),
                channel: EngineChannel::Rotation,
                index: 0,
            },
            text: "A".into(),
            variables: vec![],
            truncated: false,
        };
        assert!(rig.add_driver(driver.clone()).is_err());
        rig.set_mode(RigMode::Pose).unwrap();
        rig.add_driver(driver.clone()).unwrap();
        assert_eq!(rig.existing_driver(&driver.target).unwrap().expression, "A");

        let missing = EmittedDriver {
            target: DriverTarget::ShapeKey { name: "pFrown".into() },
            ..driver
        };
        assert!(matches!(
            rig.add_driver(missing),
            Err(HostError::DriverRejected { .. })
        ));
        assert_eq!(rig.mode_history(), &[RigMode::Edit, RigMode::Pose]);
    }

    #[test]
    fn add_driver_replaces_text_and_variables() {
        let mut rig = InMemoryRig::new().with_shape_keys(["pSmile"]);
        rig.set_mode(RigMode::Pose).unwrap();
        let target = DriverTarget::ShapeKey { name: "pSmile".into() };
        let var = DriverVariable {
            name: "D".into(),
            source: VariableSource::Property { name: "pGrin".into() },
        };
        rig.add_driver(EmittedDriver {
            target: target.clone(),
            text: "D".into(),
            variables: vec![var.clone()],
            truncated: false,
        })
        .unwrap();
        assert_eq!(rig.existing_driver(&target).unwrap().variables, vec![var]);

        rig.add_driver(EmittedDriver {
            target: target.clone(),
            text: "0.5".into(),
            variables: vec![],
            truncated: false,
        })
        .unwrap();
        let now = rig.existing_driver(&target).unwrap();
        assert_eq!(now.expression, "0.5");
        assert!(now.variables.is_empty());
    }
}
