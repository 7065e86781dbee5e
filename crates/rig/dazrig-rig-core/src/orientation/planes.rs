//! Reference plane normals computed once per figure from bone head/tail points.

use hashbrown::HashMap;
use nalgebra::Vector3;

use super::tables::{plane_defs, BoneEnd, PlaneDef, PlanePoint};
use super::BoneGeometry;

const MIN_NORMAL: f64 = 1e-6;

/// Plane normals available for one figure, keyed by plane name.
#[derive(Clone, Debug, Default)]
pub struct FigurePlanes {
    normals: HashMap<String, Vector3<f64>>,
}

impl FigurePlanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every compiled-in plane whose defining bones exist in `bones`.
    /// Missing bones or colinear points leave the plane unset.
    pub fn compute(bones: &HashMap<String, BoneGeometry>) -> Self {
        let mut planes = Self::new();
        for def in plane_defs() {
            match plane_normal(def, bones) {
                Some(n) => {
                    planes.normals.insert(def.name.clone(), n);
                }
                None => log::trace!("plane {} unavailable for this figure", def.name),
            }
        }
        planes
    }

    pub fn insert(&mut self, name: impl Into<String>, normal: Vector3<f64>) {
        self.normals.insert(name.into(), normal);
    }

    pub fn normal(&self, name: &str) -> Option<&Vector3<f64>> {
        self.normals.get(name)
    }

    pub fn len(&self) -> usize {
        self.normals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normals.is_empty()
    }
}

fn plane_point(
    def_point: &PlanePoint,
    bones: &HashMap<String, BoneGeometry>,
) -> Option<Vector3<f64>> {
    let geometry = def_point.bones.iter().find_map(|b| bones.get(b))?;
    Some(match def_point.end {
        BoneEnd::Head => geometry.head,
        BoneEnd::Tail => geometry.tail,
    })
}

/// Unit normal `(p1 - p0) × (p2 - p1)` of a plane definition.
pub fn plane_normal(
    def: &PlaneDef,
    bones: &HashMap<String, BoneGeometry>,
) -> Option<Vector3<f64>> {
    let p0 = plane_point(&def.points[0], bones)?;
    let p1 = plane_point(&def.points[1], bones)?;
    let p2 = plane_point(&def.points[2], bones)?;
    let n = (p1 - p0).cross(&(p2 - p1));
    let len = n.norm();
    if len < MIN_NORMAL {
        return None;
    }
    Some(n / len)
}
