//! Bone rest orientation and roll reconstruction.
//!
//! DAZ stores no per-bone roll, so the solver rebuilds the twist convention of
//! each limb:
//!
//! - [`planes`] computes per-figure reference plane normals (arm, leg, finger chains).
//! - [`tables`] holds the static roll table and axis-fix membership.
//! - [`BoneOrientationSolver`] picks a plane-derived roll when one is available and
//!   falls back to the table otherwise.
//!
//! Rolls follow the engine convention: the rest matrix is the minimal rotation
//! taking +Y onto the bone direction, followed by a rotation of `roll` about the
//! bone's own Y axis.

use nalgebra::{Matrix3, Rotation3, Unit, UnitQuaternion, Vector3};

use crate::config::{BuildContext, RigGeneration};
use crate::coords::engine_up;

pub mod planes;
pub mod tables;

pub use planes::FigurePlanes;

const EPSILON: f64 = 1e-6;

/// Engine-space head and tail of a bone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneGeometry {
    pub head: Vector3<f64>,
    pub tail: Vector3<f64>,
}

impl BoneGeometry {
    pub fn new(head: Vector3<f64>, tail: Vector3<f64>) -> Self {
        Self { head, tail }
    }

    pub fn length(&self) -> f64 {
        (self.tail - self.head).norm()
    }
}

/// How a bone's roll was decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RollSource {
    Plane(String),
    Table,
    Default,
}

/// Solved rest orientation for one bone.
#[derive(Clone, Debug, PartialEq)]
pub struct BoneOrientation {
    /// Roll about the head→tail axis, radians
    pub roll: f64,
    /// Columns are the bone's local X, Y, Z axes in engine space.
    pub matrix: Matrix3<f64>,
    pub head: Vector3<f64>,
    /// Tail after the degenerate-bone nudge
    pub tail: Vector3<f64>,
    pub source: RollSource,
}

/// Minimal rotation taking +Y onto `dir`.
pub fn alignment_matrix(dir: &Unit<Vector3<f64>>) -> Matrix3<f64> {
    match Rotation3::rotation_between(&Vector3::y(), dir.as_ref()) {
        Some(rot) => rot.into_inner(),
        // dir == -Y: half turn about Z
        None => Matrix3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0),
    }
}

/// Rest matrix for a bone pointing along `dir` with the given roll.
pub fn matrix_from_roll(dir: &Unit<Vector3<f64>>, roll: f64) -> Matrix3<f64> {
    let twist = Rotation3::from_axis_angle(&Vector3::y_axis(), roll);
    alignment_matrix(dir) * twist.matrix()
}

/// Read the roll back out of a rest matrix: strip the minimal alignment and take
/// the remaining twist about Y from its quaternion.
pub fn roll_from_matrix(m: &Matrix3<f64>) -> f64 {
    let y = Unit::new_normalize(m.column(1).into_owned());
    let twist = alignment_matrix(&y).transpose() * m;
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(twist));
    if q.w.abs() < EPSILON {
        std::f64::consts::PI
    } else {
        2.0 * (q.j / q.w).atan()
    }
}

/// Remove component `axis` from the local Z axis and rebuild an orthonormal frame
/// around the unchanged Y axis. Returns `None` when Z would vanish.
pub fn fix_axis(m: &Matrix3<f64>, axis: usize) -> Option<Matrix3<f64>> {
    let y = m.column(1).normalize();
    let mut z = m.column(2).into_owned();
    z[axis] = 0.0;
    if z.norm() < EPSILON {
        return None;
    }
    let z = z.normalize();
    let x = y.cross(&z);
    if x.norm() < EPSILON {
        return None;
    }
    let x = x.normalize();
    let z = x.cross(&y);
    Some(Matrix3::from_columns(&[x, y, z]))
}

/// Frame whose X axis is `normal` orthogonalised against the bone direction.
fn plane_matrix(dir: &Unit<Vector3<f64>>, normal: &Vector3<f64>) -> Option<Matrix3<f64>> {
    let y = dir.into_inner();
    let x = normal - y * normal.dot(&y);
    if x.norm() < EPSILON {
        return None;
    }
    let x = x.normalize();
    let z = x.cross(&y);
    Some(Matrix3::from_columns(&[x, y, z]))
}

/// Per-figure roll solver. Holds no mutable state; identical inputs give
/// identical outputs.
#[derive(Debug)]
pub struct BoneOrientationSolver<'a> {
    ctx: &'a BuildContext,
    generation: Option<RigGeneration>,
    planes: &'a FigurePlanes,
}

impl<'a> BoneOrientationSolver<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        generation: Option<RigGeneration>,
        planes: &'a FigurePlanes,
    ) -> Self {
        Self {
            ctx,
            generation,
            planes,
        }
    }

    /// Solve roll and rest matrix for bone `name`.
    pub fn solve(&self, name: &str, geometry: BoneGeometry) -> BoneOrientation {
        let head = geometry.head;
        let mut tail = geometry.tail;
        if geometry.length() < self.ctx.min_bone_length {
            log::trace!("{name}: degenerate bone, nudging tail");
            tail = head + engine_up(self.ctx) * self.ctx.min_bone_length;
        }
        let dir = Unit::new_normalize(tail - head);

        if let Some((plane, matrix)) = self.plane_frame(name, &dir) {
            let roll = roll_from_matrix(&matrix);
            log::trace!("{name}: roll {:.2} deg from plane {plane}", roll.to_degrees());
            return BoneOrientation {
                roll,
                matrix: matrix_from_roll(&dir, roll),
                head,
                tail,
                source: RollSource::Plane(plane.to_string()),
            };
        }

        match tables::roll_entry(name) {
            Some(entry) => {
                let degrees = entry.degrees(self.generation);
                let mut matrix = matrix_from_roll(&dir, degrees.to_radians());
                match fix_axis(&matrix, entry.fix_axis) {
                    Some(fixed) => matrix = fixed,
                    None => log::trace!("{name}: axis {} fix skipped", entry.fix_axis),
                }
                let roll = roll_from_matrix(&matrix);
                log::trace!("{name}: roll {:.2} deg from table", roll.to_degrees());
                BoneOrientation {
                    roll,
                    matrix,
                    head,
                    tail,
                    source: RollSource::Table,
                }
            }
            None => BoneOrientation {
                roll: 0.0,
                matrix: matrix_from_roll(&dir, 0.0),
                head,
                tail,
                source: RollSource::Default,
            },
        }
    }

    fn plane_frame(
        &self,
        name: &str,
        dir: &Unit<Vector3<f64>>,
    ) -> Option<(&'static str, Matrix3<f64>)> {
        if !self.ctx.use_planes {
            return None;
        }
        let plane = tables::plane_for_bone(name)?;
        let normal = self.planes.normal(plane)?;
        plane_matrix(dir, normal).map(|m| (plane, m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn dir(x: f64, y: f64, z: f64) -> Unit<Vector3<f64>> {
        Unit::new_normalize(Vector3::new(x, y, z))
    }

    #[test]
    fn roll_round_trips_through_matrix() {
        for d in [dir(1.0, 0.0, 0.0), dir(0.0, 0.0, -1.0), dir(0.3, -0.4, 0.8)] {
            for roll in [-2.5, -1.0, 0.0, 0.7, 3.0] {
                let m = matrix_from_roll(&d, roll);
                assert_relative_eq!(m.column(1).into_owned(), d.into_inner(), epsilon = 1e-9);
                assert_relative_eq!(roll_from_matrix(&m), roll, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn antiparallel_bone_uses_half_turn() {
        let m = matrix_from_roll(&dir(0.0, -1.0, 0.0), 0.0);
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.column(1).into_owned(), -Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn half_turn_reads_as_pi() {
        let m = matrix_from_roll(&dir(1.0, 0.0, 0.0), std::f64::consts::PI);
        assert_relative_eq!(roll_from_matrix(&m).abs(), std::f64::consts::PI, epsilon = 1e-9);
    }

    #[test]
    fn unknown_bone_defaults_to_zero_roll() {
        let ctx = BuildContext::default();
        let planes = FigurePlanes::new();
        let solver = BoneOrientationSolver::new(&ctx, None, &planes);
        let o = solver.solve(
            "head",
            BoneGeometry::new(Vector3::new(0.0, 0.0, 16.0), Vector3::new(0.0, 0.0, 17.0)),
        );
        assert_eq!(o.source, RollSource::Default);
        assert_eq!(o.roll, 0.0);
    }

    #[test]
    fn degenerate_bone_gets_nudged() {
        let ctx = BuildContext::default();
        let planes = FigurePlanes::new();
        let solver = BoneOrientationSolver::new(&ctx, None, &planes);
        let p = Vector3::new(1.0, 2.0, 3.0);
        let o = solver.solve("lEye", BoneGeometry::new(p, p));
        assert_relative_eq!((o.tail - o.head).norm(), ctx.min_bone_length, epsilon = 1e-12);
        assert_relative_eq!(o.matrix.determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn plane_roll_aligns_x_with_normal() {
        let ctx = BuildContext::default();
        let mut planes = FigurePlanes::new();
        planes.insert("lArm", Vector3::new(0.0, 0.0, -1.0));
        let solver = BoneOrientationSolver::new(&ctx, None, &planes);
        let o = solver.solve(
            "lForeArm",
            BoneGeometry::new(Vector3::new(4.0, 0.0, 15.0), Vector3::new(7.0, 0.2, 15.0)),
        );
        assert_eq!(o.source, RollSource::Plane("lArm".into()));
        let x = o.matrix.column(0).into_owned();
        assert_relative_eq!(x, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-9);
        assert_relative_eq!(o.roll, FRAC_PI_2, epsilon = 1e-9);
    }

    #[test]
    fn planes_can_be_disabled() {
        let ctx = BuildContext {
            use_planes: false,
            ..Default::default()
        };
        let mut planes = FigurePlanes::new();
        planes.insert("lArm", Vector3::new(0.0, 1.0, 0.0));
        let solver = BoneOrientationSolver::new(&ctx, None, &planes);
        let o = solver.solve(
            "lForeArm",
            BoneGeometry::new(Vector3::zeros(), Vector3::new(3.0, 0.0, 0.0)),
        );
        assert_eq!(o.source, RollSource::Table);
    }
}
