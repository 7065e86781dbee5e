//! DAZ ↔ engine coordinate conversion.
//!
//! DAZ works in centimetres with Y up. The engine frame is scaled by
//! [`BuildContext::scale`] and, when `zup` is set, rotated so that DAZ +Y maps to
//! engine +Z and DAZ +Z maps to engine -Y.

use dazrig_api_core::{Channel, Component};
use nalgebra::Vector3;

use crate::config::BuildContext;

/// DAZ point (cm) to engine point.
pub fn daz_to_engine(v: [f64; 3], ctx: &BuildContext) -> Vector3<f64> {
    let s = ctx.scale;
    if ctx.zup {
        Vector3::new(s * v[0], -s * v[2], s * v[1])
    } else {
        Vector3::new(s * v[0], s * v[1], s * v[2])
    }
}

/// Engine point to DAZ point (cm). Inverse of [`daz_to_engine`].
pub fn engine_to_daz(v: &Vector3<f64>, ctx: &BuildContext) -> [f64; 3] {
    let s = ctx.scale;
    if ctx.zup {
        [v.x / s, v.z / s, -v.y / s]
    } else {
        [v.x / s, v.y / s, v.z / s]
    }
}

/// Scale factors only swap axes; they carry no sign and no unit.
pub fn daz_scale_to_engine(v: [f64; 3], ctx: &BuildContext) -> Vector3<f64> {
    if ctx.zup {
        Vector3::new(v[0], v[2], v[1])
    } else {
        Vector3::new(v[0], v[1], v[2])
    }
}

/// DAZ Euler angles (degrees) to engine Euler angles (radians).
pub fn daz_euler_to_engine(deg: [f64; 3], ctx: &BuildContext) -> Vector3<f64> {
    let r = [deg[0].to_radians(), deg[1].to_radians(), deg[2].to_radians()];
    if ctx.zup {
        Vector3::new(r[0], -r[2], r[1])
    } else {
        Vector3::new(r[0], r[1], r[2])
    }
}

/// Engine Euler angles (radians) to DAZ Euler angles (degrees).
pub fn engine_euler_to_daz(rad: &Vector3<f64>, ctx: &BuildContext) -> [f64; 3] {
    let (x, y, z) = if ctx.zup {
        (rad.x, rad.z, -rad.y)
    } else {
        (rad.x, rad.y, rad.z)
    };
    [x.to_degrees(), y.to_degrees(), z.to_degrees()]
}

/// Engine axis index and sign for a DAZ component. Scalar components map to
/// index 0 with positive sign.
pub fn daz_axis_to_engine(component: Component, ctx: &BuildContext) -> (usize, f64) {
    match (component, ctx.zup) {
        (Component::X, _) | (Component::None, _) => (0, 1.0),
        (Component::Y, true) => (2, 1.0),
        (Component::Z, true) => (1, -1.0),
        (Component::Y, false) => (1, 1.0),
        (Component::Z, false) => (2, 1.0),
    }
}

/// Rotation order letters remapped to engine axes ("YZX" → "ZYX" with Z up).
pub fn daz_rotation_order_to_engine(order: &str, ctx: &BuildContext) -> String {
    if !ctx.zup {
        return order.to_ascii_uppercase();
    }
    order
        .to_ascii_uppercase()
        .chars()
        .map(|c| match c {
            'Y' => 'Z',
            'Z' => 'Y',
            other => other,
        })
        .collect()
}

/// Multiplier taking a DAZ channel value into engine units.
pub fn channel_unit_factor(channel: Channel, ctx: &BuildContext) -> f64 {
    match channel {
        Channel::Rotation | Channel::Orientation => std::f64::consts::PI / 180.0,
        Channel::Translation | Channel::CenterPoint | Channel::EndPoint => ctx.scale,
        Channel::Scale | Channel::GeneralScale | Channel::Value => 1.0,
    }
}

/// Engine up axis, used to nudge degenerate bones.
pub fn engine_up(ctx: &BuildContext) -> Vector3<f64> {
    if ctx.zup {
        Vector3::z()
    } else {
        Vector3::y()
    }
}
