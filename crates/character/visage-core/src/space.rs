//! Coordinate conversion between backend space and host skeleton space.
//!
//! The backend stores rotations as `[w, x, y, z]` in a handedness mirrored
//! about the Y axis relative to the host. Every transform leaving the
//! evaluator passes through [`to_host_space`]; nothing else flips axes.

use std::f32::consts::FRAC_PI_2;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::host::HostMesh;

/// Local bone transform in host convention. Rotation is `[x, y, z, w]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    pub fn new(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn quat(&self) -> UnitQuaternion<f32> {
        let [x, y, z, w] = self.rotation;
        UnitQuaternion::new_normalize(Quaternion::new(w, x, y, z))
    }
}

/// One entry of a character's bone output: host bone index plus local transform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneTransform {
    pub bone_index: usize,
    pub transform: Transform,
}

/// Transform as laid out by the backend. Rotation is `[w, x, y, z]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawXform {
    pub rotation: [f32; 4],
    pub translation: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for RawXform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RawXform {
    pub const IDENTITY: RawXform = RawXform {
        rotation: [1.0, 0.0, 0.0, 0.0],
        translation: [0.0; 3],
        scale: [1.0; 3],
    };
}

/// Convert a backend transform into host axis convention.
///
/// Mirrors about the XZ plane: Y translation and the Y rotation component flip sign.
#[inline]
pub fn to_host_space(raw: &RawXform) -> Transform {
    let [w, x, y, z] = raw.rotation;
    let [tx, ty, tz] = raw.translation;
    Transform {
        translation: [tx, -ty, tz],
        rotation: [x, -y, z, w],
        scale: raw.scale,
    }
}

fn front_axis_fix() -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -FRAC_PI_2)
}

/// Rotate a host-space transform by -90 degrees about Z.
pub fn compensate_front_axis(t: &Transform) -> Transform {
    let fix = front_axis_fix();
    let translation = fix.transform_vector(&Vector3::from(t.translation));
    let rotation = fix * t.quat() * fix.inverse();
    let c = rotation.quaternion().coords;
    Transform {
        translation: [translation.x, translation.y, translation.z],
        rotation: [c.x, c.y, c.z, c.w],
        scale: [t.scale[1], t.scale[0], t.scale[2]],
    }
}

/// Maps one rig bone onto a host skeleton bone and its reference pose.
#[derive(Clone, Debug, PartialEq)]
pub struct BoneBinding {
    pub bone_index: usize,
    pub transform_index: usize,
    pub ref_scale: [f32; 3],
    pub ref_translation: [f32; 3],
    pub inv_ref_rotation: [f32; 4],
}

impl BoneBinding {
    pub fn new(bone_index: usize, transform_index: usize, reference: &Transform) -> Self {
        let inv = reference.quat().inverse().quaternion().coords;
        Self {
            bone_index,
            transform_index,
            ref_scale: reference.scale,
            ref_translation: reference.translation,
            inv_ref_rotation: [inv.x, inv.y, inv.z, inv.w],
        }
    }

    /// Express an absolute local transform as an offset from the reference pose.
    ///
    /// Applying the offset additively (scale and translation summed, rotation
    /// pre-multiplied) onto the reference pose yields `t` again.
    pub fn to_additive(&self, t: &Transform) -> Transform {
        let [x, y, z, w] = self.inv_ref_rotation;
        let inv = UnitQuaternion::new_normalize(Quaternion::new(w, x, y, z));
        let c = (t.quat() * inv).quaternion().coords;
        Transform {
            translation: sub3(t.translation, self.ref_translation),
            rotation: [c.x, c.y, c.z, c.w],
            scale: sub3(t.scale, self.ref_scale),
        }
    }
}

fn sub3(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn strip_namespace(name: &str) -> Option<&str> {
    name.rsplit_once(':').map(|(_, bare)| bare)
}

/// Bind rig bones (by transform index and name) to the host skeleton.
///
/// Names missing from the skeleton are retried without a `namespace:` prefix.
/// The result is sorted by host bone index.
pub fn bind_bones<'a, I>(bones: I, mesh: &dyn HostMesh) -> Vec<BoneBinding>
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut bindings = Vec::new();
    for (transform_index, name) in bones {
        let found = mesh
            .bone_index(name)
            .or_else(|| strip_namespace(name).and_then(|bare| mesh.bone_index(bare)));
        match found {
            Some(bone_index) => {
                let reference = mesh.reference_pose(bone_index).unwrap_or_default();
                bindings.push(BoneBinding::new(bone_index, transform_index, &reference));
            }
            None => log::warn!("bone '{name}' not found in host skeleton"),
        }
    }
    bindings.sort_by_key(|b| b.bone_index);
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_transform_eq(a: &Transform, b: &Transform) {
        for i in 0..3 {
            assert_relative_eq!(a.translation[i], b.translation[i], epsilon = 1e-5);
            assert_relative_eq!(a.scale[i], b.scale[i], epsilon = 1e-5);
        }
        // q and -q are the same rotation
        let dot: f32 = (0..4).map(|i| a.rotation[i] * b.rotation[i]).sum();
        assert_relative_eq!(dot.abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_identity_converts_to_identity() {
        assert_eq!(to_host_space(&RawXform::IDENTITY), Transform::IDENTITY);
    }

    #[test]
    fn test_conversion_mirrors_y() {
        let raw = RawXform {
            rotation: [0.5, 0.1, 0.2, 0.3],
            translation: [1.0, 2.0, 3.0],
            scale: [1.0, 2.0, 3.0],
        };
        let t = to_host_space(&raw);
        assert_eq!(t.translation, [1.0, -2.0, 3.0]);
        assert_eq!(t.rotation, [0.1, -0.2, 0.3, 0.5]);
        assert_eq!(t.scale, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_front_axis_compensation() {
        let t = Transform::new([1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], [2.0, 3.0, 4.0]);
        let c = compensate_front_axis(&t);
        assert_relative_eq!(c.translation[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(c.translation[1], -1.0, epsilon = 1e-6);
        assert_eq!(c.scale, [3.0, 2.0, 4.0]);
        // conjugation leaves identity untouched
        let expected = Transform::new(c.translation, [0.0, 0.0, 0.0, 1.0], c.scale);
        assert_transform_eq(&c, &expected);
    }

    #[test]
    fn test_additive_offset_reapplies_to_absolute() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let reference = Transform::new([0.0, 1.0, 0.0], [0.0, 0.0, half, half], [1.0; 3]);
        let binding = BoneBinding::new(3, 0, &reference);
        let absolute = Transform::new([0.5, 1.5, 0.0], [half, 0.0, 0.0, half], [1.2, 1.0, 1.0]);

        let offset = binding.to_additive(&absolute);
        assert_relative_eq!(offset.translation[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(offset.translation[1], 0.5, epsilon = 1e-6);
        assert_relative_eq!(offset.scale[0], 0.2, epsilon = 1e-6);

        let rot = (offset.quat() * reference.quat()).quaternion().coords;
        let reapplied = Transform::new(
            [
                reference.translation[0] + offset.translation[0],
                reference.translation[1] + offset.translation[1],
                reference.translation[2] + offset.translation[2],
            ],
            [rot.x, rot.y, rot.z, rot.w],
            [
                reference.scale[0] + offset.scale[0],
                reference.scale[1] + offset.scale[1],
                reference.scale[2] + offset.scale[2],
            ],
        );
        assert_transform_eq(&reapplied, &absolute);
    }

    #[test]
    fn test_strip_namespace() {
        assert_eq!(strip_namespace("rig:jaw"), Some("jaw"));
        assert_eq!(strip_namespace("a:b:jaw"), Some("jaw"));
        assert_eq!(strip_namespace("jaw"), None);
    }
}
