//! Orientation math.
//!
//! Quaternion algebra plus the two fixed axis remaps that reconcile the
//! geodetic "world" frame (Z up, +X east, +Y north) with the renderer's
//! frame (Y up, -Z north).
//!
//! # Example
//!
//! ```rust
//! use vantage_geo::orientation::{Pose, Quaternion, Vec3};
//!
//! // Parent pose 1 m east of the origin, child 0.5 m further east.
//! let parent = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
//! let child = Pose::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity());
//!
//! let world = parent.compose(child);
//! assert!((world.position.x - 1.5).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Squared-norm drift beyond which a composed rotation is renormalised.
const NORM_DRIFT_TOLERANCE: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f64) -> Self {
        let half = angle_rad / 2.0;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Intrinsic Z-X-Y Euler rotation (radians), the order used by device
    /// orientation sensors.
    pub fn from_euler_zxy(x: f64, y: f64, z: f64) -> Self {
        let (s1, c1) = (x / 2.0).sin_cos();
        let (s2, c2) = (y / 2.0).sin_cos();
        let (s3, c3) = (z / 2.0).sin_cos();
        Self::new(
            c1 * c2 * c3 - s1 * s2 * s3,
            s1 * c2 * c3 - c1 * s2 * s3,
            c1 * s2 * c3 + s1 * c2 * s3,
            c1 * c2 * s3 + s1 * s2 * c3,
        )
    }

    /// Build a rotation from device orientation angles in degrees:
    /// `alpha` about Z, `beta` about X, `gamma` about Y.
    pub fn from_device_orientation(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self::from_euler_zxy(beta.to_radians(), gamma.to_radians(), alpha.to_radians())
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Hamilton product followed by renormalisation when the result drifts
    /// off the unit sphere.
    pub fn compose(self, rhs: Self) -> Self {
        let q = self.mul(rhs);
        if (q.norm_squared() - 1.0).abs() > NORM_DRIFT_TOLERANCE {
            q.normalized()
        } else {
            q
        }
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Inverse rotation.
    pub fn inverse(self) -> Self {
        let n = self.norm_squared();
        if n == 0.0 {
            return Self::identity();
        }
        let c = self.conjugate();
        Self::new(c.w / n, c.x / n, c.y / n, c.z / n)
    }

    pub fn norm_squared(self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Scale to unit length. A zero quaternion becomes the identity.
    pub fn normalized(self) -> Self {
        let n = self.norm_squared().sqrt();
        if n == 0.0 {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Z-Y-X Euler angles in degrees: `x` roll, `y` pitch, `z` yaw.
    pub fn to_euler_zyx_degrees(self) -> Vec3 {
        let q = self.normalized();
        let (w, x, y, z) = (q.w, q.x, q.y, q.z);

        let m11 = 1.0 - 2.0 * (y * y + z * z);
        let m12 = 2.0 * (x * y - w * z);
        let m21 = 2.0 * (x * y + w * z);
        let m22 = 1.0 - 2.0 * (x * x + z * z);
        let m31 = 2.0 * (x * z - w * y);
        let m32 = 2.0 * (y * z + w * x);
        let m33 = 1.0 - 2.0 * (x * x + y * y);

        let pitch = (-m31.clamp(-1.0, 1.0)).asin();
        let (roll, yaw) = if m31.abs() < 0.999_999_9 {
            (m32.atan2(m33), m21.atan2(m11))
        } else {
            // Gimbal lock.
            (0.0, (-m12).atan2(m22))
        };

        Vec3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }

    /// Heading about the vertical axis in degrees, in (-180, 180].
    pub fn yaw_degrees(self) -> f64 {
        self.to_euler_zyx_degrees().z
    }
}

// ────────────────────────────────────────────────────────────────────────────
// World / render remaps
// ────────────────────────────────────────────────────────────────────────────

fn x_axis_rotation(angle_rad: f64) -> Quaternion {
    Quaternion::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), angle_rad)
}

/// Re-express a world-frame rotation in render space (-90° about X).
pub fn world_to_render(q: Quaternion) -> Quaternion {
    x_axis_rotation(-FRAC_PI_2).compose(q)
}

/// Re-express a render-frame rotation in world space (+90° about X).
pub fn render_to_world(q: Quaternion) -> Quaternion {
    x_axis_rotation(FRAC_PI_2).compose(q)
}

/// World (east, north, up) to render (x, up, -north).
pub fn world_to_render_position(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// Render (x, up, -north) to world (east, north, up).
pub fn render_to_world_position(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.z, v.y)
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body pose: position plus orientation.
///
/// Represents frame B relative to frame A: to convert a point expressed in
/// frame B into frame A, rotate it by `orientation` then add `position`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// The identity pose.
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two poses: `self` is the parent, `child` is expressed in it.
    pub fn compose(self, child: Self) -> Self {
        let position = self.position.add(self.orientation.rotate(child.position));
        let orientation = self.orientation.compose(child.orientation);
        Self::new(position, orientation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_1_SQRT_2;

    fn assert_vec(v: Vec3, x: f64, y: f64, z: f64) {
        assert!((v.x - x).abs() < 1e-9, "x={} expected {x}", v.x);
        assert!((v.y - y).abs() < 1e-9, "y={} expected {y}", v.y);
        assert!((v.z - z).abs() < 1e-9, "z={} expected {z}", v.z);
    }

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let r = Quaternion::identity().rotate(Vec3::new(1.0, 2.0, 3.0));
        assert_vec(r, 1.0, 2.0, 3.0);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert_vec(r, 0.0, 1.0, 0.0);
    }

    #[test]
    fn inverse_undoes_rotation() {
        let q = Quaternion::from_device_orientation(35.0, 20.0, -10.0);
        let prod = q.mul(q.inverse());
        assert!((prod.w - 1.0).abs() < 1e-9);
        assert!(prod.x.abs() < 1e-9);
        assert!(prod.y.abs() < 1e-9);
        assert!(prod.z.abs() < 1e-9);
    }

    #[test]
    fn compose_renormalises_drift() {
        let q = Quaternion::new(1.01, 0.0, 0.0, 0.0);
        let c = q.compose(Quaternion::identity());
        assert!((c.norm_squared() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn device_alpha_is_yaw() {
        for alpha in [-170.0, -45.0, 0.0, 30.0, 120.0, 179.0] {
            let q = Quaternion::from_device_orientation(alpha, 0.0, 0.0);
            assert!((q.yaw_degrees() - alpha).abs() < 1e-6, "alpha {alpha}");
        }
    }

    #[test]
    fn device_beta_rotates_about_x() {
        let q = Quaternion::from_device_orientation(0.0, 90.0, 0.0);
        // +90° about X carries +Y onto +Z.
        assert_vec(q.rotate(Vec3::new(0.0, 1.0, 0.0)), 0.0, 0.0, 1.0);
    }

    #[test]
    fn remap_round_trip_is_identity() {
        let q = Quaternion::from_device_orientation(12.0, 80.0, 5.0);
        let back = render_to_world(world_to_render(q));
        assert!((back.w - q.w).abs() < 1e-9);
        assert!((back.x - q.x).abs() < 1e-9);
        assert!((back.y - q.y).abs() < 1e-9);
        assert!((back.z - q.z).abs() < 1e-9);

        let v = Vec3::new(3.0, 4.0, 5.0);
        assert_eq!(render_to_world_position(world_to_render_position(v)), v);
    }

    #[test]
    fn world_to_render_rotation_matches_position_remap() {
        let v = Vec3::new(3.0, 4.0, 5.0);
        let rotated = world_to_render(Quaternion::identity()).rotate(v);
        let remapped = world_to_render_position(v);
        assert_vec(rotated, remapped.x, remapped.y, remapped.z);
    }

    #[test]
    fn pose_compose_translations_add() {
        let t1 = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let t2 = Pose::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
        assert_vec(t1.compose(t2).position, 3.0, 0.0, 0.0);
    }

    #[test]
    fn pose_compose_respects_parent_rotation() {
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let parent = Pose::new(Vec3::zero(), q90z);
        let child = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        assert_vec(parent.compose(child).position, 0.0, 1.0, 0.0);
    }
}
