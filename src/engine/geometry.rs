// Vector math shared by the spatial grid, AI movement, and telegraphs.
//
// Coordinate convention: y is the vertical axis; gameplay distances (aggro,
// leash, attack range, telegraph shapes) are measured on the x/z ground
// plane. Yaw 0 faces +z and grows counter-clockwise when seen from above.

use std::f32::consts::PI;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A position or direction in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    /// Full 3-D Euclidean distance.
    pub fn distance(self, other: Vec3) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_sq(self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Ground-plane distance, ignoring the vertical axis.
    pub fn distance_2d(self, other: Vec3) -> f32 {
        self.distance_2d_sq(other).sqrt()
    }

    pub fn distance_2d_sq(self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }

    pub fn length_2d(self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    /// Unit vector on the ground plane pointing from `self` toward `other`.
    /// Falls back to +z when the two points coincide.
    pub fn direction_2d(self, other: Vec3) -> Vec3 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        let len = (dx * dx + dz * dz).sqrt();
        if len <= f32::EPSILON {
            Vec3::new(0.0, 0.0, 1.0)
        } else {
            Vec3::new(dx / len, 0.0, dz / len)
        }
    }

    pub fn scale(self, factor: f32) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Linear interpolation; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Vec3, t: f32) -> Vec3 {
        let t = t.clamp(0.0, 1.0);
        Vec3::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    /// Yaw of the ground-plane vector from `self` to `other`.
    pub fn bearing_to(self, other: Vec3) -> f32 {
        (other.x - self.x).atan2(other.z - self.z)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Normalize an angle into `(-π, π]`.
pub fn normalize_angle(mut angle: f32) -> f32 {
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    while angle > PI {
        angle -= 2.0 * PI;
    }
    angle
}

/// Smallest signed difference between two angles, in `(-π, π]`.
pub fn angle_delta(a: f32, b: f32) -> f32 {
    normalize_angle(a - b)
}
