// Telegraph hit-test geometry.
//
// A telegraph shape is authored in the caster's local frame (+z forward,
// +x sideways), rotated by the caster's yaw and translated to world
// position. Hit tests run on the ground plane; square and rectangle shapes
// additionally clip against a vertical band. Edge checks are softened by
// half the target's hit radius so large targets clip shape borders the way
// the client draws them.

use serde::{Deserialize, Serialize};

use super::geometry::{angle_delta, Vec3};

/// Fraction of the hit radius used as edge tolerance.
pub const EDGE_TOLERANCE: f32 = 0.5;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TelegraphShape {
    Circle {
        radius: f32,
    },
    Ring {
        inner: f32,
        outer: f32,
    },
    Cone {
        inner: f32,
        outer: f32,
        angle_deg: f32,
    },
    /// A cone with extended reach; same predicate as [`TelegraphShape::Cone`].
    LongCone {
        inner: f32,
        outer: f32,
        angle_deg: f32,
    },
    /// A disk with a slice cut out of it.
    Pie {
        inner: f32,
        radius: f32,
        angle_deg: f32,
    },
    /// Centered box: local x in `[-width, width]`, z in `[-length, length]`.
    Square {
        width: f32,
        height: f32,
        length: f32,
    },
    /// Box with its base at the origin: local z in `[0, length]`.
    Rectangle {
        width: f32,
        height: f32,
        length: f32,
    },
}

/// A telegraph placed in the world.
#[derive(Clone, Copy, Debug)]
pub struct Telegraph {
    pub shape: TelegraphShape,
    pub position: Vec3,
    pub rotation_z: f32,
    /// Offset in the local frame, applied before hit testing.
    pub offset: Vec3,
}

impl Telegraph {
    pub fn new(shape: TelegraphShape, position: Vec3, rotation_z: f32) -> Self {
        Telegraph {
            shape,
            position,
            rotation_z,
            offset: Vec3::ZERO,
        }
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    /// Effective shape origin: world position plus the rotated local offset.
    fn origin(&self) -> Vec3 {
        let (sin, cos) = self.rotation_z.sin_cos();
        Vec3::new(
            self.position.x + self.offset.x * cos + self.offset.z * sin,
            self.position.y + self.offset.y,
            self.position.z - self.offset.x * sin + self.offset.z * cos,
        )
    }

    /// Whether a target at `target` with the given hit radius is struck.
    pub fn contains(&self, target: Vec3, hit_radius: f32) -> bool {
        let origin = self.origin();
        let tol = hit_radius * EDGE_TOLERANCE;
        let dist = origin.distance_2d(target);

        match self.shape {
            TelegraphShape::Circle { radius } => dist <= radius + tol,
            TelegraphShape::Ring { inner, outer } => dist >= inner - tol && dist <= outer + tol,
            TelegraphShape::Cone {
                inner,
                outer,
                angle_deg,
            }
            | TelegraphShape::LongCone {
                inner,
                outer,
                angle_deg,
            } => {
                if dist < inner - tol || dist > outer + tol {
                    return false;
                }
                self.within_cone_angle(origin, target, dist, angle_deg, tol)
            }
            TelegraphShape::Pie {
                inner,
                radius,
                angle_deg,
            } => {
                if dist > radius - tol || dist < inner {
                    return false;
                }
                // The slice is the hole: inside the angle means missed
                let delta = angle_delta(origin.bearing_to(target), self.rotation_z);
                delta.abs().to_degrees() > angle_deg / 2.0
            }
            TelegraphShape::Square {
                width,
                height,
                length,
            } => self.within_box(origin, target, width, height, -length, length, tol),
            TelegraphShape::Rectangle {
                width,
                height,
                length,
            } => self.within_box(origin, target, width, height, 0.0, length, tol),
        }
    }

    /// Radius the spatial grid should pre-filter with: an upper bound on the
    /// reach of this telegraph from its world position.
    pub fn search_radius(&self, hit_radius: f32) -> f32 {
        let reach = match self.shape {
            TelegraphShape::Circle { radius } => radius,
            TelegraphShape::Ring { outer, .. } => outer,
            TelegraphShape::Cone { outer, .. } | TelegraphShape::LongCone { outer, .. } => outer,
            TelegraphShape::Pie { radius, .. } => radius,
            TelegraphShape::Square { width, length, .. }
            | TelegraphShape::Rectangle { width, length, .. } => {
                (width * width + length * length).sqrt()
            }
        };
        reach + self.offset.length_2d() + hit_radius * EDGE_TOLERANCE
    }

    fn within_cone_angle(
        &self,
        origin: Vec3,
        target: Vec3,
        dist: f32,
        angle_deg: f32,
        tol: f32,
    ) -> bool {
        // A target sitting on the origin is inside regardless of facing
        if dist <= tol.max(f32::EPSILON) {
            return true;
        }
        let delta_deg = angle_delta(origin.bearing_to(target), self.rotation_z)
            .abs()
            .to_degrees();
        let half = angle_deg / 2.0;
        if delta_deg <= half {
            return true;
        }
        // Soft edge: the hit circle may clip the cone border, but never
        // beyond the full telegraph angle
        if delta_deg > angle_deg {
            return false;
        }
        let overhang = (delta_deg - half).to_radians() * dist;
        overhang <= tol
    }

    fn within_box(
        &self,
        origin: Vec3,
        target: Vec3,
        width: f32,
        height: f32,
        z_min: f32,
        z_max: f32,
        tol: f32,
    ) -> bool {
        if (target.y - origin.y).abs() > height {
            return false;
        }
        // Inverse-rotate the target into the local frame, then test the hit
        // circle against the box
        let dx = target.x - origin.x;
        let dz = target.z - origin.z;
        let (sin, cos) = self.rotation_z.sin_cos();
        let lx = dx * cos - dz * sin;
        let lz = dx * sin + dz * cos;

        let cx = lx.clamp(-width, width);
        let cz = lz.clamp(z_min, z_max);
        let ddx = lx - cx;
        let ddz = lz - cz;
        ddx * ddx + ddz * ddz <= tol * tol
    }
}
