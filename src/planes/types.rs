//! Plane geometry and semantic type definitions.
//!
//! A [`BoundedPlane`] is the geometric output of plane extraction; a
//! [`ClassifiedPlane`] pairs it with exactly one [`SemanticType`]. Sets of
//! semantic types are expressed as a [`SemanticMask`] bitset.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Maximum deviation of `|normal|` from 1.0 accepted as unit length.
pub const UNIT_NORMAL_TOLERANCE: f32 = 1e-3;

/// Semantic category of a classified plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    /// Near-vertical surface
    Wall,
    /// Upward-facing horizontal surface at floor height
    Floor,
    /// Downward-facing horizontal surface at ceiling height
    Ceiling,
    /// Horizontal surface away from the floor/ceiling (tables, shelves)
    Platform,
    /// Normal in neither the horizontal nor the vertical band
    Unknown,
}

impl SemanticType {
    /// Every semantic type, in bit order.
    pub const ALL: [SemanticType; 5] = [
        SemanticType::Wall,
        SemanticType::Floor,
        SemanticType::Ceiling,
        SemanticType::Platform,
        SemanticType::Unknown,
    ];

    /// The single bit representing this type inside a [`SemanticMask`].
    pub const fn bits(self) -> u32 {
        match self {
            SemanticType::Wall => 1 << 0,
            SemanticType::Floor => 1 << 1,
            SemanticType::Ceiling => 1 << 2,
            SemanticType::Platform => 1 << 3,
            SemanticType::Unknown => 1 << 4,
        }
    }

    /// Stable lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            SemanticType::Wall => "wall",
            SemanticType::Floor => "floor",
            SemanticType::Ceiling => "ceiling",
            SemanticType::Platform => "platform",
            SemanticType::Unknown => "unknown",
        }
    }

    /// Parse a type name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitset over [`SemanticType`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemanticMask(pub u32);

impl SemanticMask {
    pub const NONE: SemanticMask = SemanticMask(0);
    pub const WALL: SemanticMask = SemanticMask(SemanticType::Wall.bits());
    pub const FLOOR: SemanticMask = SemanticMask(SemanticType::Floor.bits());
    pub const CEILING: SemanticMask = SemanticMask(SemanticType::Ceiling.bits());
    pub const PLATFORM: SemanticMask = SemanticMask(SemanticType::Platform.bits());
    pub const UNKNOWN: SemanticMask = SemanticMask(SemanticType::Unknown.bits());
    pub const ALL: SemanticMask = SemanticMask(0b1_1111);

    /// `(mask & type) == type`
    #[inline]
    pub fn contains(self, semantic: SemanticType) -> bool {
        self.0 & semantic.bits() == semantic.bits()
    }

    /// True if no known type bit is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    /// Iterate the types contained in this mask.
    pub fn iter(self) -> impl Iterator<Item = SemanticType> {
        SemanticType::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

impl From<SemanticType> for SemanticMask {
    fn from(semantic: SemanticType) -> Self {
        SemanticMask(semantic.bits())
    }
}

impl FromIterator<SemanticType> for SemanticMask {
    fn from_iter<I: IntoIterator<Item = SemanticType>>(iter: I) -> Self {
        iter.into_iter().fold(SemanticMask::NONE, |mask, t| mask | t)
    }
}

impl BitOr for SemanticType {
    type Output = SemanticMask;

    fn bitor(self, rhs: SemanticType) -> SemanticMask {
        SemanticMask(self.bits() | rhs.bits())
    }
}

impl BitOr<SemanticType> for SemanticMask {
    type Output = SemanticMask;

    fn bitor(self, rhs: SemanticType) -> SemanticMask {
        SemanticMask(self.0 | rhs.bits())
    }
}

impl BitOr for SemanticMask {
    type Output = SemanticMask;

    fn bitor(self, rhs: SemanticMask) -> SemanticMask {
        SemanticMask(self.0 | rhs.0)
    }
}

impl BitOrAssign<SemanticType> for SemanticMask {
    fn bitor_assign(&mut self, rhs: SemanticType) {
        self.0 |= rhs.bits();
    }
}

/// A finite, oriented rectangle approximating a detected flat surface.
///
/// The rectangle lies in the local XY plane of `rotation`; its normal is the
/// rotated +Z axis. Immutable once produced by an extractor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundedPlane {
    pub center: Vec3,
    pub rotation: Quat,
    pub half_extents: Vec3,
    /// Unit normal
    pub normal: Vec3,
    /// Surface area in square meters
    pub area: f32,
}

impl BoundedPlane {
    /// Create a plane from its pose and half extents.
    /// The normal and area are derived from the rotation and extents.
    pub fn new(center: Vec3, rotation: Quat, half_extents: Vec3) -> Self {
        let rotation = rotation.normalize();
        Self {
            center,
            rotation,
            half_extents,
            normal: rotation * Vec3::Z,
            area: 4.0 * half_extents.x * half_extents.y,
        }
    }

    /// Create a plane facing `normal`.
    pub fn from_normal(center: Vec3, normal: Vec3, half_extents: Vec3) -> Self {
        Self::new(
            center,
            Quat::from_rotation_arc(Vec3::Z, normal.normalize()),
            half_extents,
        )
    }

    /// Vertical coordinate of the plane center.
    #[inline]
    pub fn vertical_position(&self) -> f32 {
        self.center.y
    }

    /// Check the geometric preconditions classification relies on.
    pub fn validate(&self) -> Result<()> {
        let finite = self.center.is_finite()
            && self.rotation.is_finite()
            && self.half_extents.is_finite()
            && self.normal.is_finite()
            && self.area.is_finite();
        if !finite {
            return Err(Error::InvalidPlane(format!(
                "non-finite geometry at center {:?}",
                self.center
            )));
        }
        if self.area <= 0.0 {
            return Err(Error::InvalidPlane(format!(
                "non-positive area {} at center {:?}",
                self.area, self.center
            )));
        }
        let length = self.normal.length();
        if (length - 1.0).abs() > UNIT_NORMAL_TOLERANCE {
            return Err(Error::InvalidPlane(format!(
                "normal {:?} has length {}",
                self.normal, length
            )));
        }
        Ok(())
    }

    /// Shorthand for `validate().is_ok()`.
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    /// World-space rectangle corners, counter-clockwise around the normal.
    pub fn corners(&self) -> [Vec3; 4] {
        let x = self.rotation * Vec3::X * self.half_extents.x;
        let y = self.rotation * Vec3::Y * self.half_extents.y;
        [
            self.center - x - y,
            self.center + x - y,
            self.center + x + y,
            self.center - x + y,
        ]
    }

    /// Snap a nearly horizontal plane so its normal is exactly ±Y.
    ///
    /// Planes whose normal is more than `threshold_degrees` away from both
    /// vertical directions are returned unchanged. Area is preserved.
    pub fn snapped_to_gravity(&self, threshold_degrees: f32) -> Self {
        let target = if self.normal.y >= 0.0 { Vec3::Y } else { Vec3::NEG_Y };
        let angle = self.normal.angle_between(target);
        if angle == 0.0 || angle > threshold_degrees.to_radians() {
            return *self;
        }

        let correction = Quat::from_rotation_arc(self.normal, target);
        Self {
            rotation: (correction * self.rotation).normalize(),
            normal: target,
            ..*self
        }
    }
}

/// A bounded plane together with its semantic type.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPlane {
    pub plane: BoundedPlane,
    pub semantic: SemanticType,
}

/// Triangle mesh submitted to plane extraction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    /// Per-vertex normals; must match `vertices` before extraction.
    pub normals: Vec<Vec3>,
}

impl MeshData {
    /// Create a mesh and compute its vertex normals.
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let mut mesh = Self {
            vertices,
            triangles,
            normals: Vec::new(),
        };
        mesh.recompute_normals();
        mesh
    }

    /// Recompute area-weighted vertex normals from the triangles.
    /// Triangles referencing missing vertices are ignored.
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];

        for tri in &self.triangles {
            let [a, b, c] = tri.map(|i| i as usize);
            let (Some(&pa), Some(&pb), Some(&pc)) =
                (self.vertices.get(a), self.vertices.get(b), self.vertices.get(c))
            else {
                continue;
            };
            // Cross product length is twice the triangle area
            let face = (pb - pa).cross(pc - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }

        self.normals = normals.into_iter().map(Vec3::normalize_or_zero).collect();
    }

    /// True if the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}
