//! Flattened scene graph output for rendering.
//!
//! `FlatPlaneEntry` is the result of walking the scene graph: one entry per
//! visible plane quad, with its world transform resolved.

use glam::{Mat4, Vec3};

use crate::planes::types::SemanticType;

use super::node::{LayerId, SceneNodeId};

/// One entry in the flattened visible set.
#[derive(Clone, Debug)]
pub struct FlatPlaneEntry {
    /// Node the entry was produced from.
    pub node: SceneNodeId,
    /// Local-to-world transform of the quad.
    pub world_transform: Mat4,
    /// Half extents of the quad in its local XY plane.
    pub half_extents: Vec3,
    pub semantic: SemanticType,
    pub material: Option<String>,
    /// Which layer this entry belongs to.
    pub layer: LayerId,
}

impl FlatPlaneEntry {
    /// World-space center of the quad.
    pub fn world_center(&self) -> Vec3 {
        self.world_transform.transform_point3(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_center() {
        let entry = FlatPlaneEntry {
            node: SceneNodeId(3),
            world_transform: Mat4::from_translation(Vec3::new(1.0, -1.5, 2.0)),
            half_extents: Vec3::new(1.0, 1.0, 0.0),
            semantic: SemanticType::Floor,
            material: None,
            layer: LayerId::SPATIAL_MAPPING,
        };
        assert!((entry.world_center() - Vec3::new(1.0, -1.5, 2.0)).length() < 1e-6);
    }
}
