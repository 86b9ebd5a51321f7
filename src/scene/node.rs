//! Scene graph node types
//!
//! Core types for the CPU-side scene graph: node IDs, layers, transforms,
//! content variants, and nodes.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::planes::types::SemanticType;

/// Unique identifier for a scene graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneNodeId(pub u64);

/// Render/physics layer a node is tagged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u32);

impl LayerId {
    /// Default layer for untagged content
    pub const DEFAULT: LayerId = LayerId(0);
    /// Layer reserved for spatial mapping geometry and the planes derived from it
    pub const SPATIAL_MAPPING: LayerId = LayerId(31);
}

impl Default for LayerId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Local transform relative to the parent node.
#[derive(Clone, Debug)]
pub struct LocalTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl LocalTransform {
    /// Identity transform (no translation, rotation, or scaling).
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a translation-only transform.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a rigid transform.
    pub fn from_pose(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: 1.0,
        }
    }

    /// Convert to a 4x4 matrix.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation,
            self.position,
        )
    }
}

/// What a scene node contains.
#[derive(Clone, Debug)]
pub enum NodeContent {
    /// A grouping node with no geometry of its own.
    Group,

    /// A rectangular quad in the node's local XY plane.
    Plane {
        half_extents: Vec3,
        semantic: SemanticType,
        material: Option<String>,
    },
}

/// A single node in the scene graph.
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub id: SceneNodeId,
    pub name: String,
    pub parent: Option<SceneNodeId>,
    pub children: Vec<SceneNodeId>,
    pub local_transform: LocalTransform,
    /// Cached world transform (recomputed during propagation).
    pub world_transform: Mat4,
    pub layer: LayerId,
    pub visible: bool,
    pub content: NodeContent,
}

impl SceneNode {
    /// Create a new scene node.
    pub fn new(
        id: SceneNodeId,
        name: impl Into<String>,
        layer: LayerId,
        content: NodeContent,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            local_transform: LocalTransform::identity(),
            world_transform: Mat4::IDENTITY,
            layer,
            visible: true,
            content,
        }
    }
}
