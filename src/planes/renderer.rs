//! Visual representation of classified planes.
//!
//! The registry never touches a concrete scene type; it only needs to
//! create, hide/show and destroy one visual per plane through
//! [`PlaneRenderer`]. [`SceneGraphRenderer`] is the implementation backed by
//! the crate's own [`SceneGraph`].

use std::collections::HashMap;

use crate::core::{Error, Result};
use crate::scene::{LayerId, LocalTransform, NodeContent, SceneGraph, SceneNodeId};

use super::types::{BoundedPlane, SemanticType};

/// Opaque reference to a renderer-owned plane visual.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualHandle(pub u64);

/// Creates and destroys plane visuals.
pub trait PlaneRenderer {
    /// Create a visual for one plane. Failure affects only this plane.
    fn create_visual(
        &mut self,
        plane: &BoundedPlane,
        semantic: SemanticType,
        layer: LayerId,
        material: Option<&str>,
    ) -> Result<VisualHandle>;

    /// Destroy a visual. Unknown handles are ignored.
    fn destroy_visual(&mut self, handle: VisualHandle);

    /// Show or hide a visual.
    fn set_visible(&mut self, handle: VisualHandle, visible: bool);

    /// Destroy whatever parent container the visuals were created under.
    fn destroy_container(&mut self) {}
}

/// Name of the group node plane visuals are parented to.
pub const CONTAINER_NAME: &str = "surface_planes";

/// [`PlaneRenderer`] that materializes planes as quad nodes in a [`SceneGraph`].
pub struct SceneGraphRenderer {
    graph: SceneGraph,
    container: Option<SceneNodeId>,
    visuals: HashMap<VisualHandle, SceneNodeId>,
    next_handle: u64,
}

impl SceneGraphRenderer {
    pub fn new() -> Self {
        Self::with_graph(SceneGraph::new())
    }

    /// Render into an existing scene graph.
    pub fn with_graph(graph: SceneGraph) -> Self {
        Self {
            graph,
            container: None,
            visuals: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Get a reference to the scene graph.
    pub fn scene_graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Get a mutable reference to the scene graph.
    pub fn scene_graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// The container node, if one is alive.
    pub fn container(&self) -> Option<SceneNodeId> {
        self.container
    }

    /// Scene node behind a handle.
    pub fn node_of(&self, handle: VisualHandle) -> Option<SceneNodeId> {
        self.visuals.get(&handle).copied()
    }

    /// Number of live visuals.
    pub fn visual_count(&self) -> usize {
        self.visuals.len()
    }

    fn ensure_container(&mut self) -> Result<SceneNodeId> {
        if let Some(id) = self.container.filter(|id| self.graph.contains(*id)) {
            return Ok(id);
        }
        let root = self.graph.root();
        let id = self
            .graph
            .add_child(root, CONTAINER_NAME, LayerId::DEFAULT, NodeContent::Group)
            .ok_or_else(|| Error::Render("scene graph root is missing".into()))?;
        self.container = Some(id);
        Ok(id)
    }
}

impl Default for SceneGraphRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaneRenderer for SceneGraphRenderer {
    fn create_visual(
        &mut self,
        plane: &BoundedPlane,
        semantic: SemanticType,
        layer: LayerId,
        material: Option<&str>,
    ) -> Result<VisualHandle> {
        if !plane.center.is_finite() || !plane.rotation.is_finite() || !plane.half_extents.is_finite() {
            return Err(Error::Render(format!(
                "cannot place {} quad at {:?}",
                semantic, plane.center
            )));
        }

        let container = self.ensure_container()?;
        let handle = VisualHandle(self.next_handle);
        self.next_handle += 1;

        let node = self
            .graph
            .add_child(
                container,
                format!("{}_{}", semantic, handle.0),
                layer,
                NodeContent::Plane {
                    half_extents: plane.half_extents,
                    semantic,
                    material: material.map(str::to_owned),
                },
            )
            .ok_or_else(|| Error::Render("plane container vanished".into()))?;
        self.graph
            .set_transform(node, LocalTransform::from_pose(plane.center, plane.rotation));

        self.visuals.insert(handle, node);
        Ok(handle)
    }

    fn destroy_visual(&mut self, handle: VisualHandle) {
        if let Some(node) = self.visuals.remove(&handle) {
            self.graph.remove(node);
        }
    }

    fn set_visible(&mut self, handle: VisualHandle, visible: bool) {
        if let Some(&node) = self.visuals.get(&handle) {
            self.graph.set_visible(node, visible);
        }
    }

    fn destroy_container(&mut self) {
        if let Some(container) = self.container.take() {
            self.graph.remove(container);
        }
        self.visuals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn wall() -> BoundedPlane {
        BoundedPlane::from_normal(Vec3::new(2.0, 0.0, 0.0), Vec3::NEG_X, Vec3::new(1.5, 1.0, 0.0))
    }

    #[test]
    fn test_create_visual_places_quad() {
        let mut renderer = SceneGraphRenderer::new();
        let handle = renderer
            .create_visual(&wall(), SemanticType::Wall, LayerId::SPATIAL_MAPPING, Some("wall_mat"))
            .unwrap();

        let node_id = renderer.node_of(handle).unwrap();
        let node = renderer.scene_graph().get(node_id).unwrap();
        assert_eq!(node.parent, renderer.container());
        assert_eq!(node.layer, LayerId::SPATIAL_MAPPING);
        match &node.content {
            NodeContent::Plane { semantic, material, .. } => {
                assert_eq!(*semantic, SemanticType::Wall);
                assert_eq!(material.as_deref(), Some("wall_mat"));
            }
            NodeContent::Group => panic!("expected plane content"),
        }

        let entries = renderer.scene_graph_mut().flatten();
        assert_eq!(entries.len(), 1);
        assert!((entries[0].world_center() - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_handles_are_unique() {
        let mut renderer = SceneGraphRenderer::new();
        let a = renderer.create_visual(&wall(), SemanticType::Wall, LayerId::DEFAULT, None).unwrap();
        renderer.destroy_visual(a);
        let b = renderer.create_visual(&wall(), SemanticType::Wall, LayerId::DEFAULT, None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_destroy_visual() {
        let mut renderer = SceneGraphRenderer::new();
        let handle = renderer.create_visual(&wall(), SemanticType::Wall, LayerId::DEFAULT, None).unwrap();
        let node = renderer.node_of(handle).unwrap();

        renderer.destroy_visual(handle);
        assert_eq!(renderer.visual_count(), 0);
        assert!(!renderer.scene_graph().contains(node));

        // Second destroy is a no-op
        renderer.destroy_visual(handle);
    }

    #[test]
    fn test_set_visible() {
        let mut renderer = SceneGraphRenderer::new();
        let handle = renderer.create_visual(&wall(), SemanticType::Wall, LayerId::DEFAULT, None).unwrap();

        renderer.set_visible(handle, false);
        assert!(renderer.scene_graph_mut().flatten().is_empty());
        renderer.set_visible(handle, true);
        assert_eq!(renderer.scene_graph_mut().flatten().len(), 1);
    }

    #[test]
    fn test_rejects_non_finite_geometry() {
        let mut renderer = SceneGraphRenderer::new();
        let mut broken = wall();
        broken.center.y = f32::INFINITY;
        let result = renderer.create_visual(&broken, SemanticType::Wall, LayerId::DEFAULT, None);
        assert!(matches!(result, Err(Error::Render(_))));
        assert_eq!(renderer.visual_count(), 0);
    }

    #[test]
    fn test_destroy_container() {
        let mut renderer = SceneGraphRenderer::new();
        renderer.create_visual(&wall(), SemanticType::Wall, LayerId::DEFAULT, None).unwrap();
        renderer.create_visual(&wall(), SemanticType::Wall, LayerId::DEFAULT, None).unwrap();
        assert_eq!(renderer.scene_graph().node_count(), 4); // root + container + 2 quads

        renderer.destroy_container();
        assert_eq!(renderer.scene_graph().node_count(), 1);
        assert!(renderer.container().is_none());

        // Idempotent, and a new container is created on demand
        renderer.destroy_container();
        renderer.create_visual(&wall(), SemanticType::Wall, LayerId::DEFAULT, None).unwrap();
        assert!(renderer.container().is_some());
    }
}
