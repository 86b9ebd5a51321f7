//! Scene graph: CPU-side hierarchy of plane nodes.
//!
//! The scene graph organizes plane visuals into groups with parent/child
//! relationships. `flatten()` walks the tree and produces a flat
//! `Vec<FlatPlaneEntry>` for whatever draws the quads.

use std::collections::HashMap;

use glam::Mat4;

use super::flatten::FlatPlaneEntry;
use super::node::{LayerId, LocalTransform, NodeContent, SceneNode, SceneNodeId};

/// CPU-side scene graph.
pub struct SceneGraph {
    nodes: HashMap<SceneNodeId, SceneNode>,
    root: SceneNodeId,
    next_id: u64,
    dirty: bool,
}

impl SceneGraph {
    /// Create a new scene graph with a root Group node.
    pub fn new() -> Self {
        let root_id = SceneNodeId(0);
        let root_node = SceneNode::new(root_id, "root", LayerId::DEFAULT, NodeContent::Group);

        let mut nodes = HashMap::new();
        nodes.insert(root_id, root_node);

        Self {
            nodes,
            root: root_id,
            next_id: 1,
            dirty: true,
        }
    }

    /// Get the root node ID.
    pub fn root(&self) -> SceneNodeId {
        self.root
    }

    /// Allocate a fresh node ID. IDs are never reused.
    fn alloc_id(&mut self) -> SceneNodeId {
        let id = SceneNodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a child node under `parent`. Returns `None` if the parent does not exist.
    pub fn add_child(
        &mut self,
        parent: SceneNodeId,
        name: impl Into<String>,
        layer: LayerId,
        content: NodeContent,
    ) -> Option<SceneNodeId> {
        let id = self.alloc_id();
        let parent_node = self.nodes.get_mut(&parent)?;
        parent_node.children.push(id);

        let mut node = SceneNode::new(id, name, layer, content);
        node.parent = Some(parent);
        self.nodes.insert(id, node);

        self.dirty = true;
        Some(id)
    }

    /// Remove a node and its entire subtree. Cannot remove the root.
    /// Returns the number of nodes removed.
    pub fn remove(&mut self, id: SceneNodeId) -> usize {
        if id == self.root || !self.nodes.contains_key(&id) {
            return 0;
        }

        // Collect subtree IDs (BFS)
        let mut to_remove = vec![id];
        let mut i = 0;
        while i < to_remove.len() {
            let current = to_remove[i];
            if let Some(node) = self.nodes.get(&current) {
                to_remove.extend_from_slice(&node.children);
            }
            i += 1;
        }

        // Detach from parent
        if let Some(parent_id) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|c| *c != id);
            }
        }

        let mut removed = 0;
        for nid in to_remove {
            if self.nodes.remove(&nid).is_some() {
                removed += 1;
            }
        }

        self.dirty = true;
        removed
    }

    /// Set the local transform of a node.
    pub fn set_transform(&mut self, id: SceneNodeId, transform: LocalTransform) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local_transform = transform;
            self.dirty = true;
        }
    }

    /// Set the visibility of a node. Returns false if the node does not exist.
    pub fn set_visible(&mut self, id: SceneNodeId, visible: bool) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.visible = visible;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Get an immutable reference to a node.
    pub fn get(&self, id: SceneNodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    /// Whether a node with this ID exists.
    pub fn contains(&self, id: SceneNodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterate over the children of a node.
    pub fn children(&self, id: SceneNodeId) -> impl Iterator<Item = SceneNodeId> + '_ {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    /// Total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph changed since the last `flatten()`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Walk the tree, propagate transforms, and collect all visible planes.
    pub fn flatten(&mut self) -> Vec<FlatPlaneEntry> {
        self.propagate_transforms(self.root, Mat4::IDENTITY);

        let mut out = Vec::new();
        self.collect_visible(self.root, &mut out);
        self.dirty = false;
        out
    }

    /// Recursively propagate world transforms.
    fn propagate_transforms(&mut self, node_id: SceneNodeId, parent_world: Mat4) {
        let (local_mat, children) = {
            let node = match self.nodes.get(&node_id) {
                Some(n) => n,
                None => return,
            };
            (node.local_transform.to_mat4(), node.children.clone())
        };

        let world = parent_world * local_mat;

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.world_transform = world;
        }

        for child_id in children {
            self.propagate_transforms(child_id, world);
        }
    }

    /// Recursively collect visible planes. Hidden nodes hide their subtree.
    fn collect_visible(&self, node_id: SceneNodeId, out: &mut Vec<FlatPlaneEntry>) {
        let node = match self.nodes.get(&node_id) {
            Some(n) => n,
            None => return,
        };

        if !node.visible {
            return;
        }

        if let NodeContent::Plane {
            half_extents,
            semantic,
            material,
        } = &node.content
        {
            out.push(FlatPlaneEntry {
                node: node.id,
                world_transform: node.world_transform,
                half_extents: *half_extents,
                semantic: *semantic,
                material: material.clone(),
                layer: node.layer,
            });
        }

        for &child_id in &node.children {
            self.collect_visible(child_id, out);
        }
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
