//! CPU-side scene graph backing plane visuals

pub mod flatten;
pub mod graph;
pub mod node;

pub use flatten::FlatPlaneEntry;
pub use graph::SceneGraph;
pub use node::{LayerId, LocalTransform, NodeContent, SceneNode, SceneNodeId};
