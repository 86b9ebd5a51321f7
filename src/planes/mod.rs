//! Plane classification and the active plane registry

pub mod types;
pub mod classifier;
pub mod extractor;
pub mod config;
pub mod renderer;
pub mod registry;
pub mod pipeline;
pub mod debug;

pub use types::{BoundedPlane, ClassifiedPlane, MeshData, SemanticMask, SemanticType};
pub use classifier::{
    ClassificationResult, ClassifierSettings, ReferenceHeights,
    classify, classify_plane, find_reference_heights,
};
pub use extractor::{PlaneExtractor, PrecomputedPlanes};
pub use config::{PlaneConfig, PlaneMaterials};
pub use renderer::{PlaneRenderer, SceneGraphRenderer, VisualHandle, CONTAINER_NAME};
pub use registry::{
    ActivePlane, PlaneRegistry, PlaneSummary, RefreshComplete, RefreshOutcome,
    RefreshReport, RefreshTicket, RegistrySnapshot,
};
pub use pipeline::PlaneRefreshPipeline;
pub use debug::{DebugPublisher, RegistryDebugHandler, debug_channel};
