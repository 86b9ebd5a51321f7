//! Plane extraction boundary.
//!
//! Grouping mesh triangles into bounded planes lives outside this crate;
//! [`PlaneExtractor`] is the seam a host plugs its extractor into.

use crate::core::Result;

use super::types::{BoundedPlane, MeshData};

/// Produces bounded planes from a snapshot of meshes.
///
/// Implementations run on the refresh worker, so they must be `Send + Sync`
/// and must not retain the mesh slice.
pub trait PlaneExtractor: Send + Sync + 'static {
    /// Find planes of at least `min_area`, snapping near-horizontal planes
    /// within `snap_to_gravity_threshold_degrees` of vertical to ±Y.
    fn find_planes(
        &self,
        meshes: &[MeshData],
        snap_to_gravity_threshold_degrees: f32,
        min_area: f32,
    ) -> Result<Vec<BoundedPlane>>;
}

/// Extractor over a fixed list of planes computed elsewhere.
///
/// The meshes are ignored; the stored planes are filtered by `min_area` and
/// snapped toward gravity on every call.
#[derive(Clone, Debug, Default)]
pub struct PrecomputedPlanes {
    planes: Vec<BoundedPlane>,
}

impl PrecomputedPlanes {
    pub fn new(planes: Vec<BoundedPlane>) -> Self {
        Self { planes }
    }

    /// The stored planes, unfiltered.
    pub fn planes(&self) -> &[BoundedPlane] {
        &self.planes
    }
}

impl PlaneExtractor for PrecomputedPlanes {
    fn find_planes(
        &self,
        _meshes: &[MeshData],
        snap_to_gravity_threshold_degrees: f32,
        min_area: f32,
    ) -> Result<Vec<BoundedPlane>> {
        Ok(self
            .planes
            .iter()
            // NaN areas pass through so the classifier can report them
            .filter(|p| !(p.area < min_area))
            .map(|p| p.snapped_to_gravity(snap_to_gravity_threshold_degrees))
            .collect())
    }
}
