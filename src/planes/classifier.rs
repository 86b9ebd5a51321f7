//! Semantic classification of bounded planes.
//!
//! Classification runs in two passes over an immutable input slice:
//!
//! 1. Reference height discovery: the largest upward-facing horizontal plane
//!    below the origin sets `floor_y`, the largest downward-facing one above
//!    the origin sets `ceiling_y`.
//! 2. Per-plane type assignment against those references.
//!
//! The computation is pure, so it can run on a worker thread as long as the
//! caller hands it a snapshot nobody else mutates.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::{BoundedPlane, ClassifiedPlane, SemanticType};

/// Inputs above this size classify Pass 2 on the rayon pool.
const PARALLEL_THRESHOLD: usize = 256;

/// Thresholds used by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Minimum `|normal.y|` for a plane to count as horizontal.
    /// Expected in (0.5, 1.0].
    pub up_normal_threshold: f32,
    /// Height above `floor_y` still considered floor
    pub floor_buffer: f32,
    /// Depth below `ceiling_y` still considered ceiling
    pub ceiling_buffer: f32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            up_normal_threshold: 0.9,
            floor_buffer: 0.1,
            ceiling_buffer: 0.1,
        }
    }
}

/// Floor and ceiling heights discovered by one classification pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceHeights {
    pub floor_y: f32,
    pub ceiling_y: f32,
}

/// Output of [`classify`].
#[derive(Clone, Debug, Default)]
pub struct ClassificationResult {
    /// Classified planes in input order (malformed planes omitted)
    pub planes: Vec<ClassifiedPlane>,
    pub heights: ReferenceHeights,
    /// Number of malformed input planes that were skipped
    pub rejected: usize,
}

impl ClassificationResult {
    /// Number of planes of the given type.
    pub fn count(&self, semantic: SemanticType) -> usize {
        self.planes.iter().filter(|p| p.semantic == semantic).count()
    }
}

/// Running argmax-by-area. Ties keep the first candidate seen.
#[derive(Default)]
struct LargestCandidate {
    area: f32,
    height: Option<f32>,
}

impl LargestCandidate {
    fn offer(&mut self, plane: &BoundedPlane) {
        if self.height.is_none() || plane.area > self.area {
            self.area = plane.area;
            self.height = Some(plane.vertical_position());
        }
    }

    fn height_or_origin(&self) -> f32 {
        self.height.unwrap_or(0.0)
    }
}

/// Pass 1: find the floor and ceiling reference heights.
///
/// Planes are assumed well formed; [`classify`] filters the rest out first.
pub fn find_reference_heights<'a>(
    planes: impl IntoIterator<Item = &'a BoundedPlane>,
    up_normal_threshold: f32,
) -> ReferenceHeights {
    let mut floor = LargestCandidate::default();
    let mut ceiling = LargestCandidate::default();

    for plane in planes {
        let y = plane.vertical_position();
        if y < 0.0 && plane.normal.y >= up_normal_threshold {
            floor.offer(plane);
        } else if y > 0.0 && plane.normal.y <= -up_normal_threshold {
            ceiling.offer(plane);
        }
    }

    ReferenceHeights {
        floor_y: floor.height_or_origin(),
        ceiling_y: ceiling.height_or_origin(),
    }
}

/// Pass 2: assign a semantic type to one plane.
///
/// The bands are tested in a fixed order (up, down, vertical), so a plane
/// always gets exactly one type even when a threshold below 0.5 makes the
/// bands overlap.
pub fn classify_plane(
    plane: &BoundedPlane,
    heights: &ReferenceHeights,
    settings: &ClassifierSettings,
) -> SemanticType {
    let threshold = settings.up_normal_threshold;
    let ny = plane.normal.y;
    let y = plane.vertical_position();

    if ny >= threshold {
        if y > heights.floor_y + settings.floor_buffer {
            SemanticType::Platform
        } else {
            SemanticType::Floor
        }
    } else if ny <= -threshold {
        if y < heights.ceiling_y - settings.ceiling_buffer {
            SemanticType::Platform
        } else {
            SemanticType::Ceiling
        }
    } else if ny.abs() <= 1.0 - threshold {
        SemanticType::Wall
    } else {
        SemanticType::Unknown
    }
}

/// Classify a set of planes.
///
/// Malformed planes (non-finite values, non-positive area, non-unit normal)
/// are logged, counted in [`ClassificationResult::rejected`] and left out of
/// both passes. The rest of the set is still classified.
pub fn classify(planes: &[BoundedPlane], settings: &ClassifierSettings) -> ClassificationResult {
    let mut valid = Vec::with_capacity(planes.len());
    let mut rejected = 0;
    for (index, plane) in planes.iter().enumerate() {
        match plane.validate() {
            Ok(()) => valid.push(plane),
            Err(e) => {
                log::warn!("Skipping plane {}: {}", index, e);
                rejected += 1;
            }
        }
    }

    let heights = find_reference_heights(valid.iter().copied(), settings.up_normal_threshold);
    log::debug!(
        "Reference heights: floor_y={:.3}, ceiling_y={:.3} ({} planes, {} rejected)",
        heights.floor_y,
        heights.ceiling_y,
        valid.len(),
        rejected
    );

    let assign = |plane: &&BoundedPlane| ClassifiedPlane {
        plane: **plane,
        semantic: classify_plane(plane, &heights, settings),
    };
    let classified = if valid.len() >= PARALLEL_THRESHOLD {
        valid.par_iter().map(assign).collect()
    } else {
        valid.iter().map(assign).collect()
    };

    ClassificationResult {
        planes: classified,
        heights,
        rejected,
    }
}
