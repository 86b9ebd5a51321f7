//! Surface planes - semantic classification of detected planes
//!
//! Bounded planes from a spatial-mapping extractor are labelled as floor,
//! ceiling, wall, platform or unknown relative to the largest floor and
//! ceiling found, then installed as visuals in a [`planes::PlaneRegistry`].

pub mod core;
pub mod scene;
pub mod planes;
