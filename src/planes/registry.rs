//! Registry of the currently active classified planes.
//!
//! A refresh replaces the whole active set: every visual from the previous
//! cycle is destroyed before any visual of the new cycle is created, so two
//! plane sets are never visible at once. Only one refresh may be in flight;
//! the in-flight state is an atomic flag claimed through [`RefreshTicket`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::{Error, Result};

use super::classifier::{ClassificationResult, ReferenceHeights};
use super::config::PlaneConfig;
use super::renderer::{PlaneRenderer, VisualHandle};
use super::types::{ClassifiedPlane, SemanticMask, SemanticType};

/// Buffered completion notifications per subscriber.
const COMPLETION_CHANNEL_CAPACITY: usize = 16;

/// Emitted once per applied refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshComplete;

/// Exclusive right to apply one refresh.
///
/// Holding a ticket keeps the registry in the refreshing state; dropping it
/// without applying (e.g. on cancellation) returns the registry to idle.
#[derive(Debug)]
pub struct RefreshTicket {
    flag: Arc<AtomicBool>,
}

impl Drop for RefreshTicket {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What happened during one applied refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Visuals destroyed from the previous cycle
    pub destroyed: usize,
    /// Planes registered in this cycle
    pub installed: usize,
    /// Planes dropped because their type is in the discard mask
    pub discarded: usize,
    /// Planes whose visual could not be created
    pub failed: usize,
    /// Malformed planes the classifier rejected
    pub rejected: usize,
}

/// Result of [`PlaneRegistry::refresh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied(RefreshReport),
    /// Another refresh was in progress; nothing changed
    Skipped,
}

/// One registered plane.
#[derive(Clone, Copy, Debug)]
pub struct ActivePlane {
    pub plane: ClassifiedPlane,
    pub handle: VisualHandle,
    pub visible: bool,
}

/// Serializable summary of the registry state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub cycle: u64,
    pub heights: ReferenceHeights,
    pub planes: Vec<PlaneSummary>,
    pub last_report: RefreshReport,
}

/// Serializable view of one active plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneSummary {
    pub handle: u64,
    pub semantic: SemanticType,
    pub center: [f32; 3],
    pub normal: [f32; 3],
    pub area: f32,
    pub visible: bool,
}

/// Owns the active set of classified planes and their visuals.
///
/// All mutation happens on the owner thread through `&mut self`; queries
/// take `&self`.
pub struct PlaneRegistry<R: PlaneRenderer> {
    renderer: R,
    config: PlaneConfig,
    active: Vec<ActivePlane>,
    heights: ReferenceHeights,
    refreshing: Arc<AtomicBool>,
    completion: broadcast::Sender<RefreshComplete>,
    cycle: u64,
    last_report: RefreshReport,
}

impl<R: PlaneRenderer> PlaneRegistry<R> {
    /// Create an empty registry. The configuration is validated here.
    pub fn new(renderer: R, config: PlaneConfig) -> Result<Self> {
        config.validate()?;
        let (completion, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Ok(Self {
            renderer,
            config,
            active: Vec::new(),
            heights: ReferenceHeights::default(),
            refreshing: Arc::new(AtomicBool::new(false)),
            completion,
            cycle: 0,
            last_report: RefreshReport::default(),
        })
    }

    /// Claim the refreshing state. Returns `None` if a refresh is already in flight.
    pub fn begin_refresh(&self) -> Option<RefreshTicket> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshTicket {
                flag: Arc::clone(&self.refreshing),
            })
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Swap in a freshly classified set.
    ///
    /// Runs to completion once started: all previous visuals are destroyed,
    /// then one visual is created per new plane not in the discard mask.
    /// Visual creation failures skip that plane. If every creation fails the
    /// registry is left empty and consistent, completion is still signalled,
    /// and [`Error::RefreshFailed`] is returned.
    ///
    /// A ticket issued by a different registry is refused with
    /// [`Error::Pipeline`] before anything is destroyed.
    pub fn apply(&mut self, ticket: RefreshTicket, result: ClassificationResult) -> Result<RefreshReport> {
        if !Arc::ptr_eq(&ticket.flag, &self.refreshing) {
            return Err(Error::Pipeline(
                "refresh ticket was issued by another registry".into(),
            ));
        }

        let mut report = RefreshReport {
            destroyed: self.destroy_active(),
            rejected: result.rejected,
            ..Default::default()
        };

        self.heights = result.heights;
        let layer = self.config.layer;
        let draw_mask = self.config.draw_mask;
        let discard_mask = self.config.discard_mask;

        for classified in result.planes {
            if discard_mask.contains(classified.semantic) {
                report.discarded += 1;
                continue;
            }

            let material = self.config.materials.get(classified.semantic);
            match self
                .renderer
                .create_visual(&classified.plane, classified.semantic, layer, material)
            {
                Ok(handle) => {
                    let visible = draw_mask.contains(classified.semantic);
                    self.renderer.set_visible(handle, visible);
                    self.active.push(ActivePlane {
                        plane: classified,
                        handle,
                        visible,
                    });
                    report.installed += 1;
                }
                Err(e) => {
                    log::warn!("Skipping {} plane visual: {}", classified.semantic, e);
                    report.failed += 1;
                }
            }
        }

        self.cycle += 1;
        self.last_report = report;
        drop(ticket);

        log::info!(
            "Plane refresh {}: {} installed, {} discarded, {} failed, {} rejected (floor_y={:.3}, ceiling_y={:.3})",
            self.cycle,
            report.installed,
            report.discarded,
            report.failed,
            report.rejected,
            self.heights.floor_y,
            self.heights.ceiling_y
        );

        // No subscribers is fine
        let _ = self.completion.send(RefreshComplete);

        if report.installed == 0 && report.failed > 0 {
            log::error!("Every plane visual failed in refresh {}", self.cycle);
            return Err(Error::RefreshFailed {
                failed: report.failed,
            });
        }
        Ok(report)
    }

    /// Claim the refreshing state and apply `result` in one step.
    /// Returns [`RefreshOutcome::Skipped`] while another refresh is in flight.
    pub fn refresh(&mut self, result: ClassificationResult) -> Result<RefreshOutcome> {
        match self.begin_refresh() {
            Some(ticket) => self.apply(ticket, result).map(RefreshOutcome::Applied),
            None => {
                log::debug!("Refresh requested while another is in progress; ignored");
                Ok(RefreshOutcome::Skipped)
            }
        }
    }

    /// Destroy every active visual and the parent container. Idempotent.
    pub fn teardown(&mut self) {
        let destroyed = self.destroy_active();
        self.renderer.destroy_container();
        if destroyed > 0 {
            log::debug!("Plane registry teardown destroyed {} visuals", destroyed);
        }
    }

    fn destroy_active(&mut self) -> usize {
        let count = self.active.len();
        for active in self.active.drain(..) {
            self.renderer.destroy_visual(active.handle);
        }
        count
    }

    /// Change which types are visible and re-apply visibility to the active set.
    pub fn set_draw_mask(&mut self, mask: SemanticMask) {
        self.config.draw_mask = mask;
        for active in &mut self.active {
            let visible = mask.contains(active.plane.semantic);
            if visible != active.visible {
                self.renderer.set_visible(active.handle, visible);
                active.visible = visible;
            }
        }
    }

    /// Handles of active planes whose type is contained in `mask`.
    pub fn active_planes(&self, mask: SemanticMask) -> Vec<VisualHandle> {
        self.planes(mask).map(|p| p.handle).collect()
    }

    /// Active plane records whose type is contained in `mask`.
    pub fn planes(&self, mask: SemanticMask) -> impl Iterator<Item = &ActivePlane> {
        self.active
            .iter()
            .filter(move |p| mask.contains(p.plane.semantic))
    }

    /// Number of active planes whose type is contained in `mask`.
    pub fn count(&self, mask: SemanticMask) -> usize {
        self.planes(mask).count()
    }

    /// Height of the floor found by the last refresh (0.0 if none).
    pub fn floor_y(&self) -> f32 {
        self.heights.floor_y
    }

    /// Height of the ceiling found by the last refresh (0.0 if none).
    pub fn ceiling_y(&self) -> f32 {
        self.heights.ceiling_y
    }

    pub fn heights(&self) -> ReferenceHeights {
        self.heights
    }

    /// Number of refreshes applied so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn last_report(&self) -> RefreshReport {
        self.last_report
    }

    pub fn config(&self) -> &PlaneConfig {
        &self.config
    }

    /// Receive one [`RefreshComplete`] per applied refresh from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshComplete> {
        self.completion.subscribe()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Serializable summary of the current state.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            cycle: self.cycle,
            heights: self.heights,
            planes: self
                .active
                .iter()
                .map(|a| PlaneSummary {
                    handle: a.handle.0,
                    semantic: a.plane.semantic,
                    center: a.plane.plane.center.to_array(),
                    normal: a.plane.plane.normal.to_array(),
                    area: a.plane.plane.area,
                    visible: a.visible,
                })
                .collect(),
            last_report: self.last_report,
        }
    }
}

impl<R: PlaneRenderer> Drop for PlaneRegistry<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
