//! Background refresh pipeline: extract → classify → swap.
//!
//! Extraction and classification run on a tokio worker (inside
//! `spawn_blocking`, since both are compute-bound). The swap into the
//! [`PlaneRegistry`] happens on the owner thread when it calls
//! [`PlaneRefreshPipeline::poll`], because it mutates host-visible visuals.
//!
//! A refresh can be cancelled until its result is picked up by `poll`; the
//! worker checks the cancellation flag between stages. Once the swap starts
//! it runs to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::core::{Error, Result};

use super::classifier::{ClassificationResult, ClassifierSettings, classify};
use super::extractor::PlaneExtractor;
use super::registry::{PlaneRegistry, RefreshReport, RefreshTicket};
use super::renderer::PlaneRenderer;
use super::types::MeshData;

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Options captured from the registry config when a refresh is requested.
#[derive(Clone, Copy, Debug)]
struct JobSettings {
    snap_to_gravity_threshold_degrees: f32,
    min_area: f32,
    classifier: ClassifierSettings,
}

/// Work item sent to the worker.
struct RefreshJob {
    id: u64,
    meshes: Vec<MeshData>,
    settings: JobSettings,
    cancel: Arc<AtomicBool>,
}

enum JobOutcome {
    Classified(ClassificationResult),
    Cancelled,
    Failed(Error),
}

struct JobResult {
    id: u64,
    outcome: JobOutcome,
}

/// The refresh currently owned by the pipeline.
struct InFlight {
    id: u64,
    cancel: Arc<AtomicBool>,
    ticket: RefreshTicket,
}

/// Runs plane refreshes off the owner thread.
///
/// A result polled into a registry other than the one it was requested
/// from is refused by [`PlaneRegistry::apply`] and reported as an error.
pub struct PlaneRefreshPipeline {
    /// Channel for sending jobs to the worker
    request_tx: mpsc::UnboundedSender<RefreshJob>,
    /// Channel for receiving job results
    result_rx: mpsc::UnboundedReceiver<JobResult>,
    in_flight: Option<InFlight>,
    next_job: u64,
    /// Dedicated runtime (None when spawned on the caller's runtime)
    runtime: Option<Runtime>,
}

impl PlaneRefreshPipeline {
    /// Create a pipeline with its own single-worker tokio runtime.
    pub fn new(extractor: Arc<dyn PlaneExtractor>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("plane-refresh")
            .build()
            .map_err(|e| Error::Pipeline(format!("failed to create tokio runtime: {}", e)))?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        runtime.spawn(Self::worker_loop(extractor, request_rx, result_tx));

        Ok(Self {
            request_tx,
            result_rx,
            in_flight: None,
            next_job: 1,
            runtime: Some(runtime),
        })
    }

    /// Create a pipeline whose worker runs on the current tokio runtime.
    pub fn new_with_current_runtime(extractor: Arc<dyn PlaneExtractor>) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Pipeline(format!("no tokio runtime: {}", e)))?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        handle.spawn(Self::worker_loop(extractor, request_rx, result_tx));

        Ok(Self {
            request_tx,
            result_rx,
            in_flight: None,
            next_job: 1,
            runtime: None,
        })
    }

    /// Worker loop: one job at a time, results sent back to the owner.
    async fn worker_loop(
        extractor: Arc<dyn PlaneExtractor>,
        mut request_rx: mpsc::UnboundedReceiver<RefreshJob>,
        result_tx: mpsc::UnboundedSender<JobResult>,
    ) {
        while let Some(job) = request_rx.recv().await {
            let id = job.id;
            // Jobs cancelled while queued behind a slow one never reach the extractor
            if job.cancel.load(Ordering::Acquire) {
                log::debug!("Skipping plane refresh {}: cancelled before start", id);
                continue;
            }
            let extractor = Arc::clone(&extractor);
            let outcome = match tokio::task::spawn_blocking(move || Self::run_job(extractor.as_ref(), job)).await {
                Ok(outcome) => outcome,
                Err(e) => JobOutcome::Failed(Error::Pipeline(format!("refresh job {} panicked: {}", id, e))),
            };

            if result_tx.send(JobResult { id, outcome }).is_err() {
                // Owner dropped the pipeline
                break;
            }
        }
    }

    /// Stages (a) and (b): extraction then classification, with cancellation checks.
    fn run_job(extractor: &dyn PlaneExtractor, job: RefreshJob) -> JobOutcome {
        let cancelled = || job.cancel.load(Ordering::Acquire);
        if cancelled() {
            return JobOutcome::Cancelled;
        }

        let planes = match extractor.find_planes(
            &job.meshes,
            job.settings.snap_to_gravity_threshold_degrees,
            job.settings.min_area,
        ) {
            Ok(planes) => planes,
            Err(e) => return JobOutcome::Failed(e),
        };
        if cancelled() {
            return JobOutcome::Cancelled;
        }

        let result = classify(&planes, &job.settings.classifier);
        if cancelled() {
            return JobOutcome::Cancelled;
        }
        JobOutcome::Classified(result)
    }

    /// Start a refresh from a mesh snapshot.
    ///
    /// Returns `false` without doing anything if a refresh is already in
    /// flight, either in this pipeline or applied directly on the registry.
    pub fn request_refresh<R: PlaneRenderer>(
        &mut self,
        registry: &PlaneRegistry<R>,
        meshes: Vec<MeshData>,
    ) -> bool {
        if self.in_flight.is_some() {
            log::debug!("Plane refresh already in flight; request ignored");
            return false;
        }
        let Some(ticket) = registry.begin_refresh() else {
            log::debug!("Plane registry busy; request ignored");
            return false;
        };

        let config = registry.config();
        let id = self.next_job;
        self.next_job += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let job = RefreshJob {
            id,
            meshes,
            settings: JobSettings {
                snap_to_gravity_threshold_degrees: config.snap_to_gravity_threshold_degrees,
                min_area: config.min_area,
                classifier: config.classifier_settings(),
            },
            cancel: Arc::clone(&cancel),
        };

        if self.request_tx.send(job).is_err() {
            log::error!("Plane refresh worker is gone; request {} dropped", id);
            return false;
        }

        self.in_flight = Some(InFlight { id, cancel, ticket });
        true
    }

    /// Cancel the in-flight refresh, if any. The registry returns to idle
    /// immediately and the worker's eventual result is discarded.
    pub fn cancel(&mut self) -> bool {
        match self.in_flight.take() {
            Some(in_flight) => {
                in_flight.cancel.store(true, Ordering::Release);
                log::debug!("Plane refresh {} cancelled", in_flight.id);
                true
            }
            None => false,
        }
    }

    /// Whether a refresh is waiting on the worker.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Stage (c), on the owner thread: apply a finished refresh.
    ///
    /// Returns `None` if nothing finished since the last call.
    pub fn poll<R: PlaneRenderer>(
        &mut self,
        registry: &mut PlaneRegistry<R>,
    ) -> Option<Result<RefreshReport>> {
        while let Ok(result) = self.result_rx.try_recv() {
            let Some(in_flight) = self.in_flight.take_if(|f| f.id == result.id) else {
                log::debug!("Dropping stale plane refresh result {}", result.id);
                continue;
            };

            match result.outcome {
                JobOutcome::Classified(classified) => {
                    return Some(registry.apply(in_flight.ticket, classified));
                }
                JobOutcome::Cancelled => {
                    log::debug!("Plane refresh {} stopped after cancellation", result.id);
                }
                JobOutcome::Failed(e) => {
                    log::error!("Plane refresh {} failed: {}", result.id, e);
                    return Some(Err(e));
                }
            }
        }
        None
    }

    /// Block the owner thread until the in-flight refresh is applied, fails,
    /// or `timeout` elapses.
    pub fn wait_for_refresh<R: PlaneRenderer>(
        &mut self,
        registry: &mut PlaneRegistry<R>,
        timeout: Duration,
    ) -> Option<Result<RefreshReport>> {
        let deadline = Instant::now() + timeout;
        while self.in_flight.is_some() {
            if let Some(result) = self.poll(registry) {
                return Some(result);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        None
    }
}

impl Drop for PlaneRefreshPipeline {
    fn drop(&mut self) {
        self.cancel();
        // Don't block on a worker that is mid-job
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc as std_mpsc;

    use glam::Vec3;

    use crate::planes::config::PlaneConfig;
    use crate::planes::extractor::PrecomputedPlanes;
    use crate::planes::renderer::SceneGraphRenderer;
    use crate::planes::types::{BoundedPlane, SemanticMask};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn room_planes() -> Vec<BoundedPlane> {
        vec![
            BoundedPlane::from_normal(Vec3::new(0.0, -1.4, 0.0), Vec3::Y, Vec3::new(3.0, 3.0, 0.0)),
            BoundedPlane::from_normal(Vec3::new(0.0, 1.3, 0.0), Vec3::NEG_Y, Vec3::new(3.0, 3.0, 0.0)),
            BoundedPlane::from_normal(Vec3::new(3.0, 0.0, 0.0), Vec3::NEG_X, Vec3::new(3.0, 1.4, 0.0)),
        ]
    }

    fn registry() -> PlaneRegistry<SceneGraphRenderer> {
        PlaneRegistry::new(SceneGraphRenderer::new(), PlaneConfig::default()).unwrap()
    }

    /// Extractor that blocks until the test releases it.
    struct GatedExtractor {
        gate: Mutex<std_mpsc::Receiver<()>>,
        inner: PrecomputedPlanes,
        calls: AtomicUsize,
    }

    impl GatedExtractor {
        fn new(planes: Vec<BoundedPlane>) -> (Self, std_mpsc::Sender<()>) {
            let (tx, rx) = std_mpsc::channel();
            let extractor = Self {
                gate: Mutex::new(rx),
                inner: PrecomputedPlanes::new(planes),
                calls: AtomicUsize::new(0),
            };
            (extractor, tx)
        }
    }

    impl PlaneExtractor for GatedExtractor {
        fn find_planes(&self, meshes: &[MeshData], snap: f32, min_area: f32) -> Result<Vec<BoundedPlane>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.lock().unwrap().recv().unwrap();
            self.inner.find_planes(meshes, snap, min_area)
        }
    }

    struct FailingExtractor;

    impl PlaneExtractor for FailingExtractor {
        fn find_planes(&self, _: &[MeshData], _: f32, _: f32) -> Result<Vec<BoundedPlane>> {
            Err(Error::Extraction("spatial mapping unavailable".into()))
        }
    }

    #[test]
    fn test_refresh_round_trip() {
        let mut pipeline = PlaneRefreshPipeline::new(Arc::new(PrecomputedPlanes::new(room_planes()))).unwrap();
        let mut registry = registry();
        let mut completions = registry.subscribe();

        assert!(pipeline.request_refresh(&registry, vec![MeshData::default()]));
        assert!(registry.is_refreshing());

        let report = pipeline.wait_for_refresh(&mut registry, TIMEOUT).unwrap().unwrap();
        assert_eq!(report.installed, 3);
        assert_eq!(registry.count(SemanticMask::ALL), 3);
        assert_eq!(registry.floor_y(), -1.4);
        assert_eq!(registry.ceiling_y(), 1.3);
        assert!(!registry.is_refreshing());
        assert!(!pipeline.is_busy());
        assert!(completions.try_recv().is_ok());
    }

    #[test]
    fn test_second_request_rejected_while_in_flight() {
        let (extractor, gate) = GatedExtractor::new(room_planes());
        let mut pipeline = PlaneRefreshPipeline::new(Arc::new(extractor)).unwrap();
        let mut registry = registry();

        assert!(pipeline.request_refresh(&registry, Vec::new()));
        assert!(!pipeline.request_refresh(&registry, Vec::new()));

        gate.send(()).unwrap();
        let report = pipeline.wait_for_refresh(&mut registry, TIMEOUT).unwrap().unwrap();
        assert_eq!(report.installed, 3);
        assert_eq!(registry.cycle(), 1);
    }

    #[test]
    fn test_registry_busy_rejects_request() {
        let mut pipeline = PlaneRefreshPipeline::new(Arc::new(PrecomputedPlanes::default())).unwrap();
        let registry = registry();

        let _ticket = registry.begin_refresh().unwrap();
        assert!(!pipeline.request_refresh(&registry, Vec::new()));
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn test_cancel_discards_result() {
        let (extractor, gate) = GatedExtractor::new(room_planes());
        let mut pipeline = PlaneRefreshPipeline::new(Arc::new(extractor)).unwrap();
        let mut registry = registry();

        assert!(pipeline.request_refresh(&registry, Vec::new()));
        assert!(pipeline.cancel());
        assert!(!registry.is_refreshing());
        assert!(!pipeline.cancel());

        // Let the cancelled job finish; its result must not be applied
        gate.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            assert!(pipeline.poll(&mut registry).is_none());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(registry.cycle(), 0);
        assert_eq!(registry.count(SemanticMask::ALL), 0);

        // A new refresh goes through normally
        assert!(pipeline.request_refresh(&registry, Vec::new()));
        gate.send(()).unwrap();
        let report = pipeline.wait_for_refresh(&mut registry, TIMEOUT).unwrap().unwrap();
        assert_eq!(report.installed, 3);
        assert_eq!(registry.cycle(), 1);
    }

    #[test]
    fn test_cancelled_queued_jobs_skip_extraction() {
        let (extractor, gate) = GatedExtractor::new(room_planes());
        let extractor = Arc::new(extractor);
        let mut pipeline = PlaneRefreshPipeline::new(extractor.clone()).unwrap();
        let mut registry = registry();

        // First job blocks inside the extractor
        assert!(pipeline.request_refresh(&registry, Vec::new()));
        let deadline = Instant::now() + TIMEOUT;
        while extractor.calls.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "extractor never started");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(pipeline.cancel());

        // Second job queues behind it and is cancelled before it starts
        assert!(pipeline.request_refresh(&registry, Vec::new()));
        assert!(pipeline.cancel());

        assert!(pipeline.request_refresh(&registry, Vec::new()));
        gate.send(()).unwrap();
        gate.send(()).unwrap();
        let report = pipeline.wait_for_refresh(&mut registry, TIMEOUT).unwrap().unwrap();
        assert_eq!(report.installed, 3);
        assert_eq!(registry.cycle(), 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_result_for_other_registry_is_refused() {
        let mut pipeline = PlaneRefreshPipeline::new(Arc::new(PrecomputedPlanes::new(room_planes()))).unwrap();
        let owner = registry();
        let mut other = registry();

        assert!(pipeline.request_refresh(&owner, Vec::new()));
        let result = pipeline.wait_for_refresh(&mut other, TIMEOUT).unwrap();
        assert!(matches!(result, Err(Error::Pipeline(_))));
        assert_eq!(other.cycle(), 0);
        assert_eq!(other.count(SemanticMask::ALL), 0);
        assert!(!owner.is_refreshing());
    }

    #[test]
    fn test_extraction_failure_leaves_registry_idle() {
        let mut pipeline = PlaneRefreshPipeline::new(Arc::new(FailingExtractor)).unwrap();
        let mut registry = registry();

        assert!(pipeline.request_refresh(&registry, Vec::new()));
        let result = pipeline.wait_for_refresh(&mut registry, TIMEOUT).unwrap();
        assert!(matches!(result, Err(Error::Extraction(_))));
        assert!(!registry.is_refreshing());
        assert_eq!(registry.cycle(), 0);
    }

    #[test]
    fn test_uses_registry_config() {
        let config = PlaneConfig {
            min_area: 20.0,
            ..Default::default()
        };
        let mut pipeline = PlaneRefreshPipeline::new(Arc::new(PrecomputedPlanes::new(room_planes()))).unwrap();
        let mut registry = PlaneRegistry::new(SceneGraphRenderer::new(), config).unwrap();

        assert!(pipeline.request_refresh(&registry, Vec::new()));
        let report = pipeline.wait_for_refresh(&mut registry, TIMEOUT).unwrap().unwrap();
        // Only the 36 m² floor and ceiling clear the 20 m² minimum
        assert_eq!(report.installed, 2);
    }

    #[test]
    fn test_current_runtime_constructor() {
        assert!(PlaneRefreshPipeline::new_with_current_runtime(Arc::new(PrecomputedPlanes::default())).is_err());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let mut pipeline =
            PlaneRefreshPipeline::new_with_current_runtime(Arc::new(PrecomputedPlanes::new(room_planes()))).unwrap();
        let mut registry = registry();

        assert!(pipeline.request_refresh(&registry, Vec::new()));
        let report = pipeline.wait_for_refresh(&mut registry, TIMEOUT).unwrap().unwrap();
        assert_eq!(report.installed, 3);
    }
}
