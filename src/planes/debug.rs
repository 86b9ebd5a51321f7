//! Remote inspection of the plane registry.
//!
//! The registry lives on the owner thread and is not `Sync`-shared, so the
//! debug server never reads it directly. The owner publishes a
//! [`RegistrySnapshot`] after each refresh through [`DebugPublisher`]; the
//! [`RegistryDebugHandler`] answers from the latest published snapshot.
//! Refresh requests travel the other way as a flag the owner polls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use planes_debug::{
    DebugCommand, DebugHandler, DebugResponse, PlaneInfo, RefreshInfo, ResponseData, TypeCount,
};
use tokio::sync::watch;

use super::registry::{PlaneRegistry, RegistrySnapshot};
use super::renderer::PlaneRenderer;
use super::types::{SemanticMask, SemanticType};

/// Owner-side half: publishes snapshots and collects refresh requests.
pub struct DebugPublisher {
    snapshot_tx: watch::Sender<RegistrySnapshot>,
    refresh_requested: Arc<AtomicBool>,
}

/// Server-side half, handed to [`planes_debug::DebugServer`].
pub struct RegistryDebugHandler {
    snapshot_rx: watch::Receiver<RegistrySnapshot>,
    refresh_requested: Arc<AtomicBool>,
}

/// Create a connected publisher/handler pair.
pub fn debug_channel() -> (DebugPublisher, RegistryDebugHandler) {
    let (snapshot_tx, snapshot_rx) = watch::channel(RegistrySnapshot::default());
    let refresh_requested = Arc::new(AtomicBool::new(false));
    (
        DebugPublisher {
            snapshot_tx,
            refresh_requested: refresh_requested.clone(),
        },
        RegistryDebugHandler {
            snapshot_rx,
            refresh_requested,
        },
    )
}

impl DebugPublisher {
    /// Replace the published snapshot with the registry's current state.
    pub fn publish<R: PlaneRenderer>(&self, registry: &PlaneRegistry<R>) {
        self.snapshot_tx.send_replace(registry.snapshot());
    }

    /// True once per `RequestRefresh` command received since the last call.
    pub fn take_refresh_request(&self) -> bool {
        self.refresh_requested.swap(false, Ordering::AcqRel)
    }
}

fn parse_types(names: &[String]) -> Result<SemanticMask, String> {
    if names.is_empty() {
        return Ok(SemanticMask::ALL);
    }
    names
        .iter()
        .map(|name| {
            SemanticType::from_name(name).ok_or_else(|| format!("unknown plane type '{}'", name))
        })
        .collect()
}

fn as_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl DebugHandler for RegistryDebugHandler {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse {
        let snapshot = self.snapshot_rx.borrow();
        match cmd {
            DebugCommand::Ping => DebugResponse::pong(),

            DebugCommand::GetReferenceHeights => DebugResponse::ok(ResponseData::ReferenceHeights {
                floor_y: snapshot.heights.floor_y,
                ceiling_y: snapshot.heights.ceiling_y,
            }),

            DebugCommand::GetActivePlanes { types } => {
                let mask = match parse_types(&types) {
                    Ok(mask) => mask,
                    Err(msg) => return DebugResponse::error(msg),
                };
                let planes = snapshot
                    .planes
                    .iter()
                    .filter(|p| mask.contains(p.semantic))
                    .map(|p| PlaneInfo {
                        handle: p.handle,
                        semantic: p.semantic.name().to_string(),
                        center: p.center,
                        normal: p.normal,
                        area: p.area,
                        visible: p.visible,
                    })
                    .collect();
                DebugResponse::ok(ResponseData::ActivePlanes { planes })
            }

            DebugCommand::GetRegistryStats => {
                let per_type = SemanticType::ALL
                    .iter()
                    .map(|&semantic| TypeCount {
                        semantic: semantic.name().to_string(),
                        count: as_u32(snapshot.planes.iter().filter(|p| p.semantic == semantic).count()),
                    })
                    .collect();
                let report = snapshot.last_report;
                DebugResponse::ok(ResponseData::RegistryStats {
                    cycle: snapshot.cycle,
                    active: as_u32(snapshot.planes.len()),
                    visible: as_u32(snapshot.planes.iter().filter(|p| p.visible).count()),
                    per_type,
                    last_refresh: RefreshInfo {
                        destroyed: as_u32(report.destroyed),
                        installed: as_u32(report.installed),
                        discarded: as_u32(report.discarded),
                        failed: as_u32(report.failed),
                        rejected: as_u32(report.rejected),
                    },
                })
            }

            DebugCommand::RequestRefresh => {
                let already = self.refresh_requested.swap(true, Ordering::AcqRel);
                log::debug!("Refresh requested over debug connection (pending: {})", already);
                DebugResponse::ok(ResponseData::RefreshQueued { accepted: !already })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planes::classifier::{ClassifierSettings, classify};
    use crate::planes::config::PlaneConfig;
    use crate::planes::renderer::SceneGraphRenderer;
    use crate::planes::types::BoundedPlane;
    use glam::Vec3;

    fn room_registry() -> PlaneRegistry<SceneGraphRenderer> {
        let planes = vec![
            BoundedPlane::from_normal(Vec3::new(0.0, -1.5, 0.0), Vec3::Y, Vec3::new(3.0, 3.0, 0.0)),
            BoundedPlane::from_normal(Vec3::new(0.0, 1.2, 0.0), Vec3::NEG_Y, Vec3::new(3.0, 3.0, 0.0)),
            BoundedPlane::from_normal(Vec3::new(3.0, 0.0, 0.0), Vec3::NEG_X, Vec3::new(3.0, 1.4, 0.0)),
            BoundedPlane::from_normal(Vec3::new(1.0, -0.8, 1.0), Vec3::Y, Vec3::new(0.5, 0.5, 0.0)),
        ];
        let mut registry =
            PlaneRegistry::new(SceneGraphRenderer::new(), PlaneConfig::default()).unwrap();
        registry
            .refresh(classify(&planes, &ClassifierSettings::default()))
            .unwrap();
        registry
    }

    #[test]
    fn test_ping_before_publish() {
        let (_publisher, mut handler) = debug_channel();
        assert_eq!(handler.handle_command(DebugCommand::Ping), DebugResponse::pong());

        let stats = handler.handle_command(DebugCommand::GetRegistryStats);
        match stats {
            DebugResponse::Ok {
                data: ResponseData::RegistryStats { cycle, active, .. },
            } => {
                assert_eq!(cycle, 0);
                assert_eq!(active, 0);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_reference_heights_from_snapshot() {
        let (publisher, mut handler) = debug_channel();
        let registry = room_registry();
        publisher.publish(&registry);

        let response = handler.handle_command(DebugCommand::GetReferenceHeights);
        assert_eq!(
            response,
            DebugResponse::ok(ResponseData::ReferenceHeights {
                floor_y: -1.5,
                ceiling_y: 1.2,
            })
        );
    }

    #[test]
    fn test_active_planes_filter() {
        let (publisher, mut handler) = debug_channel();
        publisher.publish(&room_registry());

        let all = handler.handle_command(DebugCommand::GetActivePlanes { types: Vec::new() });
        let platforms = handler.handle_command(DebugCommand::GetActivePlanes {
            types: vec!["platform".into()],
        });

        match (all, platforms) {
            (
                DebugResponse::Ok { data: ResponseData::ActivePlanes { planes: all } },
                DebugResponse::Ok { data: ResponseData::ActivePlanes { planes: platforms } },
            ) => {
                assert_eq!(all.len(), 4);
                assert_eq!(platforms.len(), 1);
                assert_eq!(platforms[0].semantic, "platform");
                assert_eq!(platforms[0].center, [1.0, -0.8, 1.0]);
            }
            other => panic!("unexpected responses {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_name() {
        let (_publisher, mut handler) = debug_channel();
        let response = handler.handle_command(DebugCommand::GetActivePlanes {
            types: vec!["table".into()],
        });
        assert!(matches!(response, DebugResponse::Error { .. }));
    }

    #[test]
    fn test_registry_stats_counts() {
        let (publisher, mut handler) = debug_channel();
        publisher.publish(&room_registry());

        match handler.handle_command(DebugCommand::GetRegistryStats) {
            DebugResponse::Ok {
                data:
                    ResponseData::RegistryStats {
                        cycle,
                        active,
                        visible,
                        per_type,
                        last_refresh,
                    },
            } => {
                assert_eq!(cycle, 1);
                assert_eq!(active, 4);
                assert_eq!(visible, 4);
                assert_eq!(last_refresh.installed, 4);
                let count_of = |name: &str| {
                    per_type.iter().find(|t| t.semantic == name).map(|t| t.count)
                };
                assert_eq!(count_of("wall"), Some(1));
                assert_eq!(count_of("floor"), Some(1));
                assert_eq!(count_of("ceiling"), Some(1));
                assert_eq!(count_of("platform"), Some(1));
                assert_eq!(count_of("unknown"), Some(0));
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_refresh_request_flag() {
        let (publisher, mut handler) = debug_channel();
        assert!(!publisher.take_refresh_request());

        let first = handler.handle_command(DebugCommand::RequestRefresh);
        let second = handler.handle_command(DebugCommand::RequestRefresh);
        assert_eq!(first, DebugResponse::ok(ResponseData::RefreshQueued { accepted: true }));
        assert_eq!(second, DebugResponse::ok(ResponseData::RefreshQueued { accepted: false }));

        assert!(publisher.take_refresh_request());
        assert!(!publisher.take_refresh_request());
    }
}
