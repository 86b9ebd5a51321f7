//! Classify a set of bounded planes and install them into a scene graph.
//!
//! Usage:
//!   surface-planes --input planes.json [--config config.json] [--debug-port 9743]
//!   surface-planes --write-config config.json
//!
//! With `--debug-port` the process stays up after the first refresh and
//! answers debug commands; `RequestRefresh` re-runs classification.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use surface_planes::core::{Error, Result, logging};
use surface_planes::planes::{
    BoundedPlane, DebugPublisher, PlaneConfig, PlaneRefreshPipeline, PlaneRegistry, PlaneRenderer,
    PrecomputedPlanes, RefreshReport, RegistryDebugHandler, SceneGraphRenderer, SemanticMask,
    SemanticType, debug_channel,
};

const USAGE: &str =
    "Usage: surface-planes --input <planes.json> [--config <config.json>] [--debug-port <port>]";
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
const HOST_TICK: Duration = Duration::from_millis(50);

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    if let Some(path) = parse_str_arg(args, "--write-config") {
        PlaneConfig::default().save(&path)?;
        println!("Wrote default config to {}", path);
        return Ok(());
    }

    let input = parse_str_arg(args, "--input")
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config(USAGE.into()))?;
    let config = match parse_str_arg(args, "--config") {
        Some(path) => PlaneConfig::load(path)?,
        None => PlaneConfig::default(),
    };
    let debug_port = parse_port_arg(args, "--debug-port")?;

    let planes = load_planes(&input)?;
    println!("=== Surface Planes ===");
    println!("Input:  {} ({} planes)", input.display(), planes.len());
    println!(
        "Config: threshold {}, floor buffer {}m, ceiling buffer {}m, min area {}m²",
        config.up_normal_threshold, config.floor_buffer, config.ceiling_buffer, config.min_area
    );
    println!();

    let extractor = Arc::new(PrecomputedPlanes::new(planes));
    let mut pipeline = PlaneRefreshPipeline::new(extractor)?;
    let mut registry = PlaneRegistry::new(SceneGraphRenderer::new(), config)?;

    if !pipeline.request_refresh(&registry, Vec::new()) {
        return Err(Error::Pipeline("could not start refresh".into()));
    }
    let report = match pipeline.wait_for_refresh(&mut registry, REFRESH_TIMEOUT) {
        Some(Ok(report)) => report,
        Some(Err(Error::RefreshFailed { failed })) => {
            log::warn!("All {} plane visuals failed to build", failed);
            registry.last_report()
        }
        Some(Err(e)) => return Err(e),
        None => {
            return Err(Error::Pipeline(format!(
                "refresh timed out after {:?}",
                REFRESH_TIMEOUT
            )));
        }
    };
    print_summary(&registry, &report);

    if let Some(port) = debug_port {
        let (publisher, handler) = debug_channel();
        publisher.publish(&registry);
        spawn_debug_server(handler, port);
        host_loop(&mut registry, &mut pipeline, &publisher);
    }

    Ok(())
}

fn load_planes(path: &Path) -> Result<Vec<BoundedPlane>> {
    let text = std::fs::read_to_string(path)?;
    let planes: Vec<BoundedPlane> = serde_json::from_str(&text)?;
    log::info!("Loaded {} planes from {}", planes.len(), path.display());
    Ok(planes)
}

fn print_summary<R: PlaneRenderer>(registry: &PlaneRegistry<R>, report: &RefreshReport) {
    println!("Refresh cycle {}:", registry.cycle());
    println!(
        "  destroyed {}, installed {}, discarded {}, failed {}, rejected {}",
        report.destroyed, report.installed, report.discarded, report.failed, report.rejected
    );
    println!("Planes by type:");
    for semantic in SemanticType::ALL {
        println!(
            "  {:<9} {}",
            semantic.name(),
            registry.count(SemanticMask::from(semantic))
        );
    }
    println!("Reference heights:");
    println!("  floor   {:.3}m", registry.floor_y());
    println!("  ceiling {:.3}m", registry.ceiling_y());
}

/// Serve debug commands from a background thread with its own tokio runtime.
fn spawn_debug_server(handler: RegistryDebugHandler, port: u16) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("Failed to create debug runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            let handler = Arc::new(tokio::sync::Mutex::new(handler));
            let _server = planes_debug::DebugServer::start(handler, port);
            log::info!("Debug server started on port {}", port);
            // Keep runtime alive until the process exits
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });
    });
}

/// Owner-thread loop: re-run refreshes requested over the debug connection.
fn host_loop<R: PlaneRenderer>(
    registry: &mut PlaneRegistry<R>,
    pipeline: &mut PlaneRefreshPipeline,
    publisher: &DebugPublisher,
) {
    println!();
    println!("Serving debug commands (Ctrl+C to quit)");
    loop {
        if publisher.take_refresh_request() && pipeline.request_refresh(registry, Vec::new()) {
            log::info!("Refresh requested over debug connection");
        }

        match pipeline.poll(registry) {
            Some(Ok(report)) => {
                print_summary(registry, &report);
                publisher.publish(registry);
            }
            Some(Err(e)) => {
                log::error!("Refresh failed: {}", e);
                publisher.publish(registry);
            }
            None => {}
        }

        std::thread::sleep(HOST_TICK);
    }
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// A port flag that is present must carry a valid port number.
fn parse_port_arg(args: &[String], flag: &str) -> Result<Option<u16>> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let value = args
        .get(i + 1)
        .ok_or_else(|| Error::Config(format!("{} needs a port number", flag)))?;
    value
        .parse()
        .map(Some)
        .map_err(|_| Error::Config(format!("invalid {} value '{}'", flag, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_port_arg_absent() {
        let args = args(&["surface-planes", "--input", "planes.json"]);
        assert_eq!(parse_port_arg(&args, "--debug-port").unwrap(), None);
    }

    #[test]
    fn test_port_arg_valid() {
        let args = args(&["surface-planes", "--debug-port", "9743"]);
        assert_eq!(parse_port_arg(&args, "--debug-port").unwrap(), Some(9743));
    }

    #[test]
    fn test_port_arg_invalid_is_error() {
        let cases: [&[&str]; 3] = [
            &["surface-planes", "--debug-port", "nine"],
            &["surface-planes", "--debug-port", "70000"],
            &["surface-planes", "--debug-port"],
        ];
        for bad in cases {
            let args = args(bad);
            assert!(
                matches!(parse_port_arg(&args, "--debug-port"), Err(Error::Config(_))),
                "{:?} accepted",
                args
            );
        }
    }

    #[test]
    fn test_run_rejects_bad_port_before_loading() {
        let args = args(&["surface-planes", "--input", "missing.json", "--debug-port", "x"]);
        assert!(matches!(run(&args), Err(Error::Config(_))));
    }
}
