//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// surface_planes::core::logging::init();
/// log::info!("Plane classification started");
/// ```
pub fn init() {
    // try_init: hosts and tests may already have installed a logger
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    )
    .format_timestamp_millis()
    .try_init();
}
