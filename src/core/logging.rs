//! Logging initialization and utilities

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// Panics if a global logger is already installed; hosts that may have
/// set one up (game engines usually do) should call `try_init` instead.
///
/// # Example
/// ```
/// voxsmoke::core::logging::try_init();
/// log::info!("simulation host started");
/// ```
pub fn init() {
    builder().init();
}

/// Like `init`, but ignores an already-installed global logger
pub fn try_init() {
    let _ = builder().try_init();
}

fn builder() -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
}
