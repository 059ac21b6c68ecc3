use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `CLIP_LOADER_LOG` first, then `RUST_LOG`, then `info`.
///
/// Scheduler events carry `label` and `path` fields; per-producer events are at `debug`,
/// run-level events at `info`.
pub fn init_tracing() {
    let filter = env_filter();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("CLIP_LOADER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
