use env_logger::Env;

/// Installs the process logger. `RUST_LOG` wins over the default level.
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}
