use tracing_subscriber::EnvFilter;

/// Initialize structured logging for the CLI.
///
/// `RUST_LOG` wins if set; otherwise the `--log-level` flag value is used as
/// the default filter directive.
pub fn init(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
