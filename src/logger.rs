use tracing_subscriber::EnvFilter;

/// Sets up logging to stderr.
///
/// `RUST_LOG` wins when set; otherwise the crate logs at `info`, or `debug`
/// with `verbose`.
pub fn init(verbose: bool) {
    let default = if verbose { "mutebot=debug" } else { "mutebot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::env::var_os("DISABLE_COLOR").is_none())
        .try_init();
}
