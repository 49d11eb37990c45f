// MeshTail - util/logging.rs
//
// Structured logging with runtime-selectable debug mode.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flag: --debug
//   - Config file: [logging] level = "debug"
//
// Output: stderr, plus an optional extra layer (the live-view recorder)
// stacked after it. Every event reaches the sinks in registration order.
// Never logs secrets, tokens, or PII at any level.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Resolve the filter directive.
///
/// Priority: RUST_LOG env var > CLI --debug flag > config level > default "info".
pub fn build_filter(debug_flag: bool, config_level: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug_flag {
        EnvFilter::new("debug")
    } else if let Some(level) = config_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    }
}

/// Initialise the logging subsystem.
///
/// `debug_flag` is true when the user passed --debug on the CLI.
/// `config_level` is the level from config.toml (if present).
/// `extra` is an additional sink that sees every event the filter lets
/// through, after the stderr writer.
pub fn init<L>(debug_flag: bool, config_level: Option<&str>, extra: Option<L>)
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let filter = build_filter(debug_flag, config_level);

    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    // Sinks run in vector order for each event.
    let has_extra = extra.is_some();
    let mut sinks: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![stderr.boxed()];
    if let Some(extra) = extra {
        sinks.push(extra.boxed());
    }

    let result = tracing_subscriber::registry()
        .with(sinks)
        .with(filter)
        .try_init();

    if let Err(e) = result {
        eprintln!("Logging already initialised: {e}");
        return;
    }

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        sinks = if has_extra { 2 } else { 1 },
        "Logging initialised"
    );
}
