//! Console logging for the keylock CLI
//!
//! Events go to stderr so that stdout only carries command output (tokens,
//! TTLs). `RUST_LOG` overrides the level chosen on the command line.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; later calls are ignored.
pub fn init_logging(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,keylock={level},keylockctl={level}")));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}
