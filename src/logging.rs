//! Logging setup.
//!
//! The 0-3 verbosity tier selects a default filter; `RUST_LOG` wins when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for a verbosity tier.
///
/// Tier 1 shows FPS and connect/disconnect lines, tier 2 every server status
/// line, tier 3 adds the WebSocket library itself.
pub fn filter_directives(level: u8) -> &'static str {
    match level {
        0 => "off",
        1 => "tank_arena=info,tank_arena_server=info",
        2 => "tank_arena=debug,tank_arena_server=debug",
        _ => "tank_arena=trace,tank_arena_server=trace,tokio_tungstenite=trace,tungstenite=trace",
    }
}

/// Install the global subscriber.
pub fn setup_logging(level: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    let debug = cfg!(feature = "debug-tracing");
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(debug)
                .with_file(debug)
                .with_line_number(debug)
                .with_thread_ids(debug),
        )
        .try_init()?;

    Ok(())
}
