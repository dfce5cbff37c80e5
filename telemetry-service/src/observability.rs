use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Crates logged at `info` unless `RUST_LOG` says otherwise.
const DEFAULT_DIRECTIVES: [&str; 2] = ["telemetry_service=info", "simulate_devices=info"];

pub fn init_tracing() {
    let filter = DEFAULT_DIRECTIVES.iter().fold(EnvFilter::from_default_env(), |filter, d| {
        filter.add_directive(d.parse().unwrap_or_else(|_| LevelFilter::INFO.into()))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
