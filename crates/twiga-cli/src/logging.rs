use tracing_subscriber::EnvFilter;

/// Default directives appended to the requested level.
const QUIET_DEPENDENCIES: &str = "hyper=warn,reqwest=warn";

fn filter_directives(level: &str) -> String {
    format!("{level},{QUIET_DEPENDENCIES}")
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// `level`. Calling this more than once is a no-op.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
