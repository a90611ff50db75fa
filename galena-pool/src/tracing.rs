//! Tracing setup and prelude.

/// Common tracing imports for the rest of the crate.
pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `verbose` selects
/// between `debug` and `info`.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
