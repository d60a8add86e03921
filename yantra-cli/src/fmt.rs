use std::env;

use crate::opts::Opts;

/// An explicit `RUST_LOG` wins; otherwise the verbosity flags pick the
/// filter for our own crates.
pub fn setup_tracing(opts: &Opts) {
    let filter = if let Ok(filter) = env::var("RUST_LOG") {
        filter
    } else if opts.quiet {
        "yantra=error,yantra_core=error".to_string()
    } else if opts.trace {
        "yantra=trace,yantra_core=trace".to_string()
    } else if opts.debug {
        "yantra=debug,yantra_core=debug".to_string()
    } else {
        "yantra=info,yantra_core=info".to_string()
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
