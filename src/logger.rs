use tracing_subscriber::{fmt, EnvFilter};

/// Default filter directive for the two CLI switches. Quiet wins over verbose.
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over the
/// switches. Calling it twice is harmless; the second call is ignored.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false, false), "info");
        assert_eq!(default_directive(true, false), "debug");
        assert_eq!(default_directive(false, true), "warn");
        assert_eq!(default_directive(true, true), "warn");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(false, true);
        init_logging(true, false);
    }
}
