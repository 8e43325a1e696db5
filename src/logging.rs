//! Logging setup for the command-line tool.
//!
//! `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug`
//! with `verbose`. Events go to stderr so stdout stays free for dumps.
//!
//! Example: `RUST_LOG=unitcart::refine=debug unitcart build`

use tracing_subscriber::{fmt, EnvFilter};

pub fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Installs the global subscriber. A second call leaves the first one in
/// place.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));
    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .try_init();
    if installed.is_err() {
        tracing::debug!("logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_level() {
        assert_eq!(default_level(false), "info");
        assert_eq!(default_level(true), "debug");
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_logging(false);
        init_logging(true);
    }
}
