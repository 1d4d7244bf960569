//! Logging initialization.

use eyre::Result;
use tracing_subscriber::EnvFilter;

use crate::args::LogArgs;

/// Build the filter with the following precedence:
/// 1. If `--quiet` is set, only errors are shown
/// 2. Otherwise, start with `RUST_LOG` env var if set, or the verbosity level
/// 3. Apply any custom filter from `--log.filter`
pub fn env_filter(args: &LogArgs) -> EnvFilter {
    if args.quiet {
        return EnvFilter::new(args.base_level());
    }

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.base_level()));

    if let Some(custom_filter) = &args.filter {
        for directive in custom_filter.split(',') {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
    }

    filter
}

/// Initialize logging based on command line arguments.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(args))
        .with_writer(std::io::stderr);

    if args.json {
        builder
            .json()
            .try_init()
            .map_err(|e| eyre::eyre!("failed to install JSON logger: {e}"))?;
    } else {
        builder
            .without_time()
            .try_init()
            .map_err(|e| eyre::eyre!("failed to install logger: {e}"))?;
    }

    Ok(())
}
