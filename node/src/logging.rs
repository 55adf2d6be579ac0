//! # Structured Logging
//!
//! One `tracing` subscriber for the whole process. `RUST_LOG` wins over
//! [`DEFAULT_FILTER`]; `--log-format json` switches to JSON lines for log
//! shippers. Output goes to stderr.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Reorgs log at `warn`, tip changes
/// at `info`, side branches at `debug`.
pub const DEFAULT_FILTER: &str = "nova_chain_node=info,nova_chain=info,tower_http=info";

/// Log output format, selected with `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init()?,
    }

    tracing::debug!(?format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error() {
        init_logging(DEFAULT_FILTER, LogFormat::Json).expect("first init");
        assert!(init_logging(DEFAULT_FILTER, LogFormat::Pretty).is_err());
    }
}
