//! Log initialisation for the `kiln` binary. The library only emits events.

use std::io;

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV: &str = "KILN_LOG";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// An explicit `--log-level` must parse; `KILN_LOG` falls back to `warn`.
fn filter(level: Option<&str>) -> Result<EnvFilter, ParseError> {
    match level {
        Some(directives) => EnvFilter::try_new(directives),
        None => Ok(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))),
    }
}

fn layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
    }
}

/// Install the global subscriber. Logs go to stderr so reports on stdout
/// stay machine-readable. A second call is a no-op.
pub fn init(level: Option<&str>, format: LogFormat) -> Result<(), ParseError> {
    let filter = filter(level)?;
    let _ = tracing_subscriber::registry()
        .with(layer(format).with_filter(filter))
        .try_init();
    Ok(())
}
