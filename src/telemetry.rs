//! Tracing subscriber setup shared by the binaries.

use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer as _,
    layer::SubscriberExt as _,
    util::{SubscriberInitExt as _, TryInitError},
};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber.
///
/// Filtering follows `config.filter`, falling back to `info` when the
/// directives do not parse. The [`ErrorLayer`] lets errors render the span
/// trace they captured.
pub fn init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .with(ErrorLayer::default())
        .try_init()
}
