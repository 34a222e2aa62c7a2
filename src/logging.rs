use std::path::Path;

use eyre::{Context, Result};
use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the chrome trace open; the file is flushed when this is dropped.
pub struct LogGuard {
    _chrome: Option<FlushGuard>,
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`). Stdout is left to
/// the answers.
pub fn init(chrome_trace: Option<&Path>) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (chrome, guard) = match chrome_trace {
        Some(path) => {
            let (layer, guard) = ChromeLayerBuilder::new().file(path).build();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .with(chrome)
        .try_init()
        .wrap_err("failed to install the tracing subscriber")?;

    if let Some(path) = chrome_trace {
        tracing::info!(path = %path.display(), "writing chrome trace");
    }

    Ok(LogGuard { _chrome: guard })
}
