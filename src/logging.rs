use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Resolve the filter: `RUST_LOG` first, then the configured level, then `info`
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_str(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn fmt_layer<W>(writer: W, json: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Initialize logging system based on configuration.
///
/// Console output always goes to stderr in plain text, or JSON when no file
/// is configured and `json` is set. A configured file receives the JSON or
/// plain format and may rotate daily. The returned guard must be held for the
/// lifetime of the process to flush file output.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if let Some(log_file) = &config.file {
        let path = Path::new(log_file);
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("prefix-proxy.log");

        let file_appender = if config.rotation {
            tracing_appender::rolling::daily(directory, file_name)
        } else {
            tracing_appender::rolling::never(directory, file_name)
        };
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        layers.push(fmt_layer(non_blocking, config.json));
        layers.push(fmt_layer(std::io::stderr, false));
    } else {
        layers.push(fmt_layer(std::io::stderr, config.json));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_env_filter(config))
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}
