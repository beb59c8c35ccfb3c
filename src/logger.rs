use std::future::Future;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Target of the one-line JSON record emitted per server request.
pub const REQUEST_TARGET: &str = "request";

pub const LOG_FILE: &str = "viewhost.log";
pub const REQUEST_FILE: &str = "requests.json";

/// Install the global subscriber.
///
/// - `log_level` is an `EnvFilter` directive (e.g. `"info"` or
///   `"viewhost=debug,reqwest=off"`).
/// - Console output goes to stderr; stdout belongs to the `bridge` command.
/// - With `log_dir`, a daily rolling text log and a daily rolling JSON
///   request report are written there as well.
///
/// Calling it twice is harmless; the second subscriber is refused.
pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level)?;
    let console = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (txt_layer, json_layer) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let txt_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE);
            let txt_layer = fmt::layer().with_writer(txt_appender).with_ansi(false);

            let json_appender = RollingFileAppender::new(Rotation::DAILY, dir, REQUEST_FILE);
            let json_layer = fmt::layer()
                .json()
                .with_writer(json_appender)
                .with_target(true)
                .with_filter(EnvFilter::new(format!("{REQUEST_TARGET}=info")));
            (Some(txt_layer), Some(json_layer))
        }
        None => (None, None),
    };

    let installed = Registry::default()
        .with(env_filter)
        .with(console)
        .with(txt_layer)
        .with(json_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

/// Run one server request and report it.
///
/// Success is logged at `info`, failure at `error`; either way a single
/// `request` event with name, latency and status follows, which the JSON
/// layer above picks up.
pub async fn instrument_request<F, Fut, T, E>(name: &str, handler: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let result = handler().await;
    let elapsed = start.elapsed().as_secs_f64() * 1_000.0;

    match &result {
        Ok(_) => info!("request `{}` succeeded in {:.1} ms", name, elapsed),
        Err(err) => error!(error = %err, "request `{}` failed in {:.1} ms", name, elapsed),
    }

    tracing::event!(
        target: REQUEST_TARGET,
        tracing::Level::INFO,
        request = name,
        latency_ms = elapsed,
        status = match &result {
            Ok(_) => "ok",
            Err(_) => "error",
        },
    );

    result
}
