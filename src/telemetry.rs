//! Logging and metrics setup for the binary.

use std::path::Path;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::store::write_bytes_atomic;

const DEFAULT_FILTER: &str = "political_pulse=info,warn";

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter; `json` switches to one JSON object per line.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing already initialized: {e}");
    }
}

/// `--log-json` or `PULSE_LOG_FORMAT=json`.
pub fn wants_json(flag: bool) -> bool {
    flag || std::env::var("PULSE_LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Install the Prometheus recorder once per process.
pub fn install_metrics() -> Result<&'static PrometheusHandle> {
    PROMETHEUS.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")
    })
}

/// Render current metrics into a node-exporter textfile, if a recorder
/// has been installed.
pub fn write_textfile(path: &Path) -> Result<()> {
    let Some(handle) = PROMETHEUS.get() else {
        return Ok(());
    };
    write_bytes_atomic(path, handle.render().as_bytes())
        .with_context(|| format!("writing metrics textfile {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn json_format_from_flag_or_env() {
        std::env::remove_var("PULSE_LOG_FORMAT");
        assert!(!wants_json(false));
        assert!(wants_json(true));
        std::env::set_var("PULSE_LOG_FORMAT", "JSON");
        assert!(wants_json(false));
        std::env::remove_var("PULSE_LOG_FORMAT");
    }

    #[test]
    fn textfile_is_noop_without_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("pulse.prom");
        if PROMETHEUS.get().is_none() {
            write_textfile(&p).unwrap();
            assert!(!p.exists());
        }
    }
}
