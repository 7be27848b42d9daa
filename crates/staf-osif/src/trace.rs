//! Trace output setup.
//!
//! Library code only emits `tracing` events. Executables call
//! [`init_tracing`] once to route them to stderr.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::RuntimeConfig;
use crate::error::{OsError, OsResult};

/// Filter used when neither `STAF_TRACE` nor `RUST_LOG` is set. Errors and
/// warnings are always shown.
pub const DEFAULT_TRACE_FILTER: &str = "warn";

/// Output layout for trace lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceFormat {
    /// Human-readable single lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Picks the filter directive: `STAF_TRACE`, then `RUST_LOG`, then
/// [`DEFAULT_TRACE_FILTER`].
pub fn filter_directive(config: &RuntimeConfig) -> String {
    config
        .trace_filter
        .clone()
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_TRACE_FILTER.to_string())
}

/// Installs the global subscriber.
///
/// Fails with [`OsError::InvalidValue`] for a malformed directive and with
/// [`OsError::Unknown`] when a subscriber is already installed.
pub fn init_tracing(config: &RuntimeConfig, format: TraceFormat) -> OsResult<()> {
    let directive = filter_directive(config);
    let filter = EnvFilter::try_new(&directive).map_err(|e| OsError::InvalidValue {
        reason: format!("bad trace filter {directive:?}: {e}"),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        TraceFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
        TraceFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| OsError::unknown(format!("tracing already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_filter_wins() {
        let config = RuntimeConfig {
            trace_filter: Some("staf_osif=trace".to_string()),
            ..RuntimeConfig::default()
        };
        assert_eq!(filter_directive(&config), "staf_osif=trace");
    }

    #[test]
    fn test_bad_directive_rejected() {
        let config = RuntimeConfig {
            trace_filter: Some("staf_osif=loud".to_string()),
            ..RuntimeConfig::default()
        };
        let err = init_tracing(&config, TraceFormat::Text).unwrap_err();
        assert!(matches!(err, OsError::InvalidValue { .. }));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = RuntimeConfig {
            trace_filter: Some("off".to_string()),
            ..RuntimeConfig::default()
        };
        let first = init_tracing(&config, TraceFormat::Text);
        let second = init_tracing(&config, TraceFormat::Json);
        // Another test in this binary may have installed one first.
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }
}
