//! Metrics and observability infrastructure.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `init`: Prometheus recorder installation

pub mod events;

use snafu::prelude::*;

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Macro for emitting metric events (Vector-style pattern).
///
/// Calls the `InternalEvent::emit()` method on the given event, which
/// records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use snowdrift::metrics::events::FileCommitted;
///
/// emit!(FileCommitted { bytes: 1024, records: 10, writer: "writer-1".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

/// Install the Prometheus metrics recorder.
///
/// Returns a handle whose `render()` exposes the scrape payload; serving it
/// over HTTP is up to the embedding process.
pub fn init() -> Result<metrics_exporter_prometheus::PrometheusHandle, MetricsError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)
}
