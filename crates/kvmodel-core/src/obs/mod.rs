//! Observability: runtime counters and the sink they flow through.
//!
//! Structured logs go straight to `tracing`; this module only carries the
//! aggregated numbers.

pub mod metrics;
pub mod sink;


// re-exports
pub use metrics::EventReport;
pub use sink::{
    ExecKind, MetricsEvent, MetricsSink, metrics_report, metrics_reset, with_metrics_sink,
};
