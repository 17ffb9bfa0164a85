//! Metrics sink boundary.
//!
//! Lock, filter and record code never touch `obs::metrics` directly; every
//! counter update flows through `MetricsEvent` and a `MetricsSink`.
use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Load,
    Save,
    Destroy,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricsEvent {
    LockAcquired {
        attempts: u64,
        waited_ms: u64,
    },
    LockTimeout,
    StaleLockReclaimed {
        pairs: u64,
    },
    FilterExec {
        entity: &'static str,
        steps: u64,
        rows: u64,
    },
    Exec {
        kind: ExecKind,
        entity: &'static str,
        rows: u64,
    },
    IndexDelta {
        entity: &'static str,
        inserts: u64,
        removes: u64,
    },
    UniqueViolation {
        entity: &'static str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default sink that writes into the process-wide metrics state.
/// Used whenever no scoped override is installed on the current thread.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::LockAcquired {
                attempts,
                waited_ms,
            } => metrics::with_state_mut(|m| {
                m.ops.lock_acquired = m.ops.lock_acquired.saturating_add(1);
                m.ops.lock_attempts = m.ops.lock_attempts.saturating_add(attempts);
                m.perf.lock_wait_ms_total = m.perf.lock_wait_ms_total.saturating_add(waited_ms);
                m.perf.lock_wait_ms_max = m.perf.lock_wait_ms_max.max(waited_ms);
            }),

            MetricsEvent::LockTimeout => metrics::with_state_mut(|m| {
                m.ops.lock_timeouts = m.ops.lock_timeouts.saturating_add(1);
            }),

            MetricsEvent::StaleLockReclaimed { pairs } => metrics::with_state_mut(|m| {
                m.ops.stale_locks_reclaimed = m.ops.stale_locks_reclaimed.saturating_add(pairs);
            }),

            MetricsEvent::FilterExec {
                entity,
                steps,
                rows,
            } => metrics::with_state_mut(|m| {
                m.ops.filter_execs = m.ops.filter_execs.saturating_add(1);
                m.ops.filter_steps = m.ops.filter_steps.saturating_add(steps);
                m.ops.filter_rows = m.ops.filter_rows.saturating_add(rows);
                let entry = m.entities.entry(entity.to_string()).or_default();
                entry.filter_execs = entry.filter_execs.saturating_add(1);
                entry.filter_rows = entry.filter_rows.saturating_add(rows);
            }),

            MetricsEvent::Exec { kind, entity, rows } => metrics::with_state_mut(|m| {
                match kind {
                    ExecKind::Load => m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows),
                    ExecKind::Save => m.ops.rows_saved = m.ops.rows_saved.saturating_add(rows),
                    ExecKind::Destroy => {
                        m.ops.rows_destroyed = m.ops.rows_destroyed.saturating_add(rows);
                    }
                }

                let entry = m.entities.entry(entity.to_string()).or_default();
                match kind {
                    ExecKind::Load => entry.rows_loaded = entry.rows_loaded.saturating_add(rows),
                    ExecKind::Save => entry.rows_saved = entry.rows_saved.saturating_add(rows),
                    ExecKind::Destroy => {
                        entry.rows_destroyed = entry.rows_destroyed.saturating_add(rows);
                    }
                }
            }),

            MetricsEvent::IndexDelta {
                entity,
                inserts,
                removes,
            } => metrics::with_state_mut(|m| {
                m.ops.index_inserts = m.ops.index_inserts.saturating_add(inserts);
                m.ops.index_removes = m.ops.index_removes.saturating_add(removes);
                let entry = m.entities.entry(entity.to_string()).or_default();
                entry.index_inserts = entry.index_inserts.saturating_add(inserts);
                entry.index_removes = entry.index_removes.saturating_add(removes);
            }),

            MetricsEvent::UniqueViolation { entity } => metrics::with_state_mut(|m| {
                m.ops.unique_violations = m.ops.unique_violations.saturating_add(1);
                let entry = m.entities.entry(entity.to_string()).or_default();
                entry.unique_violations = entry.unique_violations.saturating_add(1);
            }),
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());

    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset() {
    metrics::reset();
}

/// Run a closure with `sink` receiving every event recorded on this thread.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let previous = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = previous;
            });
        }
    }

    let previous = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(previous);

    f()
}
