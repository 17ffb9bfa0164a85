use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// EventState
/// Ephemeral, in-memory counters shared by every backend in the process.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub perf: EventPerf,
    pub entities: BTreeMap<String, EntityCounters>,
    pub since_ms: i64,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Locking
    pub lock_acquired: u64,
    pub lock_attempts: u64,
    pub lock_timeouts: u64,
    pub stale_locks_reclaimed: u64,

    // Filters
    pub filter_execs: u64,
    pub filter_steps: u64,
    pub filter_rows: u64,

    // Rows touched
    pub rows_loaded: u64,
    pub rows_saved: u64,
    pub rows_destroyed: u64,

    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntityCounters {
    pub filter_execs: u64,
    pub filter_rows: u64,
    pub rows_loaded: u64,
    pub rows_saved: u64,
    pub rows_destroyed: u64,
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,
}

///
/// EventPerf
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventPerf {
    pub lock_wait_ms_total: u64,
    pub lock_wait_ms_max: u64,
}

///
/// EventReport
/// Point-in-time copy of the counters.
///

pub type EventReport = EventState;

static EVENT_STATE: Mutex<Option<EventState>> = parking_lot::const_mutex(None);

fn fresh_state() -> EventState {
    EventState {
        since_ms: Utc::now().timestamp_millis(),
        ..EventState::default()
    }
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut state = EVENT_STATE.lock();

    f(state.get_or_insert_with(fresh_state))
}

/// Copy of the current counters.
pub(crate) fn report() -> EventReport {
    with_state_mut(|m| m.clone())
}

/// Reset all counters.
pub(crate) fn reset() {
    *EVENT_STATE.lock() = Some(fresh_state());
}
