use serde::{Deserialize, Serialize};
use std::time::Duration;

///
/// LockConfig
///
/// Timing of the distributed lock. Every field has a default, so a config
/// file only names what it changes.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Give up acquiring after this long.
    pub timeout_ms: u64,

    /// Upper bound on one sleep between acquisition cycles.
    pub poll_interval_ms: u64,

    /// Lease written into the expiry keys on acquire.
    pub lease_ms: u64,

    /// Immediate retries after reclaiming stale pairs, per cycle.
    pub stale_retries: u32,
}

impl LockConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 125;
    pub const DEFAULT_LEASE_MS: u64 = 30_000;
    pub const DEFAULT_STALE_RETRIES: u32 = 3;

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            lease_ms: Self::DEFAULT_LEASE_MS,
            stale_retries: Self::DEFAULT_STALE_RETRIES,
        }
    }
}
