//! Owner/expiry key-pair lock.
//!
//! Each class `C` is guarded by `C::lock:owner` and `C::lock:expires_at`.
//! Acquisition writes every pair in one `MSETNX`, so a set of classes is
//! taken entirely or not at all. A pair is stale when its owner has no
//! future expiry, or an expiry exists without an owner; stale pairs are
//! deleted under `WATCH` so a concurrent claimant is never evicted.

use crate::{
    error::Error,
    key::Key,
    lock::{ClassSet, Lease, LockConfig, LockError, LockStrategy},
    obs::sink::{self, MetricsEvent},
    store::{Command, KeyValueOps, StoreError},
    value::{format_timestamp, parse_timestamp},
};
use chrono::{DateTime, TimeDelta, Utc};
use std::{
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

///
/// DistributedLock
///

#[derive(Debug)]
pub struct DistributedLock {
    config: LockConfig,
    owner: String,
}

impl DistributedLock {
    /// New lock strategy with a fresh owner id.
    #[must_use]
    pub fn new(config: LockConfig) -> Self {
        Self {
            config,
            owner: ulid::Ulid::new().to_string(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &LockConfig {
        &self.config
    }

    fn owner_keys(classes: &ClassSet) -> Vec<String> {
        classes
            .iter()
            .map(|class| Key::lock_owner(class).name().to_string())
            .collect()
    }

    fn pair_keys(classes: &ClassSet) -> Vec<String> {
        classes
            .iter()
            .flat_map(|class| {
                [
                    Key::lock_owner(class).name().to_string(),
                    Key::lock_expiry(class).name().to_string(),
                ]
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------

    /// One `MSETNX` over every owner/expiry pair.
    fn try_claim(
        &self,
        conn: &dyn KeyValueOps,
        classes: &ClassSet,
    ) -> Result<Option<DateTime<Utc>>, Error> {
        let expires_at = expiry_after(self.config.lease());
        let expiry = format_timestamp(expires_at);

        let pairs: Vec<(String, String)> = classes
            .iter()
            .flat_map(|class| {
                [
                    (Key::lock_owner(class).name().to_string(), self.owner.clone()),
                    (Key::lock_expiry(class).name().to_string(), expiry.clone()),
                ]
            })
            .collect();

        let claimed = conn.set_all_if_absent(&pairs)?;

        Ok(claimed.then_some(expires_at))
    }

    /// Delete stale pairs. Returns `true` when an immediate retry may
    /// succeed: something was reclaimed, or every pair was already free.
    fn reclaim_stale(&self, conn: &dyn KeyValueOps, classes: &ClassSet) -> Result<bool, Error> {
        let keys = Self::pair_keys(classes);
        conn.watch(&keys)?;
        let values = Self::read_watched(conn, &keys)?;
        let now = Utc::now();

        let mut commands = Vec::new();
        let mut all_free = true;
        for (pair_keys, pair) in keys.chunks(2).zip(values.chunks(2)) {
            let [owner, expiry] = pair else {
                continue;
            };
            let (owner, expiry) = (owner.as_deref(), expiry.as_deref());

            if owner.is_none() && expiry.is_none() {
                continue;
            }
            if is_stale(owner, expiry, now) {
                commands.extend(pair_keys.iter().map(|key| Command::Del { key: key.clone() }));
            } else {
                all_free = false;
            }
        }

        if commands.is_empty() {
            conn.unwatch()?;
            return Ok(all_free);
        }

        let pairs = commands.len() / 2;
        let reclaimed = conn.exec(&commands)?;
        if reclaimed {
            info!(resources = %classes, pairs, "reclaimed stale lock");
            sink::record(MetricsEvent::StaleLockReclaimed {
                pairs: u64::try_from(pairs).unwrap_or(u64::MAX),
            });
        }

        Ok(reclaimed)
    }

    // One value per key; anything else drops the watch and fails.
    fn read_watched(conn: &dyn KeyValueOps, keys: &[String]) -> Result<Vec<Option<String>>, Error> {
        let values = conn.mget(keys)?;
        if values.len() != keys.len() {
            conn.unwatch()?;

            return Err(StoreError::corrupt(
                keys.join(", "),
                format!("MGET returned {} values for {} keys", values.len(), keys.len()),
            )
            .into());
        }

        Ok(values)
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    fn owns_all(&self, owners: &[Option<String>]) -> bool {
        owners
            .iter()
            .all(|owner| owner.as_deref() == Some(self.owner.as_str()))
    }
}

impl LockStrategy for DistributedLock {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn acquire(&self, conn: &dyn KeyValueOps, classes: &ClassSet) -> Result<Lease, Error> {
        let started = Instant::now();
        let timeout = self.config.timeout();
        let mut attempts: u64 = 0;

        loop {
            let mut stale_budget = self.config.stale_retries;

            loop {
                attempts += 1;
                if let Some(expires_at) = self.try_claim(conn, classes)? {
                    let waited_ms =
                        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    debug!(
                        resources = %classes,
                        owner = %self.owner,
                        attempts,
                        waited_ms,
                        "lock acquired"
                    );
                    sink::record(MetricsEvent::LockAcquired {
                        attempts,
                        waited_ms,
                    });

                    return Ok(Lease {
                        classes: classes.clone(),
                        owner: self.owner.clone(),
                        expires_at: Some(expires_at),
                        duration: self.config.lease(),
                    });
                }

                if stale_budget == 0 || !self.reclaim_stale(conn, classes)? {
                    break;
                }
                stale_budget -= 1;
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!(resources = %classes, attempts, "lock acquisition timed out");
                sink::record(MetricsEvent::LockTimeout);

                return Err(LockError::NotAcquired {
                    resources: classes.clone(),
                }
                .into());
            }

            thread::sleep(self.config.poll_interval().min(timeout - elapsed));
        }
    }

    fn extend(
        &self,
        conn: &dyn KeyValueOps,
        lease: &mut Lease,
        duration: Duration,
    ) -> Result<(), Error> {
        let lost = || LockError::NotAcquired {
            resources: lease.classes.clone(),
        };

        let owner_keys = Self::owner_keys(&lease.classes);
        conn.watch(&owner_keys)?;
        let owners = Self::read_watched(conn, &owner_keys)?;
        if !self.owns_all(&owners) {
            conn.unwatch()?;
            warn!(resources = %lease.classes, "lock lost before extend");
            return Err(lost().into());
        }

        let expires_at = expiry_after(duration);
        let expiry = format_timestamp(expires_at);
        let commands: Vec<Command> = lease
            .classes
            .iter()
            .map(|class| Command::Set {
                key: Key::lock_expiry(class).name().to_string(),
                value: expiry.clone(),
            })
            .collect();

        if !conn.exec(&commands)? {
            warn!(resources = %lease.classes, "lock changed hands during extend");
            return Err(lost().into());
        }

        debug!(resources = %lease.classes, expires_at = %expiry, "lock extended");
        lease.expires_at = Some(expires_at);
        lease.duration = duration;

        Ok(())
    }

    fn release(&self, conn: &dyn KeyValueOps, lease: &Lease) -> Result<(), Error> {
        let keys = Self::pair_keys(&lease.classes);
        conn.watch(&keys)?;
        let owners = Self::read_watched(conn, &Self::owner_keys(&lease.classes))?;

        if !self.owns_all(&owners) {
            conn.unwatch()?;
            debug!(resources = %lease.classes, "lock no longer owned; nothing to release");
            return Ok(());
        }

        let commands: Vec<Command> = keys.into_iter().map(|key| Command::Del { key }).collect();
        let released = conn.exec(&commands)?;
        debug!(resources = %lease.classes, released, "lock released");

        Ok(())
    }
}

fn is_stale(owner: Option<&str>, expiry: Option<&str>, now: DateTime<Utc>) -> bool {
    match (owner, expiry) {
        (None, None) => false,
        (None, Some(_)) | (Some(_), None) => true,
        (Some(_), Some(raw)) => parse_timestamp(raw).is_none_or(|at| at <= now),
    }
}

fn expiry_after(duration: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);

    Utc::now()
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
