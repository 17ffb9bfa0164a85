use super::*;
use crate::{
    error::Error,
    key::Key,
    store::{Command, KeyValueOps, MemoryConnection, MemoryStore, StoreError},
    value::format_timestamp,
};
use chrono::TimeDelta;
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
};

fn quick() -> LockConfig {
    LockConfig {
        timeout_ms: 60,
        poll_interval_ms: 5,
        ..LockConfig::default()
    }
}

fn classes(names: &[&str]) -> ClassSet {
    ClassSet::new(names.iter().copied())
}

fn preset(store: &MemoryStore, pairs: &[(&str, String)]) {
    let commands: Vec<Command> = pairs
        .iter()
        .map(|(key, value)| Command::Set {
            key: (*key).to_string(),
            value: value.clone(),
        })
        .collect();

    assert!(store.connect().exec(&commands).unwrap());
}

fn owner_of(store: &MemoryStore, class: &str) -> Option<String> {
    store.connect().get(Key::lock_owner(class).name()).unwrap()
}

// ---------------------------------------------------------------------
// ClassSet
// ---------------------------------------------------------------------

#[test]
fn class_sets_are_sorted_and_deduplicated() {
    let set = classes(&["User", "Post", "User"]);

    assert_eq!(*set, ["Post", "User"]);
    assert_eq!(set.to_string(), "Post, User");
    assert!(set.is_superset(&classes(&["User"])));
    assert!(!set.is_superset(&classes(&["User", "Tag"])));
    assert!(set.is_superset(&ClassSet::default()));
}

// ---------------------------------------------------------------------
// DistributedLock
// ---------------------------------------------------------------------

#[test]
fn acquire_writes_and_release_removes_every_pair() {
    let store = MemoryStore::new();
    let conn = store.connect();
    let lock = DistributedLock::new(quick());

    let lease = lock.acquire(&conn, &classes(&["User", "Post"])).unwrap();
    assert_eq!(lease.owner, lock.owner());
    assert!(lease.expires_at.is_some_and(|at| at > Utc::now()));
    assert_eq!(owner_of(&store, "User").as_deref(), Some(lock.owner()));
    assert!(store.contains_key("Post::lock:expires_at"));

    lock.release(&conn, &lease).unwrap();
    assert!(store.keys().is_empty());
}

#[test]
fn contended_classes_time_out_naming_the_resources() {
    let store = MemoryStore::new();
    let holder = DistributedLock::new(quick());
    let _held = holder.acquire(&store.connect(), &classes(&["User"])).unwrap();

    let other = DistributedLock::new(quick());
    let err = other
        .acquire(&store.connect(), &classes(&["User", "Post"]))
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Lock(LockError::NotAcquired { ref resources }) if **resources == ["Post", "User"]
    ));
    assert_eq!(err.to_string(), "could not acquire lock on [Post, User]");
    // nothing half-claimed
    assert!(!store.contains_key("Post::lock:owner"));
}

#[test]
fn stale_owner_with_past_expiry_is_reclaimed() {
    let store = MemoryStore::new();
    let past = format_timestamp(Utc::now() - TimeDelta::seconds(60));
    preset(&store, &[
        ("User::lock:owner", "crashed".to_string()),
        ("User::lock:expires_at", past),
    ]);

    let lock = DistributedLock::new(quick());
    lock.acquire(&store.connect(), &classes(&["User"])).unwrap();

    assert_eq!(owner_of(&store, "User").as_deref(), Some(lock.owner()));
}

#[test]
fn half_written_pairs_are_stale() {
    let store = MemoryStore::new();
    let future = format_timestamp(Utc::now() + TimeDelta::seconds(60));
    preset(&store, &[
        ("User::lock:owner", "crashed".to_string()),
        ("Post::lock:expires_at", future),
        ("Tag::lock:owner", "garbled".to_string()),
        ("Tag::lock:expires_at", "not a timestamp".to_string()),
    ]);

    let lock = DistributedLock::new(quick());
    lock.acquire(&store.connect(), &classes(&["User", "Post", "Tag"]))
        .unwrap();

    for class in ["User", "Post", "Tag"] {
        assert_eq!(owner_of(&store, class).as_deref(), Some(lock.owner()));
    }
}

#[test]
fn live_pairs_are_never_reclaimed() {
    let store = MemoryStore::new();
    let future = format_timestamp(Utc::now() + TimeDelta::seconds(60));
    preset(&store, &[
        ("User::lock:owner", "alive".to_string()),
        ("User::lock:expires_at", future),
    ]);

    let lock = DistributedLock::new(quick());
    assert!(lock.acquire(&store.connect(), &classes(&["User"])).is_err());
    assert_eq!(owner_of(&store, "User").as_deref(), Some("alive"));
}

#[test]
fn extend_rewrites_every_expiry() {
    let store = MemoryStore::new();
    let conn = store.connect();
    let lock = DistributedLock::new(quick());
    let mut lease = lock.acquire(&conn, &classes(&["User", "Post"])).unwrap();
    let before = lease.expires_at;

    lock.extend(&conn, &mut lease, Duration::from_secs(3_600))
        .unwrap();

    assert!(lease.expires_at > before);
    assert_eq!(lease.duration, Duration::from_secs(3_600));
    let stored = conn.get("Post::lock:expires_at").unwrap();
    assert_eq!(stored, lease.expires_at.map(format_timestamp));
}

#[test]
fn extend_after_losing_ownership_fails() {
    let store = MemoryStore::new();
    let conn = store.connect();
    let lock = DistributedLock::new(quick());
    let mut lease = lock.acquire(&conn, &classes(&["User"])).unwrap();
    preset(&store, &[("User::lock:owner", "thief".to_string())]);

    let err = lock
        .extend(&conn, &mut lease, Duration::from_secs(60))
        .unwrap_err();

    assert!(matches!(err, Error::Lock(LockError::NotAcquired { .. })));
}

#[test]
fn releasing_a_lost_lock_leaves_the_new_owner_alone() {
    let store = MemoryStore::new();
    let conn = store.connect();
    let lock = DistributedLock::new(quick());
    let lease = lock.acquire(&conn, &classes(&["User"])).unwrap();
    preset(&store, &[("User::lock:owner", "successor".to_string())]);

    lock.release(&conn, &lease).unwrap();

    assert_eq!(owner_of(&store, "User").as_deref(), Some("successor"));
    assert!(store.contains_key("User::lock:expires_at"));
}

#[test]
fn released_classes_can_be_taken_by_another_owner() {
    let store = MemoryStore::new();
    let first = DistributedLock::new(quick());
    let second = DistributedLock::new(quick());

    let lease = first.acquire(&store.connect(), &classes(&["User"])).unwrap();
    assert!(second.acquire(&store.connect(), &classes(&["User"])).is_err());
    first.release(&store.connect(), &lease).unwrap();

    assert!(second.acquire(&store.connect(), &classes(&["User"])).is_ok());
    assert_ne!(first.owner(), second.owner());
}

/// Connection whose `MGET` drops the last value.
struct ShortMget(MemoryConnection);

impl KeyValueOps for ShortMget {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.get(key)
    }

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let mut values = self.0.mget(keys)?;
        values.pop();

        Ok(values)
    }

    fn set_all_if_absent(&self, pairs: &[(String, String)]) -> Result<bool, StoreError> {
        self.0.set_all_if_absent(pairs)
    }

    fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.0.incr(key)
    }

    fn smembers(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        self.0.smembers(key)
    }

    fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.0.sismember(key, member)
    }

    fn scard(&self, key: &str) -> Result<usize, StoreError> {
        self.0.scard(key)
    }

    fn sunion(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError> {
        self.0.sunion(keys)
    }

    fn sinter(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError> {
        self.0.sinter(keys)
    }

    fn sdiff(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError> {
        self.0.sdiff(keys)
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
    ) -> Result<Vec<String>, StoreError> {
        self.0.zrange_by_score(key, min, max)
    }

    fn zrange_by_lex(
        &self,
        key: &str,
        min: Bound<&str>,
        max: Bound<&str>,
    ) -> Result<Vec<String>, StoreError> {
        self.0.zrange_by_lex(key, min, max)
    }

    fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        self.0.zrange_with_scores(key)
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.0.hget(key, field)
    }

    fn hget_many(&self, requests: &[(String, String)]) -> Result<Vec<Option<String>>, StoreError> {
        self.0.hget_many(requests)
    }

    fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.0.hgetall(key)
    }

    fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.0.lrange(key)
    }

    fn watch(&self, keys: &[String]) -> Result<(), StoreError> {
        self.0.watch(keys)
    }

    fn unwatch(&self) -> Result<(), StoreError> {
        self.0.unwatch()
    }

    fn exec(&self, commands: &[Command]) -> Result<bool, StoreError> {
        self.0.exec(commands)
    }
}

#[test]
fn short_mget_replies_are_corrupt_not_a_panic() {
    let store = MemoryStore::new();
    let conn = ShortMget(store.connect());
    let lock = DistributedLock::new(quick());

    // release must not delete a pair it could not verify
    let lease = lock.acquire(&conn, &classes(&["User"])).unwrap();
    let err = lock.release(&conn, &lease).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Corrupt { .. })));
    assert_eq!(owner_of(&store, "User").as_deref(), Some(lock.owner()));

    // a contended acquire inspects the pairs through MGET as well
    let other = DistributedLock::new(quick());
    let err = other.acquire(&conn, &classes(&["User"])).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Corrupt { .. })));
}

// ---------------------------------------------------------------------
// NoopLock
// ---------------------------------------------------------------------

#[test]
fn noop_lock_touches_nothing() {
    let store = MemoryStore::new();
    let conn = store.connect();
    let lock = NoopLock::new();

    let mut lease = lock.acquire(&conn, &classes(&["User"])).unwrap();
    lock.extend(&conn, &mut lease, Duration::from_secs(5)).unwrap();
    lock.release(&conn, &lease).unwrap();

    assert_eq!(*lease.classes, ["User"]);
    assert!(lease.expires_at.is_none());
    assert!(store.keys().is_empty());
}
