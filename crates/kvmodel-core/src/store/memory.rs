use crate::store::{Command, KeyValueOps, StoreError};
use parking_lot::Mutex;
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::{Bound, RangeBounds},
    sync::Arc,
};

///
/// Data
/// Typed payload stored under one key.
///

#[derive(Clone, Debug, PartialEq)]
enum Data {
    Scalar(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
    SortedSet(BTreeMap<String, f64>),
}

impl Data {
    fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::List(v) => v.is_empty(),
            Self::Set(v) => v.is_empty(),
            Self::Hash(v) => v.is_empty(),
            Self::SortedSet(v) => v.is_empty(),
        }
    }
}

fn changed_if(changed: bool, key: &str) -> Vec<String> {
    if changed {
        vec![key.to_string()]
    } else {
        Vec::new()
    }
}

fn wrong_type(key: &str, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

///
/// MemoryState
///
/// Every write bumps the key's version; `WATCH` snapshots versions and
/// `EXEC` compares them. Empty collections are removed like the server does.
///

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, Data>,
    versions: HashMap<String, u64>,
    clock: u64,
    offline: bool,
}

impl MemoryState {
    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Connectivity {
                message: "memory store is offline".to_string(),
            });
        }

        Ok(())
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn prune(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(Data::is_empty) {
            self.entries.remove(key);
        }
    }

    // ------------------------------------------------------------------
    // Typed reads
    // ------------------------------------------------------------------

    fn scalar(&self, key: &str) -> Result<Option<&String>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Data::Scalar(v)) => Ok(Some(v)),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    fn set(&self, key: &str) -> Result<Option<&BTreeSet<String>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Data::Set(v)) => Ok(Some(v)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&BTreeMap<String, String>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Data::Hash(v)) => Ok(Some(v)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    fn sorted_set(&self, key: &str) -> Result<Option<&BTreeMap<String, f64>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Data::SortedSet(v)) => Ok(Some(v)),
            Some(_) => Err(wrong_type(key, "zset")),
        }
    }

    fn list(&self, key: &str) -> Result<Option<&Vec<String>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Data::List(v)) => Ok(Some(v)),
            Some(_) => Err(wrong_type(key, "list")),
        }
    }

    fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.set(key)?.cloned().unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Typed writes
    // ------------------------------------------------------------------

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>, StoreError> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Data::Set(BTreeSet::new()))
        {
            Data::Set(v) => Ok(v),
            _ => Err(wrong_type(key, "set")),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, String>, StoreError> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Data::Hash(BTreeMap::new()))
        {
            Data::Hash(v) => Ok(v),
            _ => Err(wrong_type(key, "hash")),
        }
    }

    fn sorted_set_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, f64>, StoreError> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Data::SortedSet(BTreeMap::new()))
        {
            Data::SortedSet(v) => Ok(v),
            _ => Err(wrong_type(key, "zset")),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut Vec<String>, StoreError> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Data::List(Vec::new()))
        {
            Data::List(v) => Ok(v),
            _ => Err(wrong_type(key, "list")),
        }
    }

    /// Apply one command, returning the keys it changed.
    fn apply(&mut self, command: &Command) -> Result<Vec<String>, StoreError> {
        let changed = match command {
            Command::Set { key, value } => {
                self.entries.insert(key.clone(), Data::Scalar(value.clone()));
                vec![key.clone()]
            }
            Command::Del { key } => {
                let removed = self.entries.remove(key).is_some();
                changed_if(removed, key)
            }
            Command::HSet { key, field, value } => {
                self.hash_mut(key)?.insert(field.clone(), value.clone());
                vec![key.clone()]
            }
            Command::HDel { key, field } => {
                let removed = self.hash_mut(key)?.remove(field).is_some();
                self.prune(key);
                changed_if(removed, key)
            }
            Command::SAdd { key, member } => {
                let added = self.set_mut(key)?.insert(member.clone());
                changed_if(added, key)
            }
            Command::SRem { key, member } => {
                let removed = self.set_mut(key)?.remove(member);
                self.prune(key);
                changed_if(removed, key)
            }
            Command::SMove {
                source,
                destination,
                member,
            } => {
                // destination type is checked even when the member is absent
                self.set(destination)?;
                let moved = self.set_mut(source)?.remove(member);
                self.prune(source);
                if moved {
                    self.set_mut(destination)?.insert(member.clone());
                    vec![source.clone(), destination.clone()]
                } else {
                    Vec::new()
                }
            }
            Command::ZAdd { key, member, score } => {
                self.sorted_set_mut(key)?.insert(member.clone(), *score);
                vec![key.clone()]
            }
            Command::ZRem { key, member } => {
                let removed = self.sorted_set_mut(key)?.remove(member).is_some();
                self.prune(key);
                changed_if(removed, key)
            }
            Command::RPush { key, value } => {
                self.list_mut(key)?.push(value.clone());
                vec![key.clone()]
            }
        };

        Ok(changed)
    }

    /// Apply every command or none of them.
    fn apply_all(&mut self, commands: &[Command]) -> Result<(), StoreError> {
        let mut touched: BTreeSet<&str> = BTreeSet::new();
        for command in commands {
            touched.extend(command_keys(command));
        }
        let before: Vec<(String, Option<Data>)> = touched
            .iter()
            .map(|key| ((*key).to_string(), self.entries.get(*key).cloned()))
            .collect();

        let mut changed = BTreeSet::new();
        for command in commands {
            match self.apply(command) {
                Ok(keys) => changed.extend(keys),
                Err(err) => {
                    for (key, data) in before {
                        match data {
                            Some(data) => self.entries.insert(key, data),
                            None => self.entries.remove(&key),
                        };
                    }
                    return Err(err);
                }
            }
        }

        for key in changed {
            self.touch(&key);
        }

        Ok(())
    }
}

fn command_keys(command: &Command) -> Vec<&str> {
    match command {
        Command::Set { key, .. }
        | Command::Del { key }
        | Command::HSet { key, .. }
        | Command::HDel { key, .. }
        | Command::SAdd { key, .. }
        | Command::SRem { key, .. }
        | Command::ZAdd { key, .. }
        | Command::ZRem { key, .. }
        | Command::RPush { key, .. } => vec![key.as_str()],
        Command::SMove {
            source,
            destination,
            ..
        } => vec![source.as_str(), destination.as_str()],
    }
}

///
/// MemoryStore
///
/// Shared in-process key-value server. Clones share state; each execution
/// context opens its own `MemoryConnection`.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection with its own watch list.
    #[must_use]
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            store: self.clone(),
            watched: RefCell::new(BTreeMap::new()),
        }
    }

    /// Make every subsequent call fail with a connectivity error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Every live key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }
}

///
/// MemoryConnection
///

#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    watched: RefCell<BTreeMap<String, u64>>,
}

impl MemoryConnection {
    fn read<R>(&self, f: impl FnOnce(&MemoryState) -> Result<R, StoreError>) -> Result<R, StoreError> {
        let state = self.store.state.lock();
        state.ensure_online()?;

        f(&state)
    }
}

impl KeyValueOps for MemoryConnection {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(|s| Ok(s.scalar(key)?.cloned()))
    }

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        // MGET reports non-string keys as missing
        self.read(|s| {
            Ok(keys
                .iter()
                .map(|key| s.scalar(key).ok().flatten().cloned())
                .collect())
        })
    }

    fn set_all_if_absent(&self, pairs: &[(String, String)]) -> Result<bool, StoreError> {
        let mut state = self.store.state.lock();
        state.ensure_online()?;

        if pairs.iter().any(|(key, _)| state.entries.contains_key(key)) {
            return Ok(false);
        }
        for (key, value) in pairs {
            state.entries.insert(key.clone(), Data::Scalar(value.clone()));
            state.touch(key);
        }

        Ok(true)
    }

    fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut state = self.store.state.lock();
        state.ensure_online()?;

        let current = match state.scalar(key)? {
            None => 0,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StoreError::corrupt(key, "value is not an integer"))?,
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::corrupt(key, "increment would overflow"))?;

        state
            .entries
            .insert(key.to_string(), Data::Scalar(next.to_string()));
        state.touch(key);

        Ok(next)
    }

    fn smembers(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        self.read(|s| s.set_members(key))
    }

    fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.read(|s| Ok(s.set(key)?.is_some_and(|set| set.contains(member))))
    }

    fn scard(&self, key: &str) -> Result<usize, StoreError> {
        self.read(|s| Ok(s.set(key)?.map_or(0, BTreeSet::len)))
    }

    fn sunion(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError> {
        self.read(|s| {
            let mut out = BTreeSet::new();
            for key in keys {
                out.extend(s.set_members(key)?);
            }

            Ok(out)
        })
    }

    fn sinter(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError> {
        self.read(|s| {
            let mut keys = keys.iter();
            let Some(first) = keys.next() else {
                return Ok(BTreeSet::new());
            };
            let mut out = s.set_members(first)?;
            for key in keys {
                let other = s.set_members(key)?;
                out.retain(|member| other.contains(member));
            }

            Ok(out)
        })
    }

    fn sdiff(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError> {
        self.read(|s| {
            let mut keys = keys.iter();
            let Some(first) = keys.next() else {
                return Ok(BTreeSet::new());
            };
            let mut out = s.set_members(first)?;
            for key in keys {
                let other = s.set_members(key)?;
                out.retain(|member| !other.contains(member));
            }

            Ok(out)
        })
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
    ) -> Result<Vec<String>, StoreError> {
        let scored = self.zrange_with_scores(key)?;

        Ok(scored
            .into_iter()
            .filter(|(_, score)| (min, max).contains(score))
            .map(|(member, _)| member)
            .collect())
    }

    fn zrange_by_lex(
        &self,
        key: &str,
        min: Bound<&str>,
        max: Bound<&str>,
    ) -> Result<Vec<String>, StoreError> {
        self.read(|s| {
            let Some(zset) = s.sorted_set(key)? else {
                return Ok(Vec::new());
            };

            Ok(zset
                .keys()
                .filter(|member| RangeBounds::<str>::contains(&(min, max), member.as_str()))
                .cloned()
                .collect())
        })
    }

    fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        self.read(|s| {
            let Some(zset) = s.sorted_set(key)? else {
                return Ok(Vec::new());
            };
            let mut members: Vec<(String, f64)> =
                zset.iter().map(|(m, score)| (m.clone(), *score)).collect();
            members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

            Ok(members)
        })
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.read(|s| Ok(s.hash(key)?.and_then(|h| h.get(field)).cloned()))
    }

    fn hget_many(&self, requests: &[(String, String)]) -> Result<Vec<Option<String>>, StoreError> {
        self.read(|s| {
            requests
                .iter()
                .map(|(key, field)| Ok(s.hash(key)?.and_then(|h| h.get(field)).cloned()))
                .collect()
        })
    }

    fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.read(|s| Ok(s.hash(key)?.cloned().unwrap_or_default()))
    }

    fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.read(|s| Ok(s.list(key)?.cloned().unwrap_or_default()))
    }

    fn watch(&self, keys: &[String]) -> Result<(), StoreError> {
        let state = self.store.state.lock();
        state.ensure_online()?;

        let mut watched = self.watched.borrow_mut();
        for key in keys {
            watched
                .entry(key.clone())
                .or_insert_with(|| state.version(key));
        }

        Ok(())
    }

    fn unwatch(&self) -> Result<(), StoreError> {
        self.watched.borrow_mut().clear();

        Ok(())
    }

    fn exec(&self, commands: &[Command]) -> Result<bool, StoreError> {
        let watched = std::mem::take(&mut *self.watched.borrow_mut());
        let mut state = self.store.state.lock();
        state.ensure_online()?;

        let dirty = watched
            .iter()
            .any(|(key, version)| state.version(key) != *version);
        if dirty {
            return Ok(false);
        }
        state.apply_all(commands)?;

        Ok(true)
    }
}
