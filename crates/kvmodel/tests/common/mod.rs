//! Shared schema and helpers for the integration suites.
#![allow(dead_code)]

use kvmodel::{core::store::MemoryStore, prelude::*};

static MEMBER_ATTRIBUTES: [AttributeModel; 5] = [
    AttributeModel::new("name", AttributeKind::Text).indexed(),
    AttributeModel::new("active", AttributeKind::Boolean).indexed(),
    AttributeModel::new("email", AttributeKind::Text).unique(),
    AttributeModel::new("age", AttributeKind::Integer).ranged(),
    AttributeModel::new("nickname", AttributeKind::Text),
];

pub static MEMBER: EntityModel = EntityModel::new("Member", &MEMBER_ATTRIBUTES, &[]);

pub const fn lock_config() -> LockConfig {
    LockConfig {
        timeout_ms: 5_000,
        poll_interval_ms: 2,
        lease_ms: 30_000,
        stale_retries: 3,
    }
}

pub fn backend_on(store: &MemoryStore) -> Backend {
    Backend::key_value(store.connect(), lock_config())
}

/// Save a member from `(attribute, value)` pairs and return its id.
pub fn save_member<const N: usize>(backend: &Backend, values: [(&str, Value); N]) -> String {
    let mut member = Record::new(&MEMBER);
    for (name, value) in values {
        member.set(name, value).unwrap();
    }
    member.save(backend).unwrap();

    member.id().unwrap().to_string()
}

pub fn named(backend: &Backend, name: &str, active: bool) -> String {
    save_member(backend, [("name", name.into()), ("active", active.into())])
}
