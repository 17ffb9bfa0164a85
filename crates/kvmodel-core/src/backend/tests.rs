use super::*;
use crate::{
    filter::Regex,
    key::{IndexFragment, KeyError, TypeTag},
    model::index::RangeMode,
    store::{Command, MemoryStore},
    test_support::{USER, backend, backend_on, save_user},
};
use std::{collections::BTreeSet, panic};

fn set_key(name: &str) -> Key {
    Key::new(name, KeyShape::Set)
}

fn user_attr(name: &str) -> &'static AttributeModel {
    USER.attribute(name).unwrap()
}

// ---------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------

#[test]
fn add_picks_the_command_for_the_key_shape() {
    let mut mutation = Mutation::new();
    mutation
        .add(&set_key("s"), "a")
        .unwrap()
        .add(&Key::new("l", KeyShape::List), "b")
        .unwrap()
        .add(&Key::new("z", KeyShape::SortedSet), Member::scored("c", 2.5))
        .unwrap()
        .add(&Key::new("h", KeyShape::Hash), Member::field("f", "v"))
        .unwrap();

    let names: Vec<&str> = mutation.commands().iter().map(Command::name).collect();
    assert_eq!(names, ["SADD", "RPUSH", "ZADD", "HSET"]);
}

#[test]
fn mismatched_members_are_rejected() {
    let mut mutation = Mutation::new();

    let scalar = mutation.add(&Key::new("x", KeyShape::Scalar), "a").unwrap_err();
    assert!(matches!(scalar, KeyError::ShapeMismatch { operation: "add", .. }));

    let hash = mutation.add(&Key::new("h", KeyShape::Hash), "bare").unwrap_err();
    assert!(matches!(hash, KeyError::InvalidMember { shape: KeyShape::Hash, .. }));

    let list = mutation.delete(&Key::new("l", KeyShape::List), "a").unwrap_err();
    assert!(matches!(list, KeyError::ShapeMismatch { operation: "delete", .. }));

    assert!(mutation.set(&set_key("s"), "v").is_err());
    assert!(mutation.clear(&Key::new("x", KeyShape::Scalar)).is_err());
    assert!(mutation.is_empty());
}

#[test]
fn purge_entry_drops_the_entry_and_its_parent_reference() {
    let parent = set_key("P::indices:by_a");
    let fragment = IndexFragment::parse("string:x").unwrap();
    let entry = Key::index_entry("P", "a", &fragment);

    let mut mutation = Mutation::new();
    mutation.purge_entry(&parent, &entry, &fragment).unwrap();

    assert_eq!(mutation.into_commands(), vec![
        Command::Del {
            key: "P::indices:by_a:string:x".to_string()
        },
        Command::SRem {
            key: "P::indices:by_a".to_string(),
            member: "string:x".to_string()
        },
    ]);
}

// ---------------------------------------------------------------------
// Writes and reads
// ---------------------------------------------------------------------

#[test]
fn single_operations_round_trip_through_the_store() {
    let (store, backend) = backend();
    let source = set_key("src");
    let destination = set_key("dst");

    backend.set(&Key::new("scalar", KeyShape::Scalar), "1").unwrap();
    backend.add(&source, "a").unwrap();
    backend.add(&source, "b").unwrap();
    backend.move_member(&source, &destination, "a").unwrap();
    backend.delete(&source, "b").unwrap();

    assert_eq!(backend.members(&destination).unwrap(), ["a"]);
    assert!(backend.members(&source).unwrap().is_empty());
    assert!(!store.contains_key("src"));

    backend.clear(&destination).unwrap();
    backend.purge(&Key::new("scalar", KeyShape::Scalar)).unwrap();
    assert!(store.keys().is_empty());
}

#[test]
fn purging_a_value_index_entry_drops_its_parent_reference() {
    let (store, backend) = backend();
    save_user(&backend, "Ann", true);
    let bob = save_user(&backend, "Bob", true);

    backend.purge(&set_key("User::indices:by_name:string:Ann")).unwrap();

    assert!(!store.contains_key("User::indices:by_name:string:Ann"));
    assert_eq!(
        store.connect().smembers("User::indices:by_name").unwrap(),
        BTreeSet::from(["string:Bob".to_string()])
    );
    assert_eq!(
        backend.filter(&USER).intersect([("name", Regex::new("^(Ann|Bob)$").unwrap())]).ids().unwrap(),
        [bob]
    );
}

#[test]
fn purging_other_keys_is_a_plain_delete() {
    let (store, backend) = backend();
    save_user(&backend, "Ann", true);

    backend.purge(&set_key("User::indices:by_name")).unwrap();
    backend.purge(&Key::attrs("User", "1")).unwrap();

    assert!(!store.contains_key("User::indices:by_name"));
    assert!(!store.contains_key("User:1:attrs"));
    assert!(store.contains_key("User::indices:by_name:string:Ann"));
}

#[test]
fn index_parent_splits_value_index_entries_only() {
    let entry = set_key("User::indices:by_name:string:New%20York");
    let (parent, fragment) = entry.index_parent().unwrap();
    assert_eq!(parent, set_key("User::indices:by_name"));
    assert_eq!(fragment, "string:New%20York");

    assert!(set_key("User::indices:by_name").index_parent().is_none());
    assert!(set_key("User::attrs:ids").index_parent().is_none());
    assert!(
        Key::new("User::indices:by_email", KeyShape::Hash)
            .index_parent()
            .is_none()
    );
}

#[test]
fn members_requires_a_set_key() {
    let (_store, backend) = backend();

    let err = backend.members(&Key::new("h", KeyShape::Hash)).unwrap_err();

    assert!(matches!(err, Error::Key(KeyError::ShapeMismatch { .. })));
}

#[test]
fn mutations_apply_atomically() {
    let (store, backend) = backend();
    store
        .connect()
        .exec(&[Command::Set {
            key: "taken".to_string(),
            value: "scalar".to_string(),
        }])
        .unwrap();

    let mut mutation = Mutation::new();
    mutation.add(&set_key("fresh"), "a").unwrap();
    mutation.add(&set_key("taken"), "b").unwrap();

    let err = backend.apply(mutation).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::WrongType { .. })));
    assert!(!store.contains_key("fresh"));
}

#[test]
fn empty_mutations_are_free() {
    let (store, backend) = backend();
    store.set_offline(true);

    backend.apply(Mutation::new()).unwrap();
}

#[test]
fn next_id_counts_per_class() {
    let (_store, backend) = backend();

    assert_eq!(backend.next_id(&USER).unwrap(), "1");
    assert_eq!(backend.next_id(&USER).unwrap(), "2");
}

#[test]
fn fetch_decodes_scalars_and_reads_collections() {
    let (_store, backend) = backend();
    let attrs = Key::attrs("User", "7");
    let tags = Key::attr("User", "7", "tags", KeyShape::Set);
    let aliases = Key::attr("User", "7", "aliases", KeyShape::List);

    let mut mutation = Mutation::new();
    mutation
        .add(&attrs, Member::field("age", "42"))
        .unwrap()
        .add(&attrs, Member::field("active", "true"))
        .unwrap()
        .add(&tags, "x")
        .unwrap()
        .add(&aliases, "b")
        .unwrap()
        .add(&aliases, "a")
        .unwrap();
    backend.apply(mutation).unwrap();

    let wanted = [
        user_attr("age"),
        user_attr("active"),
        user_attr("name"),
        user_attr("tags"),
        user_attr("aliases"),
        user_attr("prefs"),
    ];
    let rows = backend
        .fetch(&USER, &["7".to_string(), "8".to_string()], &wanted)
        .unwrap();

    assert_eq!(rows[0], vec![
        Value::Int(42),
        Value::Bool(true),
        Value::Null,
        Value::Set(BTreeSet::from(["x".to_string()])),
        Value::List(vec!["b".to_string(), "a".to_string()]),
        Value::Hash(BTreeMap::new()),
    ]);
    assert_eq!(rows[1][0], Value::Null);
    assert_eq!(backend.get(&USER, "7", user_attr("age")).unwrap(), Value::Int(42));
}

#[test]
fn corrupt_scalars_surface_as_errors() {
    let (_store, backend) = backend();
    backend
        .add(&Key::attrs("User", "1"), Member::field("age", "old"))
        .unwrap();

    let err = backend.get(&USER, "1", user_attr("age")).unwrap_err();

    assert!(matches!(err, Error::Value(_)));
}

#[test]
fn offline_store_is_unavailable() {
    let (store, backend) = backend();
    store.set_offline(true);

    let err = backend.exists(&USER, "1").unwrap_err();

    assert_eq!(err.class(), crate::ErrorClass::Unavailable);
}

// ---------------------------------------------------------------------
// Index targets
// ---------------------------------------------------------------------

#[test]
fn value_index_targets_coerce_before_encoding() {
    let target = index_target(&USER, user_attr("active"), &Value::Text("true".into()))
        .unwrap()
        .unwrap();

    let IndexTarget::Value { parent, entry, fragment } = target else {
        panic!("expected a value target");
    };
    assert_eq!(parent.name(), "User::indices:by_active");
    assert_eq!(entry.name(), "User::indices:by_active:boolean:true");
    assert_eq!(fragment.tag(), TypeTag::Boolean);
}

#[test]
fn unique_and_range_targets_skip_nulls() {
    assert!(index_target(&USER, user_attr("email"), &Value::Null).unwrap().is_none());
    assert!(index_target(&USER, user_attr("age"), &Value::Null).unwrap().is_none());
    assert!(index_target(&USER, user_attr("nickname"), &Value::from("x")).unwrap().is_none());

    // value indices do index nulls
    let target = index_target(&USER, user_attr("name"), &Value::Null).unwrap();
    assert!(matches!(target, Some(IndexTarget::Value { ref fragment, .. }) if fragment.tag() == TypeTag::Null));
}

#[test]
fn range_targets_score_numbers_and_order_text_lexically() {
    let age = index_target(&USER, user_attr("age"), &Value::from("30")).unwrap();
    assert_eq!(age, Some(IndexTarget::Range {
        key: Key::new("User::indices:by_age", KeyShape::SortedSet),
        score: 30.0,
        lex: None,
    }));

    let handle = index_target(&USER, user_attr("handle"), &Value::from("ann")).unwrap();
    let Some(IndexTarget::Range { lex: Some(lex), score, .. }) = handle else {
        panic!("expected a lex range target");
    };
    assert_eq!((lex.as_str(), score), ("ann", 0.0));

    let member = IndexTarget::range_member(Some("ann"), "12");
    assert_eq!(member, "ann\012");
    assert_eq!(IndexTarget::range_member_id(&member, RangeMode::Lex), "12");
    assert_eq!(IndexTarget::range_member_id("12", RangeMode::Score), "12");
}

#[test]
fn safe_value_escapes_separators() {
    assert_eq!(safe_value(user_attr("name"), &Value::from("New York: 100%")).unwrap(), "New%20York%3A%20100%%");
    assert!(safe_value(user_attr("age"), &Value::from("many")).is_err());
}

// ---------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------

#[test]
fn nested_locks_reuse_a_covering_lease() {
    let (store, backend) = backend();

    let result = backend.lock(["User", "Post"], || {
        assert_eq!(
            backend.held_classes().map(|held| held.to_vec()),
            Some(vec!["Post".to_string(), "User".to_string()])
        );
        backend.lock(["Post"], || Ok(store.contains_key("Post::lock:owner")))
    });

    assert!(result.unwrap());
    assert!(backend.held_classes().is_none());
    assert!(store.keys().is_empty());
}

#[test]
fn nested_locks_outside_the_lease_conflict() {
    let (_store, backend) = backend();

    let err = backend
        .lock(["User"], || backend.lock(["User", "Post"], || Ok(())))
        .unwrap_err();

    assert!(matches!(err, Error::Lock(LockError::ClassConflict { .. })));
    assert_eq!(err.class(), crate::ErrorClass::Conflict);
}

#[test]
fn the_lock_is_released_when_the_body_fails() {
    let (store, backend) = backend();

    let err = backend
        .lock(["User"], || -> Result<(), Error> { Err(LockError::NotHeld.into()) })
        .unwrap_err();

    assert!(matches!(err, Error::Lock(LockError::NotHeld)));
    assert!(store.keys().is_empty());
    assert!(backend.held_classes().is_none());
}

#[test]
fn the_lock_is_released_when_the_body_panics() {
    let (store, backend) = backend();

    let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let _ = backend.lock(["User"], || -> Result<(), Error> { panic!("body failed") });
    }));

    assert!(outcome.is_err());
    assert!(store.keys().is_empty());

    // and another backend can take it right away
    backend_on(&store).lock(["User"], || Ok(())).unwrap();
}

#[test]
fn a_failed_release_keeps_the_body_result() {
    let (store, backend) = backend();

    let value = backend.lock(["User"], || {
        store.set_offline(true);
        Ok(7)
    });
    store.set_offline(false);

    assert_eq!(value.unwrap(), 7);
    assert!(backend.held_classes().is_none());
    // the unreleased pair stays until its lease runs out
    assert!(store.contains_key("User::lock:owner"));
}

#[test]
fn extend_needs_a_held_lock() {
    let (store, backend) = backend();

    let err = backend.extend_lock(Duration::from_secs(5)).unwrap_err();
    assert!(matches!(err, Error::Lock(LockError::NotHeld)));

    backend
        .lock(["User"], || backend.extend_lock(Duration::from_secs(3_600)))
        .unwrap();
    assert!(store.keys().is_empty());
}

#[test]
fn native_atomic_backends_never_write_lock_keys() {
    let store = MemoryStore::new();
    let backend = Backend::native_atomic(store.connect());

    let seen = backend
        .lock(["User"], || Ok(backend.held_classes()))
        .unwrap();

    assert_eq!(backend.kind(), BackendKind::NativeAtomic);
    assert!(seen.is_some());
    assert!(store.keys().is_empty());
}

#[test]
fn backends_from_config_use_its_lock_timings() {
    let store = MemoryStore::new();
    let config = Config::from_toml_str("[lock]\ntimeout_ms = 40\npoll_interval_ms = 5\n").unwrap();
    let holder = Backend::from_config(store.connect(), &config);
    let waiter = Backend::from_config(store.connect(), &config);

    holder
        .lock(["User"], || {
            let err = waiter.lock(["User"], || Ok(())).unwrap_err();
            assert!(matches!(err, Error::Lock(LockError::NotAcquired { .. })));
            Ok(())
        })
        .unwrap();
    assert_ne!(holder.owner_id(), waiter.owner_id());
}
