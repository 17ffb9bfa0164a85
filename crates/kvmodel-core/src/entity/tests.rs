use super::*;
use crate::{
    error::ErrorClass,
    key::Key,
    obs::{MetricsEvent, MetricsSink, with_metrics_sink},
    store::{KeyValueOps, MemoryStore},
    test_support::{POST, PROFILE, USER, backend, save_post, save_user, save_user_with},
    value::Value,
};
use chrono::{DateTime, Utc};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

fn set_members(store: &MemoryStore, key: &str) -> BTreeSet<String> {
    store.connect().smembers(key).unwrap()
}

fn load_user(backend: &Backend, id: &str) -> Record {
    Record::load(backend, &USER, id).unwrap().unwrap()
}

// ---------------------------------------------------------------------
// Attribute map
// ---------------------------------------------------------------------

#[test]
fn set_coerces_to_the_declared_kind() {
    let mut user = Record::new(&USER);
    user.set("age", "42").unwrap().set("score", 3).unwrap();

    assert_eq!(user.get("age"), &Value::Int(42));
    assert_eq!(user.get("score"), &Value::Float(3.0));
    assert_eq!(user.get("name"), &Value::Null);
}

#[test]
fn unknown_and_uncoercible_attributes_are_rejected() {
    let mut user = Record::new(&USER);

    let unknown = user.set("shoe_size", 9).unwrap_err();
    assert!(matches!(
        unknown,
        Error::Record(RecordError::UnknownAttribute { class: "User", .. })
    ));
    assert_eq!(unknown.class(), ErrorClass::InvalidInput);

    assert!(matches!(user.set("age", "old"), Err(Error::Value(_))));
}

#[test]
fn setting_null_unsets() {
    let mut user = Record::new(&USER).with("name", "Ann").unwrap();
    user.set("name", Value::Null).unwrap();

    assert_eq!(user.values().count(), 0);
}

// ---------------------------------------------------------------------
// Save and load
// ---------------------------------------------------------------------

#[test]
fn save_assigns_sequential_ids_and_round_trips() {
    let (_store, backend) = backend();
    let joined: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 123_456_000).unwrap();

    let mut user = Record::new(&USER)
        .with("name", "Ann")
        .and_then(|u| u.with("age", 30))
        .and_then(|u| u.with("score", 1.5))
        .and_then(|u| u.with("joined_at", joined))
        .and_then(|u| u.with("active", true))
        .and_then(|u| u.with("tags", Value::Set(BTreeSet::from(["a".to_string(), "b".to_string()]))))
        .and_then(|u| u.with("aliases", vec!["x".to_string(), "y".to_string()]))
        .and_then(|u| u.with("prefs", BTreeMap::from([("lang".to_string(), "en".to_string())])))
        .and_then(|u| u.with("ranks", Value::sorted_set([("gold", 2.0), ("silver", 1.0)])))
        .unwrap();
    user.save(&backend).unwrap();
    assert_eq!(user.id(), Some("1"));

    let loaded = load_user(&backend, "1");
    assert_eq!(loaded, user);
    assert_eq!(loaded.get("joined_at"), &Value::Timestamp(joined));

    let second = save_user(&backend, "Bob", false);
    assert_eq!(second, "2");
}

#[test]
fn explicit_ids_are_kept() {
    let (store, backend) = backend();

    let mut user = Record::with_id(&USER, "ann").with("name", "Ann").unwrap();
    user.save(&backend).unwrap();

    assert!(backend.exists(&USER, "ann").unwrap());
    assert!(!store.contains_key("User::attrs:id_seq"));
}

#[test]
fn load_many_preserves_order_and_gaps() {
    let (_store, backend) = backend();
    save_user(&backend, "Ann", true);
    save_user(&backend, "Bob", true);

    let loaded = Record::load_many(&backend, &USER, &["2".to_string(), "9".to_string(), "1".to_string()])
        .unwrap();
    let ids: Vec<Option<&str>> = loaded.iter().map(|r| r.as_ref().and_then(Record::id)).collect();

    assert_eq!(ids, [Some("2"), None, Some("1")]);
}

#[test]
fn emptied_collections_leave_no_key_behind() {
    let (store, backend) = backend();
    let id = save_user_with(&backend, [("tags", Value::Set(BTreeSet::from(["a".to_string()])))]);
    let tags_key = Key::attr("User", &id, "tags", crate::key::KeyShape::Set);
    assert!(store.contains_key(tags_key.name()));

    let mut user = load_user(&backend, &id);
    user.set("tags", Value::Set(BTreeSet::new())).unwrap();
    user.save(&backend).unwrap();

    assert!(!store.contains_key(tags_key.name()));
    assert_eq!(load_user(&backend, &id).get("tags"), &Value::Null);
}

// ---------------------------------------------------------------------
// Index maintenance
// ---------------------------------------------------------------------

#[test]
fn changing_a_value_moves_the_id_between_entries() {
    let (store, backend) = backend();
    let ann = save_user(&backend, "Ann", true);
    let other = save_user(&backend, "Ann", true);

    let mut user = load_user(&backend, &ann);
    user.set("name", "Bea").unwrap();
    user.save(&backend).unwrap();

    assert_eq!(set_members(&store, "User::indices:by_name:string:Ann"), BTreeSet::from([other.clone()]));
    assert_eq!(set_members(&store, "User::indices:by_name:string:Bea"), BTreeSet::from([ann]));
    assert_eq!(
        set_members(&store, "User::indices:by_name"),
        BTreeSet::from(["string:Ann".to_string(), "string:Bea".to_string()])
    );

    // the last holder leaving purges the entry and its parent reference
    let mut user = load_user(&backend, &other);
    user.set("name", "Cy").unwrap();
    user.save(&backend).unwrap();
    assert!(!store.contains_key("User::indices:by_name:string:Ann"));
    assert!(!set_members(&store, "User::indices:by_name").contains("string:Ann"));
}

#[test]
fn resaving_unchanged_records_writes_no_index_changes() {
    #[derive(Default)]
    struct Capture(RefCell<Vec<MetricsEvent>>);

    impl MetricsSink for Capture {
        fn record(&self, event: MetricsEvent) {
            self.0.borrow_mut().push(event);
        }
    }

    let (_store, backend) = backend();
    let id = save_user(&backend, "Ann", true);
    let mut user = load_user(&backend, &id);
    let capture = Rc::new(Capture::default());

    with_metrics_sink(capture.clone(), || user.save(&backend).unwrap());

    assert!(capture.0.borrow().contains(&MetricsEvent::IndexDelta {
        entity: "User",
        inserts: 0,
        removes: 0,
    }));
}

#[test]
fn range_indices_follow_the_value() {
    let (store, backend) = backend();
    let id = save_user_with(&backend, [("age", 30)]);

    let mut user = load_user(&backend, &id);
    user.set("age", 31).unwrap();
    user.save(&backend).unwrap();

    let scored = store.connect().zrange_with_scores("User::indices:by_age").unwrap();
    assert_eq!(scored, vec![(id.clone(), 31.0)]);

    user.set("age", Value::Null).unwrap();
    user.save(&backend).unwrap();
    assert!(!store.contains_key("User::indices:by_age"));
}

#[test]
fn unique_values_reject_a_second_owner() {
    let (store, backend) = backend();
    let first = save_user_with(&backend, [("email", "a@x.io")]);

    let mut second = Record::new(&USER).with("email", "a@x.io").unwrap();
    let err = second.save(&backend).unwrap_err();

    assert!(matches!(
        err,
        Error::Record(RecordError::UniqueViolation { attribute: "email", ref owner, .. }) if *owner == first
    ));
    assert_eq!(err.class(), ErrorClass::Conflict);
    assert_eq!(backend.filter(&USER).count().unwrap(), 1);
    assert_eq!(
        store.connect().hget("User::indices:by_email", "string:a@x.io").unwrap(),
        Some(first.clone())
    );

    // the owner itself may save again
    let mut owner = load_user(&backend, &first);
    owner.set("name", "Ann").unwrap();
    owner.save(&backend).unwrap();
}

#[test]
fn destroy_removes_attributes_ids_and_index_entries() {
    let (store, backend) = backend();
    let id = save_user_with(&backend, [
        ("name", Value::from("Ann")),
        ("email", Value::from("a@x.io")),
        ("age", Value::from(30)),
        ("handle", Value::from("ann")),
        ("tags", Value::Set(BTreeSet::from(["t".to_string()]))),
    ]);
    let keep = save_user(&backend, "Ann", true);

    load_user(&backend, &id).destroy(&backend).unwrap();

    assert!(!backend.exists(&USER, &id).unwrap());
    let leftovers: Vec<String> = store
        .keys()
        .into_iter()
        .filter(|key| key.starts_with(&format!("User:{id}:")))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    assert!(!store.contains_key("User::indices:by_email"));
    assert!(!store.contains_key("User::indices:by_age"));
    assert!(!store.contains_key("User::indices:by_handle"));
    assert_eq!(set_members(&store, "User::indices:by_name:string:Ann"), BTreeSet::from([keep]));
}

#[test]
fn destroying_an_unsaved_record_is_a_no_op() {
    let (store, backend) = backend();

    Record::new(&USER).destroy(&backend).unwrap();

    assert!(store.keys().is_empty());
}

// ---------------------------------------------------------------------
// Associations
// ---------------------------------------------------------------------

#[test]
fn has_many_and_belongs_to() {
    let (_store, backend) = backend();
    let ann = save_user(&backend, "Ann", true);
    let bob = save_user(&backend, "Bob", true);
    let first = save_post(&backend, &ann, "one");
    save_post(&backend, &bob, "two");
    let third = save_post(&backend, &ann, "three");

    let user = load_user(&backend, &ann);
    assert_eq!(user.associated_ids(&backend, "posts").unwrap(), [first.clone(), third]);

    let post = Record::load(&backend, &POST, &first).unwrap().unwrap();
    let authors = post.associated(&backend, "author").unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].get("name"), &Value::Text("Ann".to_string()));
}

#[test]
fn has_one_reads_the_unique_foreign_key() {
    let (_store, backend) = backend();
    let ann = save_user(&backend, "Ann", true);
    let mut profile = Record::new(&PROFILE)
        .with("user_id", Value::Id(ann.clone()))
        .and_then(|p| p.with("bio", "hi"))
        .unwrap();
    profile.save(&backend).unwrap();

    let user = load_user(&backend, &ann);
    let profiles = user.associated(&backend, "profile").unwrap();

    assert_eq!(profiles, [profile]);
    assert!(Record::new(&USER).associated_ids(&backend, "profile").unwrap().is_empty());
}

#[test]
fn unknown_associations_are_rejected() {
    let (_store, backend) = backend();
    let user = Record::new(&USER);

    let err = user.associated_ids(&backend, "friends").unwrap_err();

    assert!(matches!(
        err,
        Error::Record(RecordError::UnknownAssociation { class: "User", .. })
    ));
}
