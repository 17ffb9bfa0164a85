//! Shared fixtures for unit tests: a small blog schema and in-memory
//! backends with fast lock timings.

use crate::{
    backend::Backend,
    entity::Record,
    lock::LockConfig,
    model::{
        association::AssociationModel,
        attribute::{AttributeKind, AttributeModel},
        entity::EntityModel,
    },
    store::MemoryStore,
    value::Value,
};

// ---------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------

static USER_ATTRIBUTES: [AttributeModel; 12] = [
    AttributeModel::new("name", AttributeKind::Text).indexed(),
    AttributeModel::new("email", AttributeKind::Text).unique(),
    AttributeModel::new("active", AttributeKind::Boolean).indexed(),
    AttributeModel::new("age", AttributeKind::Integer).ranged(),
    AttributeModel::new("handle", AttributeKind::Text).ranged(),
    AttributeModel::new("joined_at", AttributeKind::Timestamp).ranged(),
    AttributeModel::new("score", AttributeKind::Float),
    AttributeModel::new("nickname", AttributeKind::Text),
    AttributeModel::new("tags", AttributeKind::Set),
    AttributeModel::new("aliases", AttributeKind::List),
    AttributeModel::new("prefs", AttributeKind::Hash),
    AttributeModel::new("ranks", AttributeKind::SortedSet),
];

static USER_ASSOCIATIONS: [AssociationModel; 2] = [
    AssociationModel::has_many("posts", &POST, "author_id"),
    AssociationModel::has_one("profile", &PROFILE, "user_id"),
];

pub(crate) static USER: EntityModel = EntityModel::new("User", &USER_ATTRIBUTES, &USER_ASSOCIATIONS);

static POST_ATTRIBUTES: [AttributeModel; 3] = [
    AttributeModel::new("author_id", AttributeKind::Id).indexed(),
    AttributeModel::new("title", AttributeKind::Text).indexed(),
    AttributeModel::new("rating", AttributeKind::Float).ranged(),
];

static POST_ASSOCIATIONS: [AssociationModel; 1] =
    [AssociationModel::belongs_to("author", &USER, "author_id")];

pub(crate) static POST: EntityModel = EntityModel::new("Post", &POST_ATTRIBUTES, &POST_ASSOCIATIONS);

static PROFILE_ATTRIBUTES: [AttributeModel; 2] = [
    AttributeModel::new("user_id", AttributeKind::Id).unique(),
    AttributeModel::new("bio", AttributeKind::Text),
];

pub(crate) static PROFILE: EntityModel = EntityModel::new("Profile", &PROFILE_ATTRIBUTES, &[]);

// ---------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------

pub(crate) const fn fast_lock_config() -> LockConfig {
    LockConfig {
        timeout_ms: 2_000,
        poll_interval_ms: 10,
        lease_ms: 30_000,
        stale_retries: 3,
    }
}

/// Fresh store plus one key-value backend on it.
pub(crate) fn backend() -> (MemoryStore, Backend) {
    let store = MemoryStore::new();
    let backend = backend_on(&store);

    (store, backend)
}

/// Another backend (own connection, own lock owner) on `store`.
pub(crate) fn backend_on(store: &MemoryStore) -> Backend {
    Backend::key_value(store.connect(), fast_lock_config())
}

// ---------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------

/// Save a user with the given name and active flag; returns its id.
pub(crate) fn save_user(backend: &Backend, name: &str, active: bool) -> String {
    let mut user = Record::new(&USER)
        .with("name", name)
        .and_then(|user| user.with("active", active))
        .expect("user attributes");
    user.save(backend).expect("save user");

    user.id().expect("saved id").to_string()
}

/// Save a user built from `(attribute, value)` pairs; returns its id.
pub(crate) fn save_user_with<I, V>(backend: &Backend, values: I) -> String
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<Value>,
{
    let mut user = Record::new(&USER);
    for (name, value) in values {
        user.set(name, value).expect("user attribute");
    }
    user.save(backend).expect("save user");

    user.id().expect("saved id").to_string()
}

/// Save a post by `author`; returns its id.
pub(crate) fn save_post(backend: &Backend, author: &str, title: &str) -> String {
    let mut post = Record::new(&POST)
        .with("author_id", Value::Id(author.to_string()))
        .and_then(|post| post.with("title", title))
        .expect("post attributes");
    post.save(backend).expect("save post");

    post.id().expect("saved id").to_string()
}
