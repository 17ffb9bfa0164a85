use super::*;
use std::ops::Bound;

fn set_cmd(key: &str, value: &str) -> Command {
    Command::Set {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn sadd(key: &str, member: &str) -> Command {
    Command::SAdd {
        key: key.to_string(),
        member: member.to_string(),
    }
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[test]
fn msetnx_requires_every_key_absent() {
    let store = MemoryStore::new();
    let conn = store.connect();
    let pairs = [
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ];

    assert!(conn.set_all_if_absent(&pairs).unwrap());
    assert!(!conn.set_all_if_absent(&pairs[1..]).unwrap());
    assert_eq!(conn.mget(&keys(&["a", "b", "c"])).unwrap(), vec![
        Some("1".to_string()),
        Some("2".to_string()),
        None
    ]);
}

#[test]
fn incr_starts_at_one() {
    let conn = MemoryStore::new().connect();

    assert_eq!(conn.incr("seq").unwrap(), 1);
    assert_eq!(conn.incr("seq").unwrap(), 2);
}

#[test]
fn exec_aborts_when_watched_key_changes() {
    let store = MemoryStore::new();
    let first = store.connect();
    let second = store.connect();

    first.watch(&keys(&["k"])).unwrap();
    assert!(second.exec(&[set_cmd("k", "theirs")]).unwrap());
    assert!(!first.exec(&[set_cmd("k", "mine")]).unwrap());
    assert_eq!(first.get("k").unwrap().as_deref(), Some("theirs"));

    // watches are cleared by exec
    assert!(first.exec(&[set_cmd("k", "mine")]).unwrap());
    assert_eq!(first.get("k").unwrap().as_deref(), Some("mine"));
}

#[test]
fn unwatch_forgets_watched_keys() {
    let store = MemoryStore::new();
    let first = store.connect();
    let second = store.connect();

    first.watch(&keys(&["k"])).unwrap();
    second.exec(&[set_cmd("k", "x")]).unwrap();
    first.unwatch().unwrap();

    assert!(first.exec(&[set_cmd("k", "y")]).unwrap());
}

#[test]
fn exec_is_all_or_nothing() {
    let store = MemoryStore::new();
    let conn = store.connect();
    conn.exec(&[set_cmd("scalar", "1")]).unwrap();

    let err = conn
        .exec(&[sadd("members", "a"), sadd("scalar", "b")])
        .expect_err("sadd on a string key must fail");

    assert!(matches!(err, StoreError::WrongType { .. }));
    assert!(!store.contains_key("members"));
}

#[test]
fn empty_collections_disappear() {
    let store = MemoryStore::new();
    let conn = store.connect();

    conn.exec(&[sadd("s", "a")]).unwrap();
    conn.exec(&[Command::SRem {
        key: "s".to_string(),
        member: "a".to_string(),
    }])
    .unwrap();

    assert!(store.keys().is_empty());
}

#[test]
fn smove_relocates_member() {
    let conn = MemoryStore::new().connect();
    conn.exec(&[sadd("from", "x")]).unwrap();

    conn.exec(&[Command::SMove {
        source: "from".to_string(),
        destination: "to".to_string(),
        member: "x".to_string(),
    }])
    .unwrap();

    assert!(conn.smembers("from").unwrap().is_empty());
    assert!(conn.sismember("to", "x").unwrap());
}

#[test]
fn set_algebra_reads() {
    let conn = MemoryStore::new().connect();
    conn.exec(&[
        sadd("a", "1"),
        sadd("a", "2"),
        sadd("a", "3"),
        sadd("b", "2"),
        sadd("c", "3"),
    ])
    .unwrap();

    let union: Vec<_> = conn.sunion(&keys(&["b", "c"])).unwrap().into_iter().collect();
    let inter: Vec<_> = conn.sinter(&keys(&["a", "b"])).unwrap().into_iter().collect();
    let diff: Vec<_> = conn
        .sdiff(&keys(&["a", "b", "c"]))
        .unwrap()
        .into_iter()
        .collect();

    assert_eq!(union, ["2", "3"]);
    assert_eq!(inter, ["2"]);
    assert_eq!(diff, ["1"]);
    assert_eq!(conn.scard("a").unwrap(), 3);
    assert!(conn.sinter(&keys(&["a", "missing"])).unwrap().is_empty());
}

#[test]
fn sorted_set_ranges() {
    let conn = MemoryStore::new().connect();
    let zadd = |member: &str, score: f64| Command::ZAdd {
        key: "z".to_string(),
        member: member.to_string(),
        score,
    };
    conn.exec(&[zadd("c", 3.0), zadd("a", 1.0), zadd("b", 2.0)])
        .unwrap();

    let by_score = conn
        .zrange_by_score("z", Bound::Excluded(1.0), Bound::Unbounded)
        .unwrap();
    assert_eq!(by_score, ["b", "c"]);

    let by_lex = conn
        .zrange_by_lex("z", Bound::Included("b"), Bound::Excluded("c"))
        .unwrap();
    assert_eq!(by_lex, ["b"]);

    let scored = conn.zrange_with_scores("z").unwrap();
    assert_eq!(scored[0], ("a".to_string(), 1.0));
}

#[test]
fn hash_reads() {
    let conn = MemoryStore::new().connect();
    conn.exec(&[Command::HSet {
        key: "h".to_string(),
        field: "f".to_string(),
        value: "v".to_string(),
    }])
    .unwrap();

    assert_eq!(conn.hget("h", "f").unwrap().as_deref(), Some("v"));
    assert_eq!(
        conn.hget_many(&[
            ("h".to_string(), "f".to_string()),
            ("h".to_string(), "g".to_string()),
        ])
        .unwrap(),
        vec![Some("v".to_string()), None]
    );
    assert_eq!(conn.hgetall("h").unwrap().len(), 1);
}

#[test]
fn wrong_type_reads_fail() {
    let conn = MemoryStore::new().connect();
    conn.exec(&[set_cmd("k", "v")]).unwrap();

    assert!(matches!(
        conn.smembers("k"),
        Err(StoreError::WrongType { .. })
    ));
}

#[test]
fn offline_store_reports_connectivity() {
    let store = MemoryStore::new();
    let conn = store.connect();
    store.set_offline(true);

    assert!(matches!(
        conn.get("k"),
        Err(StoreError::Connectivity { .. })
    ));

    store.set_offline(false);
    assert!(conn.get("k").unwrap().is_none());
}
