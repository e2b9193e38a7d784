//! # Shard Routing Tests
//!
//! Resolution must be a pure function of the key bytes and the shard list.

use kura_api::routing::{fnv1a_32, ShardMap};
use kura_core::config::ShardDescriptor;
use kura_core::error::Error;

fn shards(n: u32) -> Vec<ShardDescriptor> {
    (0..n)
        .map(|id| ShardDescriptor {
            id,
            address: format!("127.0.0.1:{}", 7001 + id),
        })
        .collect()
}

#[test]
fn test_fnv1a_known_vectors() {
    // Published FNV-1a 32-bit vectors; these are the wire contract.
    assert_eq!(fnv1a_32(b""), 0x811c9dc5);
    assert_eq!(fnv1a_32(b"a"), 0xe40c292c);
    assert_eq!(fnv1a_32(b"foobar"), 0xbf9cf968);
}

#[test]
fn test_empty_shard_map_rejected() {
    let err = ShardMap::new(vec![]).unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn test_resolve_is_deterministic() {
    let map = ShardMap::new(shards(3)).unwrap();

    let first = map.resolve(b"user:123").id;
    let second = map.resolve(b"user:123").id;
    assert_eq!(first, second);

    // A fresh map over the same shard list agrees.
    let other = ShardMap::new(shards(3)).unwrap();
    assert_eq!(other.resolve(b"user:123").id, first);
}

#[test]
fn test_resolve_stays_in_range() {
    let map = ShardMap::new(shards(3)).unwrap();

    for key in ["a", "b", "c", "d", "e"] {
        let id = map.resolve(key.as_bytes()).id;
        assert!(id < 3, "key {key:?} resolved to out-of-range shard {id}");
    }
}

#[test]
fn test_resolve_matches_hash_mod_count() {
    for count in [1u32, 2, 3, 7] {
        let map = ShardMap::new(shards(count)).unwrap();
        for key in ["", "a", "user:123", "some/longer/key"] {
            let expected = fnv1a_32(key.as_bytes()) % count;
            assert_eq!(map.resolve(key.as_bytes()).id, expected);
        }
    }
}

#[test]
fn test_single_shard_gets_everything() {
    let map = ShardMap::new(shards(1)).unwrap();
    for key in ["", "a", "b", "zzz"] {
        assert_eq!(map.resolve(key.as_bytes()).id, 0);
    }
}
