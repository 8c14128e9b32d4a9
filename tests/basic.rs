use stripemap_rs::{Error, StripeMap};

#[test]
fn test_insert_lookup_single_bucketing() {
    // 5 buckets, keys 7, 12, 15, 22: residues 2, 2, 0, 2.
    let m = StripeMap::with_buckets(5).unwrap();
    assert!(m.is_empty());

    for (i, k) in [7i64, 12, 15, 22].iter().enumerate() {
        m.insert(*k, i as i64);
    }
    assert_eq!(m.len(), 4);

    // Bucket 2 holds the three colliding keys, newest first.
    let keys: Vec<i64> = m.iter_bucket(2).map(|(k, _)| k).collect();
    assert_eq!(keys, vec![22, 12, 7]);
    assert_eq!(m.bucket_len(2), 3);
    assert_eq!(m.bucket_len(0), 1);
    assert_eq!(m.bucket_len(1), 0);

    assert!(m.lookup(15).is_some());
    assert_eq!(m.lookup(100), None);
}

#[test]
fn test_duplicate_key_most_recent_wins() {
    let m = StripeMap::with_buckets(8).unwrap();
    m.insert(42, 1);
    m.insert(42, 2);
    assert_eq!(m.lookup(42), Some(2));
    // Both entries stay in the chain; no replacement happens.
    assert_eq!(m.len(), 2);
}

#[test]
fn test_lookup_is_idempotent() {
    let m = StripeMap::with_buckets(3).unwrap();
    m.insert(9, 900);
    m.insert(10, 1000);
    for _ in 0..100 {
        assert_eq!(m.lookup(9), Some(900));
        assert_eq!(m.lookup(10), Some(1000));
        assert_eq!(m.lookup(11), None);
    }
}

#[test]
fn test_negative_keys_stay_in_range() {
    let m = StripeMap::with_buckets(5).unwrap();
    for k in [-1i64, -5, -7, -100, i64::MIN + 1] {
        m.insert(k, k);
        assert_eq!(m.lookup(k), Some(k));
    }
    assert_eq!(m.len(), 5);
}

#[test]
fn test_bucket_residency_invariant() {
    let m = StripeMap::with_buckets(7).unwrap();
    for k in 0..500i64 {
        m.insert(k * 13 - 250, 0);
    }
    for b in 0..m.bucket_count() {
        for (k, _) in m.iter_bucket(b) {
            assert_eq!(k.rem_euclid(7) as usize, b);
        }
    }
}

#[test]
fn test_lookup_on_empty_table() {
    let m = StripeMap::with_buckets(1).unwrap();
    assert_eq!(m.lookup(0), None);
    assert_eq!(m.lookup(-3), None);
}

#[test]
fn test_zero_buckets_rejected() {
    assert_eq!(
        StripeMap::with_buckets(0).unwrap_err(),
        Error::InvalidBucketCount
    );
}
