use std::time::Duration;

use querygate_cache::{BoundedCache, CacheKey};

const LONG: Duration = Duration::from_secs(60);

fn key(text: &str) -> CacheKey {
    CacheKey::from_normalized(text)
}

fn cache(max_size: usize) -> BoundedCache<String> {
    BoundedCache::new(max_size, LONG, Duration::from_secs(3600)).unwrap()
}

#[test]
fn get_after_set_hits() {
    let cache = cache(10);
    cache.set(key("a"), "answer".to_string(), LONG).unwrap();

    assert_eq!(cache.get(&key("a")), Some("answer".to_string()));
    assert_eq!(cache.get(&key("b")), None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 1);
    assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
}

#[test]
fn set_overwrites_existing_key() {
    let cache = cache(10);
    cache.set_default(key("a"), "old".to_string()).unwrap();
    cache.set_default(key("a"), "new".to_string()).unwrap();
    assert_eq!(cache.get(&key("a")), Some("new".to_string()));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn expired_entry_is_a_miss() {
    let cache = cache(10);
    cache
        .set(key("a"), "short".to_string(), Duration::from_millis(50))
        .unwrap();
    assert!(cache.contains(&key("a")));

    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(!cache.contains(&key("a")));
    assert_eq!(cache.get(&key("a")), None);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.size, 0);
}

#[test]
fn least_recently_used_entry_is_evicted() {
    let cache = cache(2);
    cache.set_default(key("a"), "a".to_string()).unwrap();
    cache.set_default(key("b"), "b".to_string()).unwrap();

    // Touch "a" so "b" becomes the eviction candidate.
    assert!(cache.get(&key("a")).is_some());
    cache.set_default(key("c"), "c".to_string()).unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&key("a")));
    assert!(!cache.contains(&key("b")));
    assert!(cache.contains(&key("c")));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn size_never_exceeds_capacity() {
    let cache = cache(3);
    for i in 0..20 {
        cache
            .set_default(key(&format!("q{i}")), i.to_string())
            .unwrap();
        assert!(cache.len() <= 3);
    }
    assert_eq!(cache.stats().evictions, 17);
}

#[test]
fn zero_ttl_is_rejected() {
    let cache = cache(10);
    assert!(cache.set(key("a"), "x".to_string(), Duration::ZERO).is_err());
    assert!(cache.is_empty());
}

#[test]
fn invalid_construction_is_rejected() {
    assert!(BoundedCache::<String>::new(0, LONG, LONG).is_err());
    assert!(BoundedCache::<String>::new(10, Duration::ZERO, LONG).is_err());
    assert!(BoundedCache::<String>::new(10, LONG, Duration::ZERO).is_err());
}

#[test]
fn clear_empties_but_keeps_counters() {
    let cache = cache(10);
    cache.set_default(key("a"), "a".to_string()).unwrap();
    cache.set_default(key("b"), "b".to_string()).unwrap();
    cache.get(&key("a"));

    assert_eq!(cache.clear(), 2);
    assert!(cache.is_empty());
    assert_eq!(cache.get(&key("a")), None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn remove_reports_presence() {
    let cache = cache(10);
    cache.set_default(key("a"), "a".to_string()).unwrap();
    assert!(cache.remove(&key("a")));
    assert!(!cache.remove(&key("a")));
}

#[test]
fn schema_lives_beside_queries() {
    let cache = BoundedCache::new(10, LONG, Duration::from_secs(7200)).unwrap();
    assert_eq!(cache.get_schema(), None);

    cache.set_schema("tables: orders, stock".to_string()).unwrap();
    cache.set_default(key("a"), "a".to_string()).unwrap();

    assert_eq!(cache.get_schema(), Some("tables: orders, stock".to_string()));
    assert!(cache.contains(&CacheKey::schema()));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn cleanup_sweeps_only_expired_entries() {
    let cache = cache(10);
    cache
        .set(key("short"), "s".to_string(), Duration::from_millis(30))
        .unwrap();
    cache.set_default(key("long"), "l".to_string()).unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.cleanup_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(&key("long")));
    assert_eq!(cache.stats().expirations, 1);
    assert_eq!(cache.cleanup_expired(), 0);
}
