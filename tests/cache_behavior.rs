//! Cache-store behavior across concurrent requests and TTL boundaries,
//! driven by a manual clock instead of real sleeps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use market_sentiment_aggregator::cache::TtlCache;
use market_sentiment_aggregator::clock::ManualClock;

fn cache(ttl: Duration) -> (Arc<ManualClock>, Arc<TtlCache<String, u64>>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    (clock.clone(), Arc::new(TtlCache::new(clock, ttl)))
}

#[tokio::test]
async fn two_lookups_within_ttl_issue_one_fetch() {
    let (_clock, cache) = cache(Duration::from_secs(5));
    let fetches = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let fetches = fetches.clone();
        let got = cache
            .get_or_fetch("btc-up".to_string(), false, move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1)
            })
            .await
            .expect("lookup");
        assert_eq!(got.value, 1);
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_misses_for_one_key_coalesce_into_one_fetch() {
    let (_clock, cache) = cache(Duration::from_secs(5));
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = cache.clone();
        let fetches = fetches.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch("btc-up".to_string(), false, move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    // Keep the fetch in flight long enough for every task
                    // to pile up on the key lock.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>(7)
                })
                .await
                .expect("lookup")
        }));
    }

    let mut hits = 0;
    for handle in handles {
        let got = handle.await.expect("join");
        assert_eq!(got.value, 7);
        if got.was_cache_hit {
            hits += 1;
        }
    }
    assert_eq!(
        fetches.load(Ordering::SeqCst),
        1,
        "at most one fetch in flight per key"
    );
    assert_eq!(hits, 3, "the other requests ride on the first fetch");
}

#[tokio::test]
async fn distinct_keys_fetch_independently() {
    let (_clock, cache) = cache(Duration::from_secs(5));
    let fetches = Arc::new(AtomicUsize::new(0));

    for key in ["a", "b", "a"] {
        let fetches = fetches.clone();
        cache
            .get_or_fetch(key.to_string(), false, move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(0)
            })
            .await
            .expect("lookup");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn expired_entry_refetches_and_resets_ttl() {
    let (clock, cache) = cache(Duration::from_secs(5));
    let fetches = Arc::new(AtomicUsize::new(0));
    let fetch = |n: u64| {
        let fetches = fetches.clone();
        move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(n)
        }
    };

    cache
        .get_or_fetch("k".to_string(), false, fetch(1))
        .await
        .expect("warm");
    clock.advance(chrono::Duration::seconds(6));

    let refreshed = cache
        .get_or_fetch("k".to_string(), false, fetch(2))
        .await
        .expect("refresh");
    assert!(!refreshed.was_cache_hit);
    assert_eq!(refreshed.value, 2);

    let hit = cache
        .get_or_fetch("k".to_string(), false, fetch(3))
        .await
        .expect("hit");
    assert!(hit.was_cache_hit, "refresh restarted the TTL window");
    assert_eq!(hit.value, 2);
}

#[tokio::test]
async fn stale_value_survives_upstream_outage_until_recovery() {
    let (clock, cache) = cache(Duration::from_secs(5));

    cache
        .get_or_fetch("k".to_string(), false, || async { Ok::<_, String>(10) })
        .await
        .expect("warm");

    // Outage spanning several TTL windows: every lookup degrades to the
    // last known value instead of failing.
    for _ in 0..3 {
        clock.advance(chrono::Duration::seconds(6));
        let got = cache
            .get_or_fetch("k".to_string(), false, || async {
                Err::<u64, _>("upstream outage".to_string())
            })
            .await
            .expect("stale fallback");
        assert_eq!(got.value, 10);
        assert!(got.is_stale);
        assert_eq!(got.stale_error.as_deref(), Some("upstream outage"));
    }

    // Recovery overwrites the entry and clears staleness.
    clock.advance(chrono::Duration::seconds(6));
    let got = cache
        .get_or_fetch("k".to_string(), false, || async { Ok::<_, String>(11) })
        .await
        .expect("recovery");
    assert!(!got.is_stale);
    assert_eq!(got.value, 11);
}
