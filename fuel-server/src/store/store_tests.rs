//! Unit tests for the station data store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};

use super::*;
use crate::backend::{MockBackend, Normalizer, PaginationConfig, PaginationFetcher};
use crate::domain::RealtimeUpdate;

fn live_rows(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "id": format!("live-{i}"),
                "name": format!("Live station {i}"),
                "city": "Mechelen",
                "lat": 51.02 + i as f64 * 0.001,
                "lng": 4.47,
                "diesel": 1.50
            })
        })
        .collect()
}

fn store_with(mock: &Arc<MockBackend>, config: StoreConfig) -> StationDataStore {
    let fetcher = PaginationFetcher::new(
        mock.clone(),
        PaginationConfig::new(100, 10).with_retries(0, 1),
    );
    StationDataStore::new(fetcher, Normalizer::new(), config)
}

fn store(mock: &Arc<MockBackend>) -> StationDataStore {
    store_with(mock, StoreConfig::default())
}

#[tokio::test]
async fn two_fetches_within_ttl_hit_backend_once() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(3)));
    let store = store(&mock);

    let first = store.fetch_stations().await;
    let second = store.fetch_stations().await;

    assert_eq!(mock.calls(), 1);
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.stations.len(), 3);
    assert_eq!(second.source, Source::Live);
}

#[tokio::test]
async fn concurrent_fetches_share_one_request() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(4)).with_latency(Duration::from_millis(50)));
    let store = store(&mock);

    let outcomes = futures::future::join_all((0..5).map(|_| store.fetch_stations())).await;

    assert_eq!(mock.calls(), 1);
    for outcome in outcomes {
        assert_eq!(outcome.stations.len(), 4);
        assert_eq!(outcome.source, Source::Live);
    }
}

#[tokio::test]
async fn failure_serves_fallback() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(3)));
    mock.set_failing(true);
    let store = store(&mock);

    let outcome = store.fetch_stations().await;

    assert_eq!(outcome.source, Source::Fallback);
    assert!(!outcome.stations.is_empty());
    assert!(matches!(outcome.error, Some(SyncError::Network { .. })));
    assert_eq!(store.active_source(), Source::Fallback);
}

#[tokio::test]
async fn manual_retry_after_failure_goes_live() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(3)));
    mock.set_failing(true);
    let store = store(&mock);

    let failed = store.fetch_stations().await;
    assert_eq!(store.status().await.source, Source::Fallback);
    assert!(failed.stations.iter().all(|s| is_fallback_id(&s.id)));

    mock.set_failing(false);
    store.invalidate().await;
    let retried = store.fetch_stations().await;

    let status = store.status().await;
    assert_eq!(status.source, Source::Live);
    assert!(status.last_error.is_none());
    assert_eq!(retried.source, Source::Live);
    assert_eq!(retried.stations.len(), 3);
    assert!(!retried.stations.iter().any(|s| is_fallback_id(&s.id)));
}

#[tokio::test]
async fn fallback_is_cached_briefly() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(3)));
    mock.set_failing(true);
    let store = store(&mock);

    store.fetch_stations().await;
    let again = store.fetch_stations().await;

    assert_eq!(mock.calls(), 1);
    assert!(again.from_cache);
    assert_eq!(again.source, Source::Fallback);
}

#[tokio::test]
async fn partial_pages_are_served_live_with_error() {
    let page = |start: usize| live_rows(start + 2).split_off(start);
    let mock = Arc::new(MockBackend::from_pages(vec![page(0), page(2), page(4)]).fail_from_page(2));
    let fetcher = PaginationFetcher::new(mock.clone(), PaginationConfig::new(2, 10).with_retries(0, 1));
    let store = StationDataStore::new(fetcher, Normalizer::new(), StoreConfig::default());

    let outcome = store.fetch_stations().await;

    assert_eq!(outcome.source, Source::Live);
    assert_eq!(outcome.stations.len(), 2);
    assert!(matches!(outcome.error, Some(SyncError::Partial { pages: 1, .. })));
}

#[tokio::test]
async fn empty_backend_falls_back() {
    let mock = Arc::new(MockBackend::from_rows(Vec::new()));
    let store = store(&mock);

    let outcome = store.fetch_stations().await;

    assert_eq!(outcome.source, Source::Fallback);
    assert_eq!(outcome.error, Some(SyncError::EmptyDataset));
}

#[tokio::test]
async fn unusable_rows_fall_back_with_parse_error() {
    let mock = Arc::new(MockBackend::from_rows(vec![json!({ "name": "no id" }), json!(42)]));
    let store = store(&mock);

    let outcome = store.fetch_stations().await;

    assert_eq!(outcome.source, Source::Fallback);
    assert!(matches!(outcome.error, Some(SyncError::Parse { .. })));
    assert_eq!(outcome.stats.rows_skipped, 2);
}

#[tokio::test]
async fn stale_snapshot_is_refetched() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(2)));
    let store = store_with(&mock, StoreConfig::new(Duration::from_millis(80)));

    store.fetch_stations().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!store.status().await.cache_valid);

    let outcome = store.fetch_stations().await;

    assert_eq!(mock.calls(), 2);
    assert!(!outcome.from_cache);
}

#[tokio::test]
async fn status_before_and_after_fetch() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(5)));
    let store = store(&mock);

    let before = store.status().await;
    assert!(!before.cache_valid);
    assert!(before.last_fetch.is_none());
    assert_eq!(before.source, Source::Fallback);

    store.fetch_stations().await;

    let after = store.status().await;
    assert!(after.cache_valid);
    assert!(after.last_fetch.is_some());
    assert_eq!(after.source, Source::Live);
    assert_eq!(after.station_count, 5);
    assert!(!after.fetch_in_flight);
}

#[tokio::test]
async fn invalidate_bypasses_cache() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(2)));
    let store = store(&mock);

    store.fetch_stations().await;
    store.invalidate().await;
    assert!(!store.status().await.cache_valid);

    mock.set_rows(live_rows(6));
    let outcome = store.fetch_stations().await;

    assert_eq!(mock.calls(), 2);
    assert_eq!(outcome.stations.len(), 6);
}

#[tokio::test]
async fn realtime_merge_is_last_write_wins() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(2)));
    let store = store(&mock);
    store.fetch_stations().await;

    let later = Utc::now() + chrono::Duration::seconds(5);
    let earlier = Utc::now() + chrono::Duration::seconds(3);

    assert_eq!(
        store.apply_update(RealtimeUpdate::price("live-0", "diesel", 1.85, later)).await,
        MergeOutcome::Applied
    );
    assert_eq!(
        store.apply_update(RealtimeUpdate::price("live-0", "diesel", 1.65, earlier)).await,
        MergeOutcome::Stale
    );
    assert_eq!(
        store.apply_update(RealtimeUpdate::price("nope", "diesel", 1.0, later)).await,
        MergeOutcome::UnknownStation
    );

    let outcome = store.fetch_stations().await;
    let station = outcome.stations.iter().find(|s| s.id.as_str() == "live-0").unwrap();
    assert_eq!(station.fuel_prices.get("diesel"), Some(1.85));
    assert_eq!(station.last_updated, later);
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn update_replaces_one_station_in_place() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(500)));
    let store = store(&mock);
    let before = store.fetch_stations().await;

    let at = Utc::now() + chrono::Duration::seconds(5);
    let outcome = store.apply_update(RealtimeUpdate::price("live-250", "diesel", 1.77, at)).await;
    assert_eq!(outcome, MergeOutcome::Applied);

    let after = store.fetch_stations().await;
    assert_eq!(after.stations.len(), 500);
    assert_eq!(after.stations[250].id.as_str(), "live-250");
    assert_eq!(after.stations[250].fuel_prices.get("diesel"), Some(1.77));
    assert_eq!(before.stations[250].fuel_prices.get("diesel"), Some(1.50));
    assert_eq!(after.stations[249], before.stations[249]);
    assert_eq!(after.stations[251], before.stations[251]);
}

#[tokio::test]
async fn update_without_snapshot_is_not_held() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(1)));
    let store = store(&mock);

    let outcome = store
        .apply_update(RealtimeUpdate::price("live-0", "diesel", 2.0, Utc::now()))
        .await;

    assert_eq!(outcome, MergeOutcome::NoSnapshot);
}

#[tokio::test]
async fn updates_during_fetch_survive_the_refresh() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(2)).with_latency(Duration::from_millis(100)));
    let store = store(&mock);

    let fetch = tokio::spawn({
        let store = store.clone();
        async move { store.fetch_stations().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.status().await.fetch_in_flight);

    let newer = store
        .apply_update(RealtimeUpdate::price("live-0", "diesel", 1.99, Utc::now()))
        .await;
    let older = store
        .apply_update(RealtimeUpdate::price(
            "live-1",
            "diesel",
            1.11,
            Utc::now() - chrono::Duration::hours(1),
        ))
        .await;
    assert_eq!(newer, MergeOutcome::Buffered);
    assert_eq!(older, MergeOutcome::Buffered);

    let outcome = fetch.await.unwrap();

    let price = |id: &str| {
        outcome
            .stations
            .iter()
            .find(|s| s.id.as_str() == id)
            .and_then(|s| s.fuel_prices.get("diesel"))
    };
    assert_eq!(price("live-0"), Some(1.99));
    assert_eq!(price("live-1"), Some(1.50));
}

#[tokio::test]
async fn invalidate_during_fetch_discards_its_result() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(2)).with_latency(Duration::from_millis(80)));
    let store = store(&mock);

    let fetch = tokio::spawn({
        let store = store.clone();
        async move { store.fetch_stations().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.invalidate().await;

    let superseded = fetch.await.unwrap();
    assert_eq!(superseded.source, Source::Live);
    assert!(!store.status().await.cache_valid);

    store.fetch_stations().await;
    assert_eq!(mock.calls(), 2);
    assert!(store.status().await.cache_valid);
}

#[tokio::test]
async fn shutdown_ignores_pending_fetch_and_goes_offline() {
    let mock = Arc::new(MockBackend::from_rows(live_rows(2)).with_latency(Duration::from_millis(80)));
    let store = store(&mock);

    let fetch = tokio::spawn({
        let store = store.clone();
        async move { store.fetch_stations().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.shutdown().await;
    fetch.await.unwrap();

    assert!(!store.is_active());
    assert!(!store.status().await.cache_valid);

    let after = store.fetch_stations().await;
    assert_eq!(after.source, Source::Fallback);
    assert_eq!(after.error, Some(SyncError::ShutDown));
    assert!(!after.stations.is_empty());
    assert_eq!(mock.calls(), 1);

    let merge = store
        .apply_update(RealtimeUpdate::touch("live-0", Utc::now()))
        .await;
    assert_eq!(merge, MergeOutcome::Inactive);
}

#[tokio::test]
async fn warm_start_from_persisted_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let first_mock = Arc::new(MockBackend::from_rows(live_rows(3)));
    let first = store_with(&first_mock, StoreConfig::default().with_persist_path(&path));
    first.fetch_stations().await;
    assert!(path.exists());

    let second_mock = Arc::new(MockBackend::from_rows(Vec::new()));
    second_mock.set_failing(true);
    let second = store_with(&second_mock, StoreConfig::default().with_persist_path(&path));

    assert!(second.warm_start().await);
    let outcome = second.fetch_stations().await;

    assert_eq!(outcome.source, Source::Live);
    assert!(outcome.from_cache);
    assert_eq!(outcome.stations.len(), 3);
    assert_eq!(second_mock.calls(), 0);
}

#[tokio::test]
async fn fallback_is_never_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mock = Arc::new(MockBackend::from_rows(live_rows(3)));
    mock.set_failing(true);
    let store = store_with(&mock, StoreConfig::default().with_persist_path(&path));
    store.fetch_stations().await;

    assert!(!path.exists());
    assert!(!store.warm_start().await);
}
