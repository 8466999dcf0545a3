//! End-to-end player pool resolution against the in-memory store

use mmlogic::engine::{EngineSettings, FilterLimits, PoolEngine};
use mmlogic::{ApiError, EngineError, EngineEvent, MmlogicApi, RecordingObserver};
use mmlogic_config::{EvaluationMode, IgnoreListConfig, MmlogicConfig};
use mmlogic_protocol::{Filter, PlayerPool};
use proptest::prelude::*;
use state_storage::{ConnectionPool, MemoryStore, PoolConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const NOW: i64 = 1_700_000_000;

fn scenario_store() -> MemoryStore {
    let store = MemoryStore::new();
    for (id, rating) in [("A", 1500), ("B", 1800), ("C", 1200), ("E", 2400)] {
        store.insert_scored("rating", id, rating);
    }
    for (id, region) in [("A", 2), ("B", 1), ("C", 1), ("D", 1)] {
        store.insert_scored("region", id, region);
    }
    store
}

fn engine_with(
    store: &MemoryStore,
    mode: EvaluationMode,
    page_size: usize,
) -> (PoolEngine, Arc<ConnectionPool>, Arc<RecordingObserver>) {
    let pool = ConnectionPool::new(store.connector(), PoolConfig::default());
    let observer = RecordingObserver::new();
    let settings = EngineSettings {
        limits: FilterLimits::default(),
        results_page_size: page_size,
        mode,
        ignore_lists: vec![
            IgnoreListConfig::new("proposed", "proposed", 800),
            IgnoreListConfig::new("deindexed", "deindexed", 0),
        ],
    };
    let engine = PoolEngine::new(Arc::clone(&pool), settings, observer.clone());
    (engine, pool, observer)
}

fn rating_and_region() -> PlayerPool {
    PlayerPool::new(
        "eu-gold",
        vec![
            Filter::new("skill", "rating", 1000, Some(2000)),
            Filter::new("eu", "region", 1, Some(1)),
        ],
    )
}

async fn resolve(engine: &PoolEngine, pool: PlayerPool) -> Vec<PlayerPool> {
    let mut pages: Vec<PlayerPool> = Vec::new();
    engine
        .stream_player_pool_as_of(pool, NOW, &mut pages)
        .await
        .expect("pool resolves");
    pages
}

#[tokio::test]
async fn test_rating_and_region_roster() {
    let store = scenario_store();
    let (engine, pool, _) = engine_with(&store, EvaluationMode::Sequential, 100);

    let pages = resolve(&engine, rating_and_region()).await;
    assert_eq!(pages.len(), 1);

    let players: Vec<_> = pages[0].players().collect();
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].id, "B");
    assert_eq!(players[0].property("rating"), Some(1800));
    assert_eq!(players[0].property("region"), Some(1));
    assert_eq!(players[1].id, "C");
    assert_eq!(players[1].property("rating"), Some(1200));
    assert_eq!(players[1].property("region"), Some(1));

    let stats = pages[0].stats.expect("pool stats");
    assert_eq!(stats.count, 2);
    assert_eq!(pages[0].filters[0].stats.map(|s| s.count), Some(3));
    assert_eq!(pages[0].filters[1].stats.map(|s| s.count), Some(3));
    assert_eq!(pool.stats().in_use, 0);
}

#[tokio::test]
async fn test_ignored_player_is_removed() {
    let store = scenario_store();
    store.insert_scored("proposed", "C", NOW - 30);
    let (engine, _, _) = engine_with(&store, EvaluationMode::Sequential, 100);

    let pages = resolve(&engine, rating_and_region()).await;
    let ids: Vec<_> = pages[0].players().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["B"]);
}

#[tokio::test]
async fn test_expired_ignore_entry_no_longer_excludes() {
    let store = scenario_store();
    store.insert_scored("proposed", "C", NOW - 5_000);
    let (engine, _, _) = engine_with(&store, EvaluationMode::Sequential, 100);

    let pages = resolve(&engine, rating_and_region()).await;
    let ids: Vec<_> = pages[0].players().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["B", "C"]);
}

#[tokio::test]
async fn test_empty_filter_stops_before_later_filters() {
    let store = scenario_store();
    let (engine, _, observer) = engine_with(&store, EvaluationMode::Sequential, 100);

    let request = PlayerPool::new(
        "low-latency",
        vec![
            Filter::new("ping", "latency", 0, Some(0)),
            Filter::new("skill", "rating", 1000, Some(2000)),
        ],
    );
    let pages = resolve(&engine, request).await;

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].players().count(), 0);
    assert_eq!(pages[0].id, "low-latency.page1of1");
    assert_eq!(store.calls_for_key("latency"), 1);
    assert_eq!(store.calls_for_key("rating"), 0);
    assert_eq!(store.calls_for_key("proposed"), 0);
    assert_eq!(pages[0].filters[0].stats.map(|s| s.count), Some(0));
    assert!(pages[0].filters[1].stats.is_none());
    assert_eq!(
        observer.count_matching(|e| matches!(e, EngineEvent::ShortCircuit { .. })),
        1
    );
}

#[tokio::test]
async fn test_no_filters_yield_one_empty_page() {
    let store = scenario_store();
    let (engine, _, _) = engine_with(&store, EvaluationMode::Sequential, 100);

    let pages = resolve(&engine, PlayerPool::new("nothing", Vec::new())).await;
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].players().count(), 0);
    assert!(store.commands().is_empty());
}

#[tokio::test]
async fn test_large_pool_streams_in_order() {
    let store = MemoryStore::new();
    for i in 0..250 {
        store.insert_scored("level", &format!("player{:03}", i), 10);
    }
    let (engine, _, _) = engine_with(&store, EvaluationMode::Sequential, 100);

    let (tx, mut rx) = mpsc::channel(4);
    let request = PlayerPool::new("everyone", vec![Filter::new("lvl", "level", 1, None)]);
    let producer = tokio::spawn(async move {
        let mut tx = tx;
        engine.stream_player_pool_as_of(request, NOW, &mut tx).await
    });

    let mut sizes = Vec::new();
    let mut ids = Vec::new();
    while let Some(page) = rx.recv().await {
        sizes.push(page.players().count());
        ids.extend(page.players().map(|p| p.id.clone()));
    }
    let summary = producer.await.unwrap().unwrap();

    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(summary.pages, 3);
    let expected: Vec<_> = (0..250).map(|i| format!("player{:03}", i)).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_oversized_filter_fails_request() {
    let store = scenario_store();
    let pool = ConnectionPool::new(store.connector(), PoolConfig::default());
    let settings = EngineSettings {
        limits: FilterLimits {
            max_cardinality: 2,
            ..FilterLimits::default()
        },
        ..EngineSettings::default()
    };
    let engine = PoolEngine::new(Arc::clone(&pool), settings, RecordingObserver::new());

    let mut pages: Vec<PlayerPool> = Vec::new();
    let err = engine
        .stream_player_pool_as_of(rating_and_region(), NOW, &mut pages)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FilterTooLarge { .. }));
    assert!(pages.is_empty());
    assert_eq!(pool.stats().in_use, 0);
}

#[tokio::test]
async fn test_store_failure_surfaces_and_releases_connections() {
    for mode in [EvaluationMode::Sequential, EvaluationMode::Concurrent] {
        let store = scenario_store();
        store.fail_key("region");
        let (engine, pool, observer) = engine_with(&store, mode, 100);

        let mut pages: Vec<PlayerPool> = Vec::new();
        let err = engine
            .stream_player_pool_as_of(rating_and_region(), NOW, &mut pages)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store { .. }), "mode {:?}", mode);
        assert!(pages.is_empty());
        assert!(!observer.errors().is_empty());
        assert_eq!(pool.stats().in_use, 0);
    }
}

#[tokio::test]
async fn test_ignore_list_failure_fails_request() {
    let store = scenario_store();
    store.fail_key("deindexed");
    let (engine, _, _) = engine_with(&store, EvaluationMode::Sequential, 100);

    let mut pages: Vec<PlayerPool> = Vec::new();
    let err = engine
        .stream_player_pool_as_of(rating_and_region(), NOW, &mut pages)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store { .. }));
    assert!(pages.is_empty());
}

#[tokio::test]
async fn test_abandoned_stream_returns_connections() {
    let store = MemoryStore::new();
    for i in 0..30 {
        store.insert_scored("level", &format!("p{:02}", i), i);
    }
    let (engine, pool, _) = engine_with(&store, EvaluationMode::Concurrent, 5);

    // Capacity one and nobody reading: the second page blocks forever
    let (mut tx, _rx) = mpsc::channel(1);
    let request = PlayerPool::new("stuck", vec![Filter::new("lvl", "level", 0, None)]);
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        engine.stream_player_pool_as_of(request, NOW, &mut tx),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(pool.stats().in_use, 0);
}

#[tokio::test]
async fn test_request_timeout_reported_by_api() {
    let store = MemoryStore::new();
    for i in 0..30 {
        store.insert_scored("level", &format!("p{:02}", i), i);
    }
    let mut config = MmlogicConfig::default();
    config.api.request_timeout_secs = 1;
    config.results.page_size = 5;
    let api = MmlogicApi::new(config, store.connector());

    let (mut tx, _rx) = mpsc::channel(1);
    let request = PlayerPool::new("stuck", vec![Filter::new("lvl", "level", 0, None)]);
    let err = api.get_player_pool(request, &mut tx).await.unwrap_err();

    assert!(matches!(err, ApiError::Timeout(_)));
    assert_eq!(api.store_pool().stats().in_use, 0);
    assert_eq!(api.metrics().snapshot().request_errors, 1);
}

#[tokio::test]
async fn test_dropped_receiver_is_a_stream_error() {
    let store = scenario_store();
    let (engine, _, _) = engine_with(&store, EvaluationMode::Sequential, 1);

    let (mut tx, rx) = mpsc::channel(1);
    drop(rx);
    let err = engine
        .stream_player_pool_as_of(rating_and_region(), NOW, &mut tx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StreamSend { page: 1, .. }));
}

#[tokio::test]
async fn test_filter_order_does_not_change_roster() {
    let store = scenario_store();
    let (engine, _, _) = engine_with(&store, EvaluationMode::Sequential, 100);

    let mut reversed = rating_and_region();
    reversed.filters.reverse();

    let forward = resolve(&engine, rating_and_region()).await;
    let backward = resolve(&engine, reversed).await;
    let ids = |pages: &[PlayerPool]| -> Vec<String> {
        pages.iter().flat_map(|p| p.players()).map(|p| p.id.clone()).collect()
    };
    assert_eq!(ids(&forward), ids(&backward));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn roster_is_exact_filtered_difference(
        ratings in proptest::collection::btree_map("[a-h]", 0i64..100, 0..8),
        regions in proptest::collection::btree_map("[a-h]", 0i64..5, 0..8),
        ignored in proptest::collection::btree_set("[a-h]", 0..4),
        page_size in 1usize..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let store = MemoryStore::new();
        for (id, v) in &ratings {
            store.insert_scored("rating", id, *v);
        }
        for (id, v) in &regions {
            store.insert_scored("region", id, *v);
        }
        for id in &ignored {
            store.insert_scored("proposed", id, NOW - 1);
        }
        let (engine, _, _) = engine_with(&store, EvaluationMode::Concurrent, page_size);

        let request = PlayerPool::new(
            "prop",
            vec![
                Filter::new("r", "rating", 20, Some(80)),
                Filter::new("g", "region", 1, Some(3)),
            ],
        );
        let pages = runtime.block_on(resolve(&engine, request));

        let expected: Vec<String> = ratings
            .iter()
            .filter(|(id, v)| (20..=80).contains(*v) && regions.get(*id).map_or(false, |g| (1..=3).contains(g)))
            .map(|(id, _)| id.clone())
            .filter(|id| !ignored.contains(id))
            .collect();
        let streamed: Vec<String> = pages.iter().flat_map(|p| p.players()).map(|p| p.id.clone()).collect();
        prop_assert_eq!(streamed, expected.clone());

        let expected_pages = expected.len().div_ceil(page_size).max(1);
        prop_assert_eq!(pages.len(), expected_pages);
        for page in &pages[..pages.len() - 1] {
            prop_assert_eq!(page.players().count(), page_size);
        }
    }
}
