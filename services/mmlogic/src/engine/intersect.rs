//! Player pool resolution
//!
//! A pool is resolved by evaluating every filter, intersecting the matched
//! player ids, removing ignored players, and streaming what remains. A
//! filter that matches nobody ends the request early with one empty page.

use crate::engine::filter::{FilterLimits, FilterResult, RangeFilterApplier};
use crate::engine::idset::{intersect_keys, IdSet};
use crate::engine::ignore::IgnoreListAggregator;
use crate::engine::paginate::{AttributeMatches, PageSink, PoolSummary, RosterPaginator};
use crate::error::{EngineError, Result};
use crate::observer::{EngineEvent, Observer};
use futures::stream::{FuturesUnordered, StreamExt};
use mmlogic_config::{EvaluationMode, IgnoreListConfig, MmlogicConfig};
use mmlogic_protocol::{PlayerPool, Stats};
use state_storage::ConnectionPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything the engine takes from service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub limits: FilterLimits,
    pub results_page_size: usize,
    pub mode: EvaluationMode,
    pub ignore_lists: Vec<IgnoreListConfig>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&MmlogicConfig::default())
    }
}

impl From<&MmlogicConfig> for EngineSettings {
    fn from(config: &MmlogicConfig) -> Self {
        Self {
            limits: FilterLimits::from(config),
            results_page_size: config.results.page_size,
            mode: config.evaluation.mode,
            ignore_lists: config.ignore_lists.clone(),
        }
    }
}

enum Evaluation {
    Matched(Vec<AttributeMatches>),
    Empty { filter_id: String },
}

/// Resolves player pools into streamed roster pages
#[derive(Clone)]
pub struct PoolEngine {
    applier: RangeFilterApplier,
    aggregator: IgnoreListAggregator,
    paginator: RosterPaginator,
    mode: EvaluationMode,
    ignore_lists: Vec<IgnoreListConfig>,
    observer: Arc<dyn Observer>,
}

impl PoolEngine {
    pub fn new(pool: Arc<ConnectionPool>, settings: EngineSettings, observer: Arc<dyn Observer>) -> Self {
        Self {
            applier: RangeFilterApplier::new(Arc::clone(&pool), settings.limits, Arc::clone(&observer)),
            aggregator: IgnoreListAggregator::new(pool, Arc::clone(&observer)),
            paginator: RosterPaginator::new(settings.results_page_size, Arc::clone(&observer)),
            mode: settings.mode,
            ignore_lists: settings.ignore_lists,
            observer,
        }
    }

    pub fn aggregator(&self) -> &IgnoreListAggregator {
        &self.aggregator
    }

    pub fn ignore_lists(&self) -> &[IgnoreListConfig] {
        &self.ignore_lists
    }

    /// Resolve `pool` with ignore lists cut off at the current time
    pub async fn stream_player_pool<S>(&self, pool: PlayerPool, sink: &mut S) -> Result<PoolSummary>
    where
        S: PageSink + ?Sized,
    {
        let as_of = chrono::Utc::now().timestamp();
        self.stream_player_pool_as_of(pool, as_of, sink).await
    }

    /// Resolve `pool`, excluding players on any ignore list as of `as_of`.
    ///
    /// Pages go to `sink` in order. Dropping the returned future stops
    /// outstanding store reads and returns their connections to the pool.
    pub async fn stream_player_pool_as_of<S>(
        &self,
        mut pool: PlayerPool,
        as_of: i64,
        sink: &mut S,
    ) -> Result<PoolSummary>
    where
        S: PageSink + ?Sized,
    {
        let started = Instant::now();
        info!(pool_id = %pool.id, filters = pool.filters.len(), mode = ?self.mode, "Resolving player pool");

        let evaluation = match self.mode {
            EvaluationMode::Sequential => self.evaluate_sequential(&mut pool).await?,
            EvaluationMode::Concurrent => self.evaluate_concurrent(&mut pool).await?,
        };

        let matched = match evaluation {
            Evaluation::Matched(matched) => matched,
            Evaluation::Empty { filter_id } => {
                self.observer.record_event(EngineEvent::ShortCircuit {
                    pool_id: pool.id.clone(),
                    filter_id,
                });
                pool.stats = Some(Stats::new(0, started.elapsed()));
                return self.paginator.stream_empty(&pool, sink).await;
            }
        };

        let candidates = intersect_keys(matched.iter().map(|m| &m.values));
        debug!(pool_id = %pool.id, candidates = candidates.len(), "Intersected filter results");

        let ignored = if candidates.is_empty() {
            IdSet::new()
        } else {
            self.aggregator.combine(&self.ignore_lists, as_of).await?
        };
        let eligible = if ignored.is_empty() {
            candidates
        } else {
            candidates.difference(&ignored)
        };
        debug!(pool_id = %pool.id, ignored = ignored.len(), eligible = eligible.len(), "Removed ignored players");

        pool.stats = Some(Stats::new(eligible.len(), started.elapsed()));
        self.paginator.stream(&pool, &eligible, &matched, sink).await
    }

    /// One filter at a time, in request order. The first empty filter stops
    /// evaluation so later filters are never queried.
    async fn evaluate_sequential(&self, pool: &mut PlayerPool) -> Result<Evaluation> {
        let mut matched = Vec::with_capacity(pool.filters.len());
        for filter in pool.filters.iter_mut() {
            match self.applier.apply(filter).await {
                Ok(values) => matched.push(AttributeMatches {
                    attribute: filter.attribute.clone(),
                    values,
                }),
                Err(EngineError::FilterEmpty { filter_id, .. }) => {
                    return Ok(Evaluation::Empty { filter_id });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Evaluation::Matched(matched))
    }

    /// Every filter at once. The first empty filter or failure drops the
    /// remaining reads.
    async fn evaluate_concurrent(&self, pool: &mut PlayerPool) -> Result<Evaluation> {
        let mut slots: Vec<Option<FilterResult>> = vec![None; pool.filters.len()];
        {
            let mut pending: FuturesUnordered<_> = pool
                .filters
                .iter_mut()
                .enumerate()
                .map(|(index, filter)| async move { (index, self.applier.apply(filter).await) })
                .collect();

            while let Some((index, outcome)) = pending.next().await {
                match outcome {
                    Ok(values) => slots[index] = Some(values),
                    Err(EngineError::FilterEmpty { filter_id, .. }) => {
                        return Ok(Evaluation::Empty { filter_id });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let matched = pool
            .filters
            .iter()
            .zip(slots)
            .filter_map(|(filter, values)| {
                values.map(|values| AttributeMatches {
                    attribute: filter.attribute.clone(),
                    values,
                })
            })
            .collect();
        Ok(Evaluation::Matched(matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use mmlogic_protocol::Filter;
    use state_storage::{MemoryStore, PoolConfig};

    fn engine(store: &MemoryStore, mode: EvaluationMode) -> (PoolEngine, Arc<ConnectionPool>) {
        let pool = ConnectionPool::new(store.connector(), PoolConfig::default());
        let settings = EngineSettings {
            mode,
            ignore_lists: vec![IgnoreListConfig::new("proposed", "proposed", 0)],
            ..EngineSettings::default()
        };
        let engine = PoolEngine::new(Arc::clone(&pool), settings, RecordingObserver::new());
        (engine, pool)
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_scored("rating", "A", 1500);
        store.insert_scored("rating", "B", 1800);
        store.insert_scored("rating", "C", 1200);
        store.insert_scored("region", "A", 2);
        store.insert_scored("region", "B", 1);
        store.insert_scored("region", "C", 1);
        store
    }

    fn request() -> PlayerPool {
        PlayerPool::new(
            "eu-mid",
            vec![
                Filter::new("skill", "rating", 1000, Some(2000)),
                Filter::new("eu", "region", 1, Some(1)),
            ],
        )
    }

    #[tokio::test]
    async fn test_modes_agree() {
        for mode in [EvaluationMode::Sequential, EvaluationMode::Concurrent] {
            let store = seeded();
            let (engine, pool) = engine(&store, mode);
            let mut pages: Vec<PlayerPool> = Vec::new();
            let summary = engine.stream_player_pool_as_of(request(), 100, &mut pages).await.unwrap();

            assert_eq!(summary.players, 2, "mode {:?}", mode);
            let ids: Vec<_> = pages[0].players().map(|p| p.id.as_str()).collect();
            assert_eq!(ids, vec!["B", "C"], "mode {:?}", mode);
            assert!(pages[0].filters.iter().all(|f| f.stats.is_some()));
            assert_eq!(pool.stats().in_use, 0);
        }
    }

    #[tokio::test]
    async fn test_concurrent_empty_filter_short_circuits() {
        let store = seeded();
        let (engine, _) = engine(&store, EvaluationMode::Concurrent);
        let mut request = request();
        request.filters.push(Filter::new("latency", "latency", 0, Some(0)));

        let mut pages: Vec<PlayerPool> = Vec::new();
        let summary = engine.stream_player_pool_as_of(request, 100, &mut pages).await.unwrap();
        assert!(summary.short_circuited);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].players().count(), 0);
        assert_eq!(store.calls_for_key("proposed"), 0);
    }
}
