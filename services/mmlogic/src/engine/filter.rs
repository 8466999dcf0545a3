//! Range filter evaluation against the attribute indices

use crate::error::{EngineError, Result};
use crate::observer::{EngineEvent, Observer};
use mmlogic_config::MmlogicConfig;
use mmlogic_protocol::{Filter, Stats};
use state_storage::{ConnectionPool, ScoreRange};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Player id to the attribute value that satisfied the filter
pub type FilterResult = HashMap<String, i64>;

/// Cardinality thresholds and read chunking for filter evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterLimits {
    /// Entries requested per range read
    pub query_page_size: usize,

    /// Counts at or above this are logged as high cardinality
    pub warn_cardinality: u64,

    /// Counts above this are rejected outright
    pub max_cardinality: u64,
}

impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            query_page_size: 10_000,
            warn_cardinality: 100_000,
            max_cardinality: 500_000,
        }
    }
}

impl From<&MmlogicConfig> for FilterLimits {
    fn from(config: &MmlogicConfig) -> Self {
        Self {
            query_page_size: config.storage.query_page_size,
            warn_cardinality: config.thresholds.warn_cardinality,
            max_cardinality: config.thresholds.max_cardinality,
        }
    }
}

impl FilterLimits {
    /// Upper bound on range reads for one filter. The index may grow while
    /// it is being read, so the loop cannot rely on the initial count alone.
    fn max_reads(&self) -> usize {
        let ceiling = usize::try_from(self.max_cardinality).unwrap_or(usize::MAX);
        ceiling.div_ceil(self.query_page_size).saturating_add(2)
    }
}

/// Resolves one filter to the players whose attribute falls in its range
#[derive(Clone)]
pub struct RangeFilterApplier {
    pool: Arc<ConnectionPool>,
    limits: FilterLimits,
    observer: Arc<dyn Observer>,
}

impl RangeFilterApplier {
    pub fn new(pool: Arc<ConnectionPool>, limits: FilterLimits, observer: Arc<dyn Observer>) -> Self {
        Self {
            pool,
            limits: FilterLimits {
                query_page_size: limits.query_page_size.max(1),
                ..limits
            },
            observer,
        }
    }

    /// Evaluate `filter`, recording count and elapsed time on it whether or
    /// not evaluation succeeds.
    ///
    /// Fails with [`EngineError::FilterEmpty`] when nothing matches and
    /// [`EngineError::FilterTooLarge`] when the match count exceeds the
    /// configured ceiling.
    pub async fn apply(&self, filter: &mut Filter) -> Result<FilterResult> {
        let started = Instant::now();
        let outcome = self.evaluate(filter).await;
        let elapsed = started.elapsed();

        let count = outcome.as_ref().map_or(0, HashMap::len);
        filter.stats = Some(Stats::new(count, elapsed));

        match &outcome {
            Ok(_) => self.observer.record_event(EngineEvent::FilterApplied {
                filter_id: filter.id.clone(),
                attribute: filter.attribute.clone(),
                count,
                elapsed,
            }),
            Err(e) if e.is_empty_result() => {}
            Err(e) => self.observer.record_error("apply_filter", e),
        }
        outcome
    }

    async fn evaluate(&self, filter: &Filter) -> Result<FilterResult> {
        let range = ScoreRange::new(Some(filter.minv), filter.upper_bound());
        let context = || format!("filter '{}' on '{}'", filter.id, filter.attribute);

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| EngineError::store(context(), e))?;

        let count = conn
            .zcount(&filter.attribute, range)
            .await
            .map_err(|e| EngineError::store(context(), e))?;

        if count == 0 {
            debug!(filter_id = %filter.id, attribute = %filter.attribute, "Filter matched no players");
            return Err(EngineError::FilterEmpty {
                filter_id: filter.id.clone(),
                attribute: filter.attribute.clone(),
            });
        }
        if count > self.limits.max_cardinality {
            return Err(self.too_large(filter, count));
        }
        if count >= self.limits.warn_cardinality {
            self.observer.record_event(EngineEvent::HighCardinality {
                filter_id: filter.id.clone(),
                attribute: filter.attribute.clone(),
                count,
            });
        } else {
            debug!(filter_id = %filter.id, attribute = %filter.attribute, count, "Filter cardinality");
        }

        let page_size = self.limits.query_page_size;
        let max_reads = self.limits.max_reads();
        let expected = usize::try_from(count).unwrap_or(usize::MAX);
        let mut results = FilterResult::with_capacity(expected);
        let mut offset = 0usize;
        let mut duplicates = 0usize;
        let mut exhausted = false;

        for _ in 0..max_reads {
            let page = conn
                .zrange_by_score_with_scores(&filter.attribute, range, offset, page_size)
                .await
                .map_err(|e| EngineError::store(context(), e))?;
            let fetched = page.len();
            offset += fetched;

            for (player_id, value) in page {
                if results.insert(player_id, value).is_some() {
                    duplicates += 1;
                }
            }

            if results.len() as u64 > self.limits.max_cardinality {
                return Err(self.too_large(filter, results.len() as u64));
            }
            if fetched < page_size {
                exhausted = true;
                break;
            }
        }

        if !exhausted {
            warn!(
                filter_id = %filter.id,
                attribute = %filter.attribute,
                reads = max_reads,
                players = results.len(),
                "Stopped reading filter index before reaching its end"
            );
        }
        if duplicates > 0 {
            debug!(filter_id = %filter.id, duplicates, "Index shifted during read, duplicates merged");
        }

        Ok(results)
    }

    fn too_large(&self, filter: &Filter, count: u64) -> EngineError {
        EngineError::FilterTooLarge {
            filter_id: filter.id.clone(),
            attribute: filter.attribute.clone(),
            count,
            limit: self.limits.max_cardinality,
        }
    }
}
