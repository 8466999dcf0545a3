//! Observability hooks
//!
//! Engine components report through an injected [`Observer`] rather than
//! global state. [`TracingObserver`] is the production implementation: it
//! logs through `tracing` and feeds [`ServiceMetrics`].

use crate::error::EngineError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Notable points in a pool request's lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    FilterApplied {
        filter_id: String,
        attribute: String,
        count: usize,
        elapsed: Duration,
    },
    HighCardinality {
        filter_id: String,
        attribute: String,
        count: u64,
    },
    ShortCircuit {
        pool_id: String,
        filter_id: String,
    },
    IgnoreListsCombined {
        lists: usize,
        ignored: usize,
    },
    PageSent {
        pool_id: String,
        page: usize,
        players: usize,
    },
    PoolStreamed {
        pool_id: String,
        pages: usize,
        players: usize,
    },
}

pub trait Observer: Send + Sync {
    fn record_event(&self, event: EngineEvent);

    fn record_error(&self, operation: &'static str, error: &EngineError);
}

/// Per-process counters, safe for concurrent increment
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests: AtomicU64,
    request_errors: AtomicU64,
    engine_errors: AtomicU64,
    filters_applied: AtomicU64,
    high_cardinality_filters: AtomicU64,
    short_circuits: AtomicU64,
    pages_sent: AtomicU64,
    players_streamed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub request_errors: u64,
    pub engine_errors: u64,
    pub filters_applied: u64,
    pub high_cardinality_filters: u64,
    pub short_circuits: u64,
    pub pages_sent: u64,
    pub players_streamed: u64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, method: &'static str) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(method, "Request received");
    }

    pub fn record_request_error(&self, method: &'static str) {
        self.request_errors.fetch_add(1, Ordering::Relaxed);
        debug!(method, "Request failed");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            filters_applied: self.filters_applied.load(Ordering::Relaxed),
            high_cardinality_filters: self.high_cardinality_filters.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            pages_sent: self.pages_sent.load(Ordering::Relaxed),
            players_streamed: self.players_streamed.load(Ordering::Relaxed),
        }
    }
}

/// Logs events through `tracing` and counts them in [`ServiceMetrics`]
#[derive(Debug, Clone)]
pub struct TracingObserver {
    metrics: Arc<ServiceMetrics>,
}

impl TracingObserver {
    pub fn new(metrics: Arc<ServiceMetrics>) -> Self {
        Self { metrics }
    }
}

impl Observer for TracingObserver {
    fn record_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::FilterApplied {
                filter_id,
                attribute,
                count,
                elapsed,
            } => {
                self.metrics.filters_applied.fetch_add(1, Ordering::Relaxed);
                info!(
                    filter_id = %filter_id,
                    attribute = %attribute,
                    pool_size = count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Player pool filter processed"
                );
            }
            EngineEvent::HighCardinality {
                filter_id,
                attribute,
                count,
            } => {
                self.metrics
                    .high_cardinality_filters
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    filter_id = %filter_id,
                    attribute = %attribute,
                    count,
                    "Number of players this filter applies to is very large"
                );
            }
            EngineEvent::ShortCircuit { pool_id, filter_id } => {
                self.metrics.short_circuits.fetch_add(1, Ordering::Relaxed);
                info!(
                    pool_id = %pool_id,
                    filter_id = %filter_id,
                    "Filter matched zero players, returning empty pool"
                );
            }
            EngineEvent::IgnoreListsCombined { lists, ignored } => {
                debug!(lists, ignored, "Combined ignore lists");
            }
            EngineEvent::PageSent {
                pool_id,
                page,
                players,
            } => {
                self.metrics.pages_sent.fetch_add(1, Ordering::Relaxed);
                debug!(pool_id = %pool_id, page, players, "Sent roster page");
            }
            EngineEvent::PoolStreamed {
                pool_id,
                pages,
                players,
            } => {
                self.metrics
                    .players_streamed
                    .fetch_add(players as u64, Ordering::Relaxed);
                info!(pool_id = %pool_id, pages, players, "Player pool streaming complete");
            }
        }
    }

    fn record_error(&self, operation: &'static str, err: &EngineError) {
        self.metrics.engine_errors.fetch_add(1, Ordering::Relaxed);
        error!(operation, error = %err, "Player pool engine error");
    }
}

/// Keeps every event and error in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EngineEvent>>,
    errors: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> Vec<(&'static str, String)> {
        self.errors.lock().clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl Observer for RecordingObserver {
    fn record_event(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }

    fn record_error(&self, operation: &'static str, err: &EngineError) {
        self.errors.lock().push((operation, err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_observer_counts_events() {
        let metrics = Arc::new(ServiceMetrics::new());
        let observer = TracingObserver::new(Arc::clone(&metrics));

        observer.record_event(EngineEvent::ShortCircuit {
            pool_id: "pool".to_string(),
            filter_id: "latency".to_string(),
        });
        observer.record_event(EngineEvent::PoolStreamed {
            pool_id: "pool".to_string(),
            pages: 3,
            players: 250,
        });
        observer.record_error(
            "apply_filter",
            &EngineError::FilterTooLarge {
                filter_id: "f".to_string(),
                attribute: "rating".to_string(),
                count: 600_000,
                limit: 500_000,
            },
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.short_circuits, 1);
        assert_eq!(snapshot.players_streamed, 250);
        assert_eq!(snapshot.engine_errors, 1);
    }
}
